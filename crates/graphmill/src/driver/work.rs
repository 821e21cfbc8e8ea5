use core::fmt;
use std::path::PathBuf;

use crate::{Config, Result};

/// One unit of upstream work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkItem {
    /// A numeric identity, e.g. a row id or a synthetic vertex number.
    Id(u64),
    /// A composite or textual key.
    Key(String),
}

impl WorkItem {
    pub const fn as_id(&self) -> Option<u64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Key(_) => None,
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Key(key) => f.write_str(key),
        }
    }
}

/// A batch of work handed to exactly one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkChunk {
    /// An ordered, finite batch of work items.
    Items(Vec<WorkItem>),
    /// A self-contained unit standing in for a whole chunk.
    File(PathBuf),
}

impl WorkChunk {
    /// Number of work items, or 1 for a self-contained unit.
    pub fn len(&self) -> usize {
        match self {
            Self::Items(items) => items.len(),
            Self::File(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for WorkChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Items(items) => match (items.first(), items.last()) {
                (Some(first), Some(last)) => write!(f, "items[{first}..={last}]"),
                _ => f.write_str("items[]"),
            },
            Self::File(path) => write!(f, "file {}", path.display()),
        }
    }
}

/// A pull-based supplier of [`WorkChunk`]s shared by every worker of a phase.
///
/// Implementations must be safe under concurrent calls and must hand each
/// chunk to at most one caller.
pub trait WorkChunkDriver: Send + Sync + fmt::Debug {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Prepares the driver from configuration.
    ///
    /// Idempotent: only the first call has an effect.
    fn init(&self, config: &Config) -> Result<()>;

    /// Claims the next unclaimed chunk.
    ///
    /// Returns `Ok(None)` once the source is exhausted or the driver has been
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DriverNotInitialized`](crate::Error::DriverNotInitialized)
    /// when called before [`Self::init`].
    fn next_chunk(&self) -> Result<Option<WorkChunk>>;

    /// Releases any shared upstream state.
    fn close(&self) -> Result<()>;
}

/// Iterator that pulls `driver` until it reports exhaustion.
///
/// The iterator is fused after the first error so a failing driver is never
/// polled again.
pub fn chunks(driver: &dyn WorkChunkDriver) -> Chunks<'_> {
    Chunks {
        driver,
        done: false,
    }
}

pub struct Chunks<'a> {
    driver: &'a dyn WorkChunkDriver,
    done: bool,
}

impl Iterator for Chunks<'_> {
    type Item = Result<WorkChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.driver.next_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl core::iter::FusedIterator for Chunks<'_> {}
