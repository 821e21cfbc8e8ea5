//! Emission of elements and the work they uncover.
//!
//! An [`Emitable`] writes itself through a [`SinkSession`] and returns a lazy
//! [`FollowOn`] of further emitables. The [`Walker`] drains that tree
//! depth-first.

mod dependent;
mod walk;

use core::fmt;

pub use dependent::*;
pub use walk::*;

use crate::{Element, Result, adapter::SinkSession};

/// Lazily produced children of an emitted node.
pub type FollowOn = Box<dyn Iterator<Item = Result<Box<dyn Emitable>>> + Send>;

/// Something that can be written to a sink.
pub trait Emitable: Send + fmt::Debug {
    /// Writes this node and returns the nodes it uncovers.
    ///
    /// The follow-on is only advanced after this call has returned, so a
    /// child always observes its parent's writes.
    fn emit(&mut self, session: &mut SinkSession) -> Result<FollowOn>;
}

/// A follow-on with nothing in it.
pub fn no_follow_on() -> FollowOn {
    Box::new(core::iter::empty())
}

impl Emitable for Element {
    fn emit(&mut self, session: &mut SinkSession) -> Result<FollowOn> {
        session.write(self)?;
        Ok(no_follow_on())
    }
}

/// An element with explicitly attached children.
pub struct Cascade {
    element: Element,
    children: Option<FollowOn>,
}

impl Cascade {
    pub fn new<I>(element: impl Into<Element>, children: I) -> Self
    where
        I: IntoIterator<Item = Result<Box<dyn Emitable>>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            element: element.into(),
            children: Some(Box::new(children.into_iter())),
        }
    }
}

impl fmt::Debug for Cascade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cascade").field(&self.element).finish()
    }
}

impl Emitable for Cascade {
    fn emit(&mut self, session: &mut SinkSession) -> Result<FollowOn> {
        session.write(&mut self.element)?;
        Ok(self.children.take().unwrap_or_else(no_follow_on))
    }
}
