use core::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicBool, Ordering};

use crate::{
    Config, Error, Result,
    config::keys,
    driver::{WorkChunk, WorkChunkDriver, WorkItem},
};

/// A boxed upstream of chunks shared by every caller of an [`IteratorDriver`].
pub type ChunkSource = Box<dyn Iterator<Item = Result<WorkChunk>> + Send>;

/// Builds the upstream of an [`IteratorDriver`] from configuration on `init`.
pub type Seed = Arc<dyn Fn(&Config) -> Result<ChunkSource> + Send + Sync>;

/// A driver that wraps a single shared iterator behind a mutex.
///
/// Each upstream chunk is yielded to exactly one caller: the iterator is only
/// ever advanced while the lock is held. The critical section is a single
/// `next()` call, so contention is bounded by the cost of producing one chunk.
///
/// The upstream is either provided up front ([`Self::over`]) or produced on
/// the first [`WorkChunkDriver::init`] call from a [`Seed`] (see
/// [`Self::seeded`] and [`Self::directory`]).
pub struct IteratorDriver {
    name: &'static str,
    seed: Option<Seed>,
    source: Mutex<Option<ChunkSource>>,
    initialized: AtomicBool,
}

impl fmt::Debug for IteratorDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorDriver")
            .field("name", &self.name)
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl IteratorDriver {
    /// Creates an initialized driver over an existing iterator of chunks.
    pub fn over<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = WorkChunk>,
        I::IntoIter: Send + 'static,
    {
        Self {
            name: "iterator",
            seed: None,
            source: Mutex::new(Some(Box::new(chunks.into_iter().map(Ok::<_, Error>)))),
            initialized: AtomicBool::new(true),
        }
    }

    /// Creates an uninitialized driver whose upstream is built by `seed` on
    /// the first `init`.
    pub fn seeded<F>(name: &'static str, seed: F) -> Self
    where
        F: Fn(&Config) -> Result<ChunkSource> + Send + Sync + 'static,
    {
        Self {
            name,
            seed: Some(Arc::new(seed)),
            source: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// A driver that yields one [`WorkChunk::File`] per regular file of
    /// `work.directory.path`, in file name order.
    ///
    /// When `work.directory.extension` is set, only files with that
    /// extension are yielded.
    pub fn directory() -> Self {
        Self::seeded("directory", |config| {
            let dir = PathBuf::from(config.require(keys::WORK_DIRECTORY_PATH)?);
            let extension = config.get(keys::WORK_DIRECTORY_EXTENSION).map(str::to_owned);
            let files = list_files(&dir, extension.as_deref())?;
            tracing::debug!(dir = %dir.display(), files = files.len(), "Directory driver seeded");
            Ok(Box::new(
                files
                    .into_iter()
                    .map(|path| Ok::<_, Error>(WorkChunk::File(path))),
            ))
        })
    }
}

impl WorkChunkDriver for IteratorDriver {
    fn name(&self) -> &'static str {
        self.name
    }

    fn init(&self, config: &Config) -> Result<()> {
        let Some(seed) = &self.seed else {
            return Ok(());
        };

        // Hold the lock across seeding so concurrent inits seed exactly once.
        let mut source = self.source.lock();
        if self.initialized.load(Ordering::Acquire) {
            return Ok(());
        }
        *source = Some(seed(config)?);
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn next_chunk(&self) -> Result<Option<WorkChunk>> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(Error::DriverNotInitialized { driver: self.name });
        }

        let mut source = self.source.lock();
        let Some(iter) = source.as_mut() else {
            // Closed.
            return Ok(None);
        };
        iter.next().transpose()
    }

    fn close(&self) -> Result<()> {
        self.source.lock().take();
        Ok(())
    }
}

/// Groups a stream of work items into [`WorkChunk::Items`] of at most
/// `batch` items.
///
/// # Panics
///
/// Panics if `batch` is zero.
pub fn batched<I>(items: I, batch: usize) -> impl Iterator<Item = WorkChunk> + Send
where
    I: IntoIterator<Item = WorkItem>,
    I::IntoIter: Send,
{
    assert!(batch > 0, "batch size must be greater than 0");
    let mut items = items.into_iter();
    core::iter::from_fn(move || {
        let chunk: Vec<WorkItem> = items.by_ref().take(batch).collect();
        (!chunk.is_empty()).then_some(WorkChunk::Items(chunk))
    })
}

fn list_files(dir: &Path, extension: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(ext) = extension {
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::chunks;

    #[test]
    fn batches_items_with_a_short_tail() {
        let sizes: Vec<usize> = batched((0..7).map(WorkItem::Id), 3)
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn over_hands_out_each_chunk_once_then_exhausts() {
        let driver = IteratorDriver::over(batched((0..4).map(WorkItem::Id), 2));
        let pulled: Vec<WorkChunk> = chunks(&driver).collect::<Result<_>>().unwrap();
        assert_eq!(pulled.len(), 2);
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn seeded_driver_requires_init() {
        let driver = IteratorDriver::seeded("test", |_| {
            Ok(Box::new(core::iter::once(Ok::<_, Error>(WorkChunk::Items(
                vec![WorkItem::Id(1)],
            )))))
        });
        assert!(matches!(
            driver.next_chunk(),
            Err(Error::DriverNotInitialized { driver: "test" })
        ));

        driver.init(&Config::new()).unwrap();
        driver.init(&Config::new()).unwrap();
        assert_eq!(
            driver.next_chunk().unwrap(),
            Some(WorkChunk::Items(vec![WorkItem::Id(1)]))
        );
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn close_releases_the_shared_iterator() {
        let driver = IteratorDriver::over(batched((0..100).map(WorkItem::Id), 1));
        assert!(driver.next_chunk().unwrap().is_some());
        driver.close().unwrap();
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn chunks_iterator_fuses_after_an_error() {
        let driver = IteratorDriver::seeded("never", |_| unreachable!());
        let mut iter = chunks(&driver);
        assert!(matches!(iter.next(), Some(Err(Error::DriverNotInitialized { .. }))));
        assert!(iter.next().is_none());
    }

    #[test]
    fn directory_driver_yields_sorted_files_matching_extension() {
        let dir = std::env::temp_dir().join(format!("graphmill-dir-driver-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["b.jsonl", "a.jsonl", "notes.txt"] {
            std::fs::write(dir.join(name), "").unwrap();
        }

        let driver = IteratorDriver::directory();
        let config = Config::new()
            .with(keys::WORK_DIRECTORY_PATH, dir.display())
            .with(keys::WORK_DIRECTORY_EXTENSION, "jsonl");
        driver.init(&config).unwrap();

        let files: Vec<WorkChunk> = chunks(&driver).collect::<Result<_>>().unwrap();
        assert_eq!(
            files,
            vec![
                WorkChunk::File(dir.join("a.jsonl")),
                WorkChunk::File(dir.join("b.jsonl")),
            ]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn directory_driver_requires_a_path() {
        let driver = IteratorDriver::directory();
        assert!(matches!(
            driver.init(&Config::new()),
            Err(Error::MissingConfig { .. })
        ));
    }
}
