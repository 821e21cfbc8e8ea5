use std::sync::OnceLock;

use portable_atomic::{AtomicU64, Ordering};

use crate::{
    Config, Error, Result,
    config::keys,
    driver::{WorkChunk, WorkChunkDriver, WorkItem},
};

/// A lock-free driver that splits a numeric range into fixed-size batches.
///
/// The next unclaimed position lives in an [`AtomicU64`] and is advanced with
/// a compare-and-swap loop, so every batch `[start, end)` is claimed by
/// exactly one caller and batches are handed out in increasing order.
///
/// ## Configuration
/// - `work.range.floor` (default `0`): first work item, inclusive
/// - `work.range.top` (required): last work item, exclusive
/// - `work.batch.size` (default `100`): items per chunk
///
/// ## See Also
/// - [`IteratorDriver`](crate::driver::IteratorDriver)
#[derive(Debug, Default)]
pub struct RangeDriver {
    state: OnceLock<RangeState>,
    closed: portable_atomic::AtomicBool,
}

#[derive(Debug)]
struct RangeState {
    #[cfg(feature = "cache-padded")]
    next: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    next: AtomicU64,
    top: u64,
    batch: u64,
}

impl RangeDriver {
    pub const DEFAULTS: &'static [(&'static str, &'static str)] = &[
        (keys::WORK_RANGE_FLOOR, "0"),
        (keys::WORK_BATCH_SIZE, "100"),
    ];

    /// Creates an uninitialized driver. Call [`WorkChunkDriver::init`] before
    /// pulling from it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver that is already initialized with `[floor, top)` and
    /// the given batch size.
    ///
    /// # Panics
    ///
    /// Panics if `batch` is zero.
    pub fn with_range(floor: u64, top: u64, batch: u64) -> Self {
        assert!(batch > 0, "batch size must be greater than 0");
        let driver = Self::new();
        let _ = driver.state.set(RangeState::new(floor, top, batch));
        driver
    }

    fn state(&self) -> Result<&RangeState> {
        self.state
            .get()
            .ok_or(Error::DriverNotInitialized { driver: "range" })
    }
}

impl RangeState {
    fn new(floor: u64, top: u64, batch: u64) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            next: crossbeam_utils::CachePadded::new(AtomicU64::new(floor)),
            #[cfg(not(feature = "cache-padded"))]
            next: AtomicU64::new(floor),
            top,
            batch,
        }
    }

    fn claim(&self) -> Option<(u64, u64)> {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            if current >= self.top {
                return None;
            }
            let end = current.saturating_add(self.batch).min(self.top);
            match self.next.compare_exchange_weak(
                current,
                end,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some((current, end)),
                // Another worker won the race; retry from its position.
                Err(actual) => current = actual,
            }
        }
    }
}

impl WorkChunkDriver for RangeDriver {
    fn name(&self) -> &'static str {
        "range"
    }

    fn init(&self, config: &Config) -> Result<()> {
        if self.state.get().is_some() {
            return Ok(());
        }

        let config = config.with_defaults(Self::DEFAULTS);
        let floor: u64 = config.parse_required(keys::WORK_RANGE_FLOOR)?;
        let top: u64 = config.parse_required(keys::WORK_RANGE_TOP)?;
        let batch: u64 = config.parse_required(keys::WORK_BATCH_SIZE)?;

        if batch == 0 {
            return Err(Error::InvalidConfig {
                key: keys::WORK_BATCH_SIZE.to_string(),
                value: batch.to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        if floor > top {
            return Err(Error::InvalidConfig {
                key: keys::WORK_RANGE_FLOOR.to_string(),
                value: floor.to_string(),
                reason: format!("floor exceeds top ({top})"),
            });
        }

        // A concurrent init may have won; either state is equivalent.
        let _ = self.state.set(RangeState::new(floor, top, batch));
        tracing::debug!(floor, top, batch, "Range driver initialized");
        Ok(())
    }

    fn next_chunk(&self) -> Result<Option<WorkChunk>> {
        let state = self.state()?;
        if self.closed.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(state
            .claim()
            .map(|(start, end)| WorkChunk::Items((start..end).map(WorkItem::Id).collect())))
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(chunk: WorkChunk) -> Vec<u64> {
        match chunk {
            WorkChunk::Items(items) => items.iter().filter_map(WorkItem::as_id).collect(),
            WorkChunk::File(_) => panic!("unexpected file chunk"),
        }
    }

    #[test]
    fn pulling_before_init_fails_loudly() {
        let driver = RangeDriver::new();
        assert!(matches!(
            driver.next_chunk(),
            Err(Error::DriverNotInitialized { driver: "range" })
        ));
    }

    #[test]
    fn splits_range_into_batches_with_a_short_tail() {
        let driver = RangeDriver::new();
        let config = Config::new()
            .with(keys::WORK_RANGE_FLOOR, 5)
            .with(keys::WORK_RANGE_TOP, 12)
            .with(keys::WORK_BATCH_SIZE, 3);
        driver.init(&config).unwrap();

        assert_eq!(ids(driver.next_chunk().unwrap().unwrap()), vec![5, 6, 7]);
        assert_eq!(ids(driver.next_chunk().unwrap().unwrap()), vec![8, 9, 10]);
        assert_eq!(ids(driver.next_chunk().unwrap().unwrap()), vec![11]);
        assert!(driver.next_chunk().unwrap().is_none());
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn init_is_idempotent() {
        let driver = RangeDriver::new();
        driver
            .init(&Config::new().with(keys::WORK_RANGE_TOP, 2))
            .unwrap();
        // A second init with a different range has no effect.
        driver
            .init(&Config::new().with(keys::WORK_RANGE_TOP, 500))
            .unwrap();
        assert_eq!(ids(driver.next_chunk().unwrap().unwrap()), vec![0, 1]);
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn init_rejects_bad_configuration() {
        assert!(matches!(
            RangeDriver::new().init(&Config::new()),
            Err(Error::MissingConfig { .. })
        ));
        assert!(matches!(
            RangeDriver::new().init(
                &Config::new()
                    .with(keys::WORK_RANGE_TOP, 10)
                    .with(keys::WORK_BATCH_SIZE, 0)
            ),
            Err(Error::InvalidConfig { .. })
        ));
        assert!(matches!(
            RangeDriver::new().init(
                &Config::new()
                    .with(keys::WORK_RANGE_FLOOR, 11)
                    .with(keys::WORK_RANGE_TOP, 10)
            ),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn close_ends_distribution() {
        let driver = RangeDriver::with_range(0, 100, 10);
        assert!(driver.next_chunk().unwrap().is_some());
        driver.close().unwrap();
        assert!(driver.next_chunk().unwrap().is_none());
    }

    #[test]
    fn empty_range_is_immediately_exhausted() {
        let driver = RangeDriver::with_range(4, 4, 10);
        assert!(driver.next_chunk().unwrap().is_none());
    }
}
