use core::{cmp, fmt};

use portable_atomic::{AtomicBool, AtomicU64, Ordering};

use crate::{
    Config, Error, OutputId, Result,
    clock::{MonotonicClock, TimeSource},
    config::keys,
    driver::id::OutputIdDriver,
};

const TIMESTAMP_BITS: u32 = 41;
const MACHINE_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;

const SEQUENCE_SHIFT: u32 = 0;
const MACHINE_SHIFT: u32 = SEQUENCE_SHIFT + SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = MACHINE_SHIFT + MACHINE_BITS;

const TIMESTAMP_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;
const MACHINE_MASK: u64 = (1 << MACHINE_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;

/// Largest accepted value of `id.machine`.
pub const MAX_MACHINE_ID: u64 = MACHINE_MASK;

/// Outcome of a single generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStatus {
    /// A unique identity was generated.
    Ready { id: OutputId },
    /// The sequence is exhausted for the current millisecond, or another
    /// caller won the race. Retry after `yield_for` milliseconds (zero means
    /// retry immediately).
    Pending { yield_for: u64 },
}

/// Lock-free, time-ordered identities.
///
/// Each identity packs, from most to least significant bits:
///
/// ```text
///  Bit Index:  63           63 62            22 21             12 11             0
///              +--------------+----------------+-----------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | machine ID (10) | sequence (12) |
///              +--------------+----------------+-----------------+---------------+
/// ```
///
/// The whole state lives in one [`AtomicU64`] advanced with compare-and-swap:
/// within a millisecond the sequence is incremented, a later millisecond
/// resets it to zero. Identities therefore never repeat and sort by creation
/// time while the clock stays monotonic.
///
/// ## Configuration
/// - `id.machine` (default `0`, at most [`MAX_MACHINE_ID`])
/// - `id.ceiling` (default `u64::MAX`): once an identity at or above the
///   ceiling would be produced, the driver returns `None` forever.
pub struct GeneratedIdDriver<T = MonotonicClock>
where
    T: TimeSource,
{
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    state: AtomicU64,
    machine_id: u64,
    ceiling: u64,
    exhausted: AtomicBool,
    time: T,
}

impl<T: TimeSource> fmt::Debug for GeneratedIdDriver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedIdDriver")
            .field("machine_id", &self.machine_id)
            .field("ceiling", &self.ceiling)
            .field("exhausted", &self.exhausted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl GeneratedIdDriver<MonotonicClock> {
    pub fn from_config(config: &Config) -> Result<Self> {
        let machine_id: u64 = config.parse_or(keys::ID_MACHINE, 0)?;
        if machine_id > MAX_MACHINE_ID {
            return Err(Error::InvalidConfig {
                key: keys::ID_MACHINE.to_string(),
                value: machine_id.to_string(),
                reason: format!("must be at most {MAX_MACHINE_ID}"),
            });
        }
        let ceiling: u64 = config.parse_or(keys::ID_CEILING, u64::MAX)?;
        Ok(Self::new(machine_id, MonotonicClock::default()).with_ceiling(ceiling))
    }
}

impl<T: TimeSource> GeneratedIdDriver<T> {
    /// Creates a driver stamping `machine_id` into every identity.
    ///
    /// Only the low 10 bits of `machine_id` are kept.
    pub fn new(machine_id: u64, time: T) -> Self {
        Self::from_components(0, machine_id, 0, time)
    }

    /// Creates a driver preloaded with explicit state, e.g. to resume after a
    /// previous run.
    pub fn from_components(timestamp: u64, machine_id: u64, sequence: u64, time: T) -> Self {
        let initial = pack(timestamp, machine_id, sequence);
        Self {
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(AtomicU64::new(initial)),
            #[cfg(not(feature = "cache-padded"))]
            state: AtomicU64::new(initial),
            machine_id: machine_id & MACHINE_MASK,
            ceiling: u64::MAX,
            exhausted: AtomicBool::new(false),
            time,
        }
    }

    #[must_use]
    pub fn with_ceiling(mut self, ceiling: u64) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Makes one generation attempt without blocking.
    pub fn try_next(&self) -> IdStatus {
        let now = self.time.current_millis() & TIMESTAMP_MASK;

        let current = self.state.load(Ordering::Relaxed);
        let current_ts = timestamp_of(current);

        let next = match now.cmp(&current_ts) {
            cmp::Ordering::Equal => {
                if sequence_of(current) < SEQUENCE_MASK {
                    current + 1
                } else {
                    return IdStatus::Pending { yield_for: 1 };
                }
            }
            cmp::Ordering::Greater => pack(now, self.machine_id, 0),
            cmp::Ordering::Less => return cold_clock_behind(now, current_ts),
        };

        if self
            .state
            .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            IdStatus::Ready { id: OutputId(next) }
        } else {
            // Another thread won the race; retry immediately.
            IdStatus::Pending { yield_for: 0 }
        }
    }
}

#[cold]
#[inline(never)]
fn cold_clock_behind(now: u64, current_ts: u64) -> IdStatus {
    IdStatus::Pending {
        yield_for: current_ts - now,
    }
}

impl<T: TimeSource> OutputIdDriver for GeneratedIdDriver<T> {
    fn name(&self) -> &'static str {
        "generated"
    }

    fn next_id(&self) -> Option<OutputId> {
        if self.exhausted.load(Ordering::Acquire) {
            return None;
        }
        let id = loop {
            match self.try_next() {
                IdStatus::Ready { id } => break id,
                IdStatus::Pending { .. } => std::thread::yield_now(),
            }
        };
        if id.get() >= self.ceiling {
            self.exhausted.store(true, Ordering::Release);
            tracing::warn!(ceiling = self.ceiling, "Generated id space exhausted");
            return None;
        }
        Some(id)
    }
}

const fn pack(timestamp: u64, machine_id: u64, sequence: u64) -> u64 {
    ((timestamp & TIMESTAMP_MASK) << TIMESTAMP_SHIFT)
        | ((machine_id & MACHINE_MASK) << MACHINE_SHIFT)
        | ((sequence & SEQUENCE_MASK) << SEQUENCE_SHIFT)
}

const fn timestamp_of(raw: u64) -> u64 {
    (raw >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK
}

const fn sequence_of(raw: u64) -> u64 {
    (raw >> SEQUENCE_SHIFT) & SEQUENCE_MASK
}
