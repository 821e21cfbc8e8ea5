use portable_atomic::{AtomicU64, Ordering};

use crate::{Config, Error, OutputId, Result, config::keys, driver::id::OutputIdDriver};

/// Hands out consecutive identities from `[floor, ceiling)`.
///
/// The counter only moves forward under compare-and-swap, so no identity is
/// returned twice and, once the ceiling is reached, every later call returns
/// `None`.
#[derive(Debug)]
pub struct RangedIdDriver {
    #[cfg(feature = "cache-padded")]
    next: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    next: AtomicU64,
    ceiling: u64,
}

impl RangedIdDriver {
    pub fn new(floor: u64, ceiling: u64) -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            next: crossbeam_utils::CachePadded::new(AtomicU64::new(floor)),
            #[cfg(not(feature = "cache-padded"))]
            next: AtomicU64::new(floor),
            ceiling,
        }
    }

    /// Reads `id.floor` (default `0`) and `id.ceiling` (default `u64::MAX`).
    pub fn from_config(config: &Config) -> Result<Self> {
        let floor: u64 = config.parse_or(keys::ID_FLOOR, 0)?;
        let ceiling: u64 = config.parse_or(keys::ID_CEILING, u64::MAX)?;
        if floor > ceiling {
            return Err(Error::InvalidConfig {
                key: keys::ID_FLOOR.to_string(),
                value: floor.to_string(),
                reason: format!("floor exceeds ceiling ({ceiling})"),
            });
        }
        Ok(Self::new(floor, ceiling))
    }

    /// Number of identities not yet handed out.
    pub fn remaining(&self) -> u64 {
        self.ceiling
            .saturating_sub(self.next.load(Ordering::Relaxed))
    }
}

impl OutputIdDriver for RangedIdDriver {
    fn name(&self) -> &'static str {
        "ranged"
    }

    fn next_id(&self) -> Option<OutputId> {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            if current >= self.ceiling {
                return None;
            }
            match self.next.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Some(OutputId(current)),
                Err(actual) => current = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_floor_to_ceiling_then_none_forever() {
        let driver = RangedIdDriver::new(0, 10);
        let ids: Vec<u64> = core::iter::from_fn(|| driver.next_id())
            .map(OutputId::get)
            .collect();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        for _ in 0..3 {
            assert_eq!(driver.next_id(), None);
        }
        assert_eq!(driver.remaining(), 0);
    }

    #[test]
    fn hint_is_ignored() {
        let driver = RangedIdDriver::new(5, 7);
        let hint: crate::Element = crate::Vertex::new(42, "v").into();
        assert_eq!(driver.next_id_for(&hint), Some(OutputId(5)));
        assert_eq!(driver.next_id_for(&hint), Some(OutputId(6)));
        assert_eq!(driver.next_id_for(&hint), None);
    }

    #[test]
    fn from_config_applies_defaults_and_validates() {
        let driver = RangedIdDriver::from_config(&Config::new()).unwrap();
        assert_eq!(driver.next_id(), Some(OutputId(0)));
        assert_eq!(driver.remaining(), u64::MAX - 1);

        let bad = Config::new().with(keys::ID_FLOOR, 10).with(keys::ID_CEILING, 5);
        assert!(matches!(
            RangedIdDriver::from_config(&bad),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
