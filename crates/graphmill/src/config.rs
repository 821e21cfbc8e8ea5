//! Flat key/value configuration.
//!
//! [`Config`] is a string-to-string map read by every component. Components
//! declare their own default maps and apply them with
//! [`Config::with_defaults`], so an unset key always resolves to the same
//! value regardless of who reads it.
//!
//! Two layers of scoping are supported:
//!
//! - **Phase scope**: `phase.one.<key>` / `phase.two.<key>` override `<key>`
//!   in the view returned by [`Config::for_phase`]. This is how a run selects
//!   a different work driver or ID strategy per phase.
//! - **Slot scope**: `slot.<n>.<key>` overrides `<key>` in the view returned
//!   by [`Config::for_slot`], which also injects `pipeline.slot` and
//!   `pipeline.count`.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use crate::{Error, Phase, Result};

/// Well-known configuration keys.
pub mod keys {
    /// Number of pipelines per phase and worker threads in the pool.
    pub const PARALLELISM: &str = "runtime.parallelism";
    /// `continue` or `abort`.
    pub const ON_ERROR: &str = "runtime.on_error";

    /// Registered name of the work chunk driver.
    pub const WORK_DRIVER: &str = "work.driver";
    pub const WORK_BATCH_SIZE: &str = "work.batch.size";
    pub const WORK_RANGE_FLOOR: &str = "work.range.floor";
    pub const WORK_RANGE_TOP: &str = "work.range.top";
    pub const WORK_DIRECTORY_PATH: &str = "work.directory.path";
    pub const WORK_DIRECTORY_EXTENSION: &str = "work.directory.extension";

    /// Registered name of the output ID driver.
    pub const ID_DRIVER: &str = "id.driver";
    pub const ID_FLOOR: &str = "id.floor";
    pub const ID_CEILING: &str = "id.ceiling";
    pub const ID_MACHINE: &str = "id.machine";

    pub const EMITTER: &str = "emitter";
    pub const OUTPUT: &str = "output";
    pub const OUTPUT_DROP_STORAGE: &str = "output.drop_storage";
    pub const OUTPUT_JSONL_PATH: &str = "output.jsonl.path";
    pub const ENCODER: &str = "encoder";
    pub const DECODER: &str = "decoder";

    pub const SYNTHETIC_VERTEX_LABEL: &str = "synthetic.vertex.label";
    pub const SYNTHETIC_EDGE_LABEL: &str = "synthetic.edge.label";
    pub const SYNTHETIC_EDGE_FANOUT: &str = "synthetic.edge.fanout";
    pub const SYNTHETIC_EDGE_MATERIALIZE: &str = "synthetic.edge.materialize";

    /// Injected per pipeline.
    pub const PIPELINE_SLOT: &str = "pipeline.slot";
    /// Injected per pipeline.
    pub const PIPELINE_COUNT: &str = "pipeline.count";
}

/// Engine-wide defaults for keys read by the runtime itself.
pub const RUNTIME_DEFAULTS: &[(&str, &str)] = &[
    (keys::ON_ERROR, "continue"),
    (keys::WORK_DRIVER, "range"),
    (keys::ID_DRIVER, "ranged"),
    (keys::EMITTER, "synthetic"),
    (keys::OUTPUT, "memory"),
    (keys::OUTPUT_DROP_STORAGE, "false"),
    (keys::ENCODER, "json"),
    (keys::DECODER, "json"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    /// Builder-style variant of [`Self::set`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the value of `key` or [`Error::MissingConfig`].
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| Error::MissingConfig {
            key: key.to_string(),
        })
    }

    /// Parses the value of `key`, if set.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| Error::InvalidConfig {
                    key: key.to_string(),
                    value: raw.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parses the value of `key`, falling back to `default` when unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Parses the value of `key`, failing when it is unset.
    pub fn parse_required<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.parse(key)?.ok_or_else(|| Error::MissingConfig {
            key: key.to_string(),
        })
    }

    /// Returns a copy where every key of `defaults` that is not already set
    /// takes the declared default value.
    #[must_use]
    pub fn with_defaults(&self, defaults: &[(&str, &str)]) -> Self {
        let mut merged = self.clone();
        for (key, value) in defaults {
            merged
                .values
                .entry((*key).to_string())
                .or_insert_with(|| (*value).to_string());
        }
        merged
    }

    /// Resolves the view of this configuration seen by `phase`.
    #[must_use]
    pub fn for_phase(&self, phase: Phase) -> Self {
        self.overlay(&format!("phase.{phase}."))
    }

    /// Resolves the view seen by the pipeline in `slot` out of `count`.
    #[must_use]
    pub fn for_slot(&self, slot: usize, count: usize) -> Self {
        let mut view = self.overlay(&format!("slot.{slot}."));
        view.set(keys::PIPELINE_SLOT, slot);
        view.set(keys::PIPELINE_COUNT, count);
        view
    }

    /// Parses a `key=value` assignment, as accepted on the command line.
    pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
        match raw.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(Error::InvalidConfig {
                key: raw.to_string(),
                value: String::new(),
                reason: "expected `key=value`".to_string(),
            }),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn overlay(&self, prefix: &str) -> Self {
        let mut view = self.clone();
        for (key, value) in &self.values {
            if let Some(stripped) = key.strip_prefix(prefix) {
                view.values.insert(stripped.to_string(), value.clone());
            }
        }
        view
    }
}

impl<K, V> FromIterator<(K, V)> for Config
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
