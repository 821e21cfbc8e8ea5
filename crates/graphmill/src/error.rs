//! Error types for the migration engine.
//!
//! This module defines the central [`Error`] enum, which captures every
//! reportable failure raised while configuring or running a phase.
//!
//! ## Error Cases
//! - Configuration (`MissingConfig`, `InvalidConfig`, `UnknownComponent`):
//!   raised at phase start, before any worker is launched.
//! - Per element (`Emit`, `Codec`, `Io`, `IdSpaceExhausted`,
//!   `UnsupportedWork`): raised while walking a single emitable and routed to
//!   the active [`ErrorHandler`](crate::ErrorHandler).
//! - State (`DriverNotInitialized`, `PipelineAlreadyStarted`,
//!   `PhaseAlreadyRunning`): programmer errors that must fail loudly.
//! - Run (`Aborted`, `WorkerPanicked`, `Runtime`): reported by the processor
//!   and the phase handle.
//!
//! Driver exhaustion is never an error: it is signalled by `Ok(None)`.

use std::sync::Arc;

use crate::Phase;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the migration engine.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A required configuration key was not set.
    #[error("Missing required config key `{key}`")]
    MissingConfig { key: String },

    /// A configuration value could not be parsed or is out of range.
    #[error("Invalid value `{value}` for config key `{key}`: {reason}")]
    InvalidConfig {
        key: String,
        value: String,
        reason: String,
    },

    /// No factory is registered under the configured name.
    #[error("No {kind} registered under `{name}`")]
    UnknownComponent { kind: &'static str, name: String },

    /// A work chunk driver was pulled before `init` was called.
    #[error("Work chunk driver `{driver}` used before init")]
    DriverNotInitialized { driver: &'static str },

    /// The output ID driver has no identities left to hand out.
    #[error("Output ID space exhausted")]
    IdSpaceExhausted,

    /// A component received a unit of work it cannot process.
    #[error("{component} cannot process work unit {unit}")]
    UnsupportedWork {
        component: &'static str,
        unit: String,
    },

    /// Emitting a single element failed.
    #[error("Failed to emit {element}: {source}")]
    Emit {
        element: String,
        #[source]
        source: Box<Error>,
    },

    /// An element could not be encoded or decoded.
    #[error("Codec error: {reason}")]
    Codec { reason: String },

    /// An I/O operation of a source or sink failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A pipeline was started twice.
    #[error("Pipeline for slot {slot} was already started")]
    PipelineAlreadyStarted { slot: usize },

    /// A phase was started while an earlier run of it had not been closed.
    #[error("Phase {phase} is still running; close it before starting it again")]
    PhaseAlreadyRunning { phase: Phase },

    /// A pipeline worker panicked.
    #[error("Worker for slot {slot} panicked")]
    WorkerPanicked { slot: usize },

    /// The run was aborted before this operation completed.
    #[error("Run aborted")]
    Aborted,

    /// The runtime itself failed (e.g. the worker pool could not be built).
    #[error("Runtime error: {reason}")]
    Runtime { reason: String },
}

impl Error {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source: Arc::new(source),
        }
    }

    /// Wraps a failure with a rendering of the element that caused it.
    pub fn emit(element: impl Into<String>, source: Self) -> Self {
        Self::Emit {
            element: element.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` for errors raised while resolving configuration.
    pub const fn is_config(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. } | Self::InvalidConfig { .. } | Self::UnknownComponent { .. }
        )
    }

    /// Returns the innermost cause, unwrapping any [`Error::Emit`] layers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Emit { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_nested_emit_errors() {
        let err = Error::emit("outer", Error::emit("inner", Error::IdSpaceExhausted));
        assert!(matches!(err.root_cause(), Error::IdSpaceExhausted));
        assert_eq!(
            err.to_string(),
            "Failed to emit outer: Failed to emit inner: Output ID space exhausted"
        );
    }

    #[test]
    fn config_errors_are_classified() {
        assert!(Error::MissingConfig { key: "k".into() }.is_config());
        assert!(
            Error::UnknownComponent {
                kind: "output",
                name: "nope".into()
            }
            .is_config()
        );
        assert!(!Error::Aborted.is_config());
    }
}
