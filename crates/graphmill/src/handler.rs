//! Failure routing.
//!
//! Every per-element and per-worker failure is shown to an [`ErrorHandler`],
//! which decides whether the run carries on. The default
//! [`LoggingErrorHandler`] logs the failure and applies the configured
//! `runtime.on_error` policy.

use core::fmt;
use core::str::FromStr;

use crate::{Config, Error, Phase, Result, config::keys};

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Skip the failing element (or end the failing worker) and carry on.
    Continue,
    /// Stop every worker of the run.
    Abort,
}

/// Where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorContext {
    pub phase: Phase,
    pub slot: usize,
}

pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &Error, ctx: &ErrorContext) -> Disposition;
}

impl<F> ErrorHandler for F
where
    F: Fn(&Error, &ErrorContext) -> Disposition + Send + Sync,
{
    fn handle(&self, error: &Error, ctx: &ErrorContext) -> Disposition {
        self(error, ctx)
    }
}

/// The `runtime.on_error` setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    #[default]
    Continue,
    Abort,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Continue => "continue",
            Self::Abort => "abort",
        })
    }
}

impl FromStr for ErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(Self::Continue),
            "abort" => Ok(Self::Abort),
            other => Err(Error::InvalidConfig {
                key: keys::ON_ERROR.to_string(),
                value: other.to_string(),
                reason: "expected `continue` or `abort`".to_string(),
            }),
        }
    }
}

/// Logs every failure through `tracing` and applies a fixed policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingErrorHandler {
    policy: ErrorPolicy,
}

impl LoggingErrorHandler {
    pub const fn new(policy: ErrorPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.parse_or(keys::ON_ERROR, ErrorPolicy::Continue)?))
    }

    pub const fn policy(&self) -> ErrorPolicy {
        self.policy
    }
}

impl ErrorHandler for LoggingErrorHandler {
    fn handle(&self, error: &Error, ctx: &ErrorContext) -> Disposition {
        match self.policy {
            ErrorPolicy::Continue => {
                tracing::warn!(phase = %ctx.phase, slot = ctx.slot, %error, "Skipping failed element");
                Disposition::Continue
            }
            ErrorPolicy::Abort => {
                tracing::error!(phase = %ctx.phase, slot = ctx.slot, %error, "Aborting run");
                Disposition::Abort
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parses_from_config() {
        let handler = LoggingErrorHandler::from_config(&Config::new()).unwrap();
        assert_eq!(handler.policy(), ErrorPolicy::Continue);

        let handler =
            LoggingErrorHandler::from_config(&Config::new().with(keys::ON_ERROR, "ABORT")).unwrap();
        assert_eq!(handler.policy(), ErrorPolicy::Abort);

        assert!(matches!(
            LoggingErrorHandler::from_config(&Config::new().with(keys::ON_ERROR, "retry")),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn disposition_follows_policy() {
        let ctx = ErrorContext {
            phase: Phase::One,
            slot: 0,
        };
        let err = Error::IdSpaceExhausted;
        assert_eq!(
            LoggingErrorHandler::new(ErrorPolicy::Continue).handle(&err, &ctx),
            Disposition::Continue
        );
        assert_eq!(
            LoggingErrorHandler::new(ErrorPolicy::Abort).handle(&err, &ctx),
            Disposition::Abort
        );
    }
}
