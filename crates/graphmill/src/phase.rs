use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// One of the two ordered stages of a migration run.
///
/// Phase [`Phase::One`] conventionally produces vertices and [`Phase::Two`]
/// produces edges that may reference identities created during phase one.
/// Phases only run in order when the caller sequences them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    One,
    Two,
}

impl Phase {
    /// Both phases, in execution order.
    pub const ALL: [Self; 2] = [Self::One, Self::Two];

    /// The element kind this phase conventionally produces.
    pub const fn kind(self) -> ElementKind {
        match self {
            Self::One => ElementKind::Vertex,
            Self::Two => ElementKind::Edge,
        }
    }

    /// Lowercase name used in configuration keys (`phase.one.*`).
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::One => "one",
            Self::Two => "two",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "one" | "1" => Ok(Self::One),
            "two" | "2" => Ok(Self::Two),
            other => Err(Error::InvalidConfig {
                key: "phase".to_string(),
                value: other.to_string(),
                reason: "expected `one` or `two`".to_string(),
            }),
        }
    }
}

/// The kind of a graph element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Vertex,
    Edge,
}

impl ElementKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Edge => "edge",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_phase_names_and_numbers() {
        assert_eq!("one".parse::<Phase>().unwrap(), Phase::One);
        assert_eq!(" TWO ".parse::<Phase>().unwrap(), Phase::Two);
        assert_eq!("2".parse::<Phase>().unwrap(), Phase::Two);
        assert!("three".parse::<Phase>().is_err());
    }

    #[test]
    fn phases_map_to_conventional_kinds() {
        assert_eq!(Phase::One.kind(), ElementKind::Vertex);
        assert_eq!(Phase::Two.kind(), ElementKind::Edge);
        assert!(Phase::One < Phase::Two);
    }
}
