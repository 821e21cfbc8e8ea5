//! Graph elements written to sinks.

use core::fmt;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ElementKind;

/// Arbitrary element properties, kept in key order so encodings are stable.
pub type Properties = BTreeMap<String, serde_json::Value>;

/// The identity assigned to an element when it is written to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputId(pub u64);

impl OutputId {
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OutputId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: u64,
    pub label: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl Vertex {
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub label: String,
    pub from: u64,
    pub to: u64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl Edge {
    pub fn new(label: impl Into<String>, from: u64, to: u64) -> Self {
        Self {
            label: label.into(),
            from,
            to,
            properties: Properties::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A vertex or an edge.
///
/// Serialized as an internally tagged object, e.g.
/// `{"type":"vertex","id":7,"label":"person"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Vertex(Vertex),
    Edge(Edge),
}

impl Element {
    pub const fn kind(&self) -> ElementKind {
        match self {
            Self::Vertex(_) => ElementKind::Vertex,
            Self::Edge(_) => ElementKind::Edge,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Vertex(v) => &v.label,
            Self::Edge(e) => &e.label,
        }
    }

    /// The identity this element carries from its source: the vertex id, or
    /// the destination id of an edge.
    pub const fn source_id(&self) -> u64 {
        match self {
            Self::Vertex(v) => v.id,
            Self::Edge(e) => e.to,
        }
    }
}

impl From<Vertex> for Element {
    fn from(v: Vertex) -> Self {
        Self::Vertex(v)
    }
}

impl From<Edge> for Element {
    fn from(e: Edge) -> Self {
        Self::Edge(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_serialize_with_a_type_tag() {
        let v = Element::from(Vertex::new(7, "person").with_property("name", "ada"));
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(
            json,
            r#"{"type":"vertex","id":7,"label":"person","properties":{"name":"ada"}}"#
        );

        let e: Element = serde_json::from_str(r#"{"type":"edge","label":"knows","from":1,"to":2}"#).unwrap();
        assert_eq!(e, Element::Edge(Edge::new("knows", 1, 2)));
        assert_eq!(e.kind(), ElementKind::Edge);
    }

    #[test]
    fn source_id_is_the_edge_destination() {
        assert_eq!(Element::from(Vertex::new(42, "v")).source_id(), 42);
        assert_eq!(Element::from(Edge::new("e", 1, 9)).source_id(), 9);
    }
}
