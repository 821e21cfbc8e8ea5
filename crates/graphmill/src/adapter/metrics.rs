use std::collections::BTreeMap;

use portable_atomic::{AtomicU64, Ordering};

use crate::ElementKind;

pub const VERTICES_WRITTEN: &str = "vertices_written";
pub const EDGES_WRITTEN: &str = "edges_written";

/// Write counters shared between an output and its writers.
#[derive(Debug, Default)]
pub struct OutputMetrics {
    vertices: AtomicU64,
    edges: AtomicU64,
}

impl OutputMetrics {
    pub fn record(&self, kind: ElementKind) {
        match kind {
            ElementKind::Vertex => self.vertices.fetch_add(1, Ordering::Relaxed),
            ElementKind::Edge => self.edges.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn written(&self, kind: ElementKind) -> u64 {
        match kind {
            ElementKind::Vertex => self.vertices.load(Ordering::Relaxed),
            ElementKind::Edge => self.edges.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            (VERTICES_WRITTEN.to_string(), self.written(ElementKind::Vertex)),
            (EDGES_WRITTEN.to_string(), self.written(ElementKind::Edge)),
        ])
    }

    pub fn reset(&self) {
        self.vertices.store(0, Ordering::Relaxed);
        self.edges.store(0, Ordering::Relaxed);
    }
}
