use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

use crate::{
    Config, Element, ElementKind, Result,
    adapter::{Output, OutputMetrics, OutputWriter},
};

/// An in-process element store.
///
/// Cloning is cheap and every clone sees the same elements, so one store can
/// back the outputs of every slot (and be inspected afterwards).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    elements: Arc<Mutex<Vec<Element>>>,
}

impl MemoryStore {
    /// Every element written so far, in write order.
    pub fn elements(&self) -> Vec<Element> {
        self.elements.lock().clone()
    }

    pub fn vertices(&self) -> Vec<crate::Vertex> {
        self.elements
            .lock()
            .iter()
            .filter_map(|e| match e {
                Element::Vertex(v) => Some(v.clone()),
                Element::Edge(_) => None,
            })
            .collect()
    }

    pub fn edges(&self) -> Vec<crate::Edge> {
        self.elements
            .lock()
            .iter()
            .filter_map(|e| match e {
                Element::Edge(e) => Some(e.clone()),
                Element::Vertex(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.elements.lock().clear();
    }

    fn push(&self, element: Element) {
        self.elements.lock().push(element);
    }
}

/// Output backed by a [`MemoryStore`].
#[derive(Debug, Default)]
pub struct MemoryOutput {
    store: MemoryStore,
    metrics: Arc<OutputMetrics>,
    writers_opened: AtomicUsize,
}

impl MemoryOutput {
    pub fn with_store(store: MemoryStore) -> Self {
        Self {
            store,
            ..Self::default()
        }
    }

    /// Builds an output over a fresh store. The store is private to this
    /// output; use [`Self::with_store`] to share one.
    pub fn from_config(_config: &Config) -> Self {
        Self::default()
    }

    pub const fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Number of writers handed out so far.
    pub fn writers_opened(&self) -> usize {
        self.writers_opened.load(Ordering::Relaxed)
    }
}

impl Output for MemoryOutput {
    fn writer(&self, kind: ElementKind, label: &str) -> Result<Box<dyn OutputWriter>> {
        self.writers_opened.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(%kind, label, "Opening memory writer");
        Ok(Box::new(MemoryWriter {
            store: self.store.clone(),
            metrics: Arc::clone(&self.metrics),
        }))
    }

    fn metrics(&self) -> BTreeMap<String, u64> {
        self.metrics.snapshot()
    }

    fn drop_storage(&self) -> Result<()> {
        self.store.clear();
        self.metrics.reset();
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryWriter {
    store: MemoryStore,
    metrics: Arc<OutputMetrics>,
}

impl OutputWriter for MemoryWriter {
    fn write_to_output(&mut self, element: &Element) -> Result<()> {
        self.store.push(element.clone());
        self.metrics.record(element.kind());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, Vertex, adapter::{EDGES_WRITTEN, VERTICES_WRITTEN}};

    #[test]
    fn shared_store_sees_writes_from_every_output() {
        let store = MemoryStore::default();
        let a = MemoryOutput::with_store(store.clone());
        let b = MemoryOutput::with_store(store.clone());

        a.writer(ElementKind::Vertex, "v")
            .unwrap()
            .write_to_output(&Vertex::new(1, "v").into())
            .unwrap();
        b.writer(ElementKind::Edge, "e")
            .unwrap()
            .write_to_output(&Edge::new("e", 1, 1).into())
            .unwrap();

        assert_eq!(store.vertices(), vec![Vertex::new(1, "v")]);
        assert_eq!(store.edges(), vec![Edge::new("e", 1, 1)]);
        assert_eq!(a.metrics()[VERTICES_WRITTEN], 1);
        assert_eq!(a.metrics()[EDGES_WRITTEN], 0);
        assert_eq!(b.metrics()[EDGES_WRITTEN], 1);
    }

    #[test]
    fn drop_storage_clears_the_store_and_counters() {
        let output = MemoryOutput::default();
        let mut writer = output.writer(ElementKind::Vertex, "v").unwrap();
        writer.write_to_output(&Vertex::new(1, "v").into()).unwrap();
        output.drop_storage().unwrap();
        assert!(output.store().is_empty());
        assert_eq!(output.metrics()[VERTICES_WRITTEN], 0);
    }
}
