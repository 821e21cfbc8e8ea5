use core::fmt;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::{
    Element, ElementKind, Error, OutputId, Result,
    adapter::{Output, OutputWriter},
    driver::id::OutputIdDriver,
};

/// A worker's connection to its sink.
///
/// Writers are opened lazily, one per (kind, label) pair, and reused for the
/// lifetime of the session. Vertices are assigned their output identity from
/// the phase's [`OutputIdDriver`] before they are written; edges are written
/// as they are.
pub struct SinkSession {
    output: Arc<dyn Output>,
    ids: Arc<dyn OutputIdDriver>,
    writers: HashMap<(ElementKind, String), Box<dyn OutputWriter>>,
    written: u64,
}

impl fmt::Debug for SinkSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkSession")
            .field("output", &self.output)
            .field("ids", &self.ids)
            .field("writers", &self.writers.len())
            .field("written", &self.written)
            .finish()
    }
}

impl SinkSession {
    pub fn new(output: Arc<dyn Output>, ids: Arc<dyn OutputIdDriver>) -> Self {
        Self {
            output,
            ids,
            writers: HashMap::new(),
            written: 0,
        }
    }

    /// Writes `element`, assigning a vertex its output identity first.
    ///
    /// Returns the identity assigned to a vertex, or `None` for an edge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdSpaceExhausted`] when the identity driver has
    /// nothing left to hand out, or the writer's error.
    pub fn write(&mut self, element: &mut Element) -> Result<Option<OutputId>> {
        let assigned = match element.kind() {
            ElementKind::Vertex => {
                let id = self
                    .ids
                    .next_id_for(element)
                    .ok_or(Error::IdSpaceExhausted)?;
                if let Element::Vertex(vertex) = element {
                    vertex.id = id.get();
                }
                Some(id)
            }
            ElementKind::Edge => None,
        };

        let writer = match self.writers.entry((element.kind(), element.label().to_owned())) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (kind, label) = entry.key();
                let writer = self.output.writer(*kind, label)?;
                entry.insert(writer)
            }
        };
        writer.write_to_output(element)?;
        self.written += 1;
        Ok(assigned)
    }

    /// Number of elements written through this session.
    pub const fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Flushes and closes every open writer.
    ///
    /// All writers are closed even if one fails; the first failure is
    /// returned.
    pub fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, mut writer) in self.writers.drain() {
            if let Err(e) = writer.flush().and_then(|()| writer.close()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
