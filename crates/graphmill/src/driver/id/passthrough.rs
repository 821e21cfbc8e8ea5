use crate::{Element, OutputId, driver::id::OutputIdDriver};

/// Reuses the identity carried by the source element.
///
/// A vertex keeps its own id and an edge hint maps to its destination id.
/// Without a hint there is nothing to mirror, so [`OutputIdDriver::next_id`]
/// returns `None`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughIdDriver;

impl OutputIdDriver for PassthroughIdDriver {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn next_id(&self) -> Option<OutputId> {
        None
    }

    fn next_id_for(&self, hint: &Element) -> Option<OutputId> {
        Some(OutputId(hint.source_id()))
    }
}
