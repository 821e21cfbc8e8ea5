use crate::{
    Edge, Element, Result, Vertex,
    adapter::SinkSession,
    emit::{Emitable, FollowOn},
};

/// An edge whose destination vertex must exist before the edge is written.
///
/// Emitting it writes the destination vertex (labelled `endpoint_label`,
/// keyed by the edge's `to`), then yields the edge, rewired to the identity
/// the vertex was assigned, as its only follow-on.
#[derive(Debug, Clone)]
pub struct DependentEdge {
    edge: Edge,
    endpoint_label: String,
}

impl DependentEdge {
    pub fn new(edge: Edge, endpoint_label: impl Into<String>) -> Self {
        Self {
            edge,
            endpoint_label: endpoint_label.into(),
        }
    }
}

impl Emitable for DependentEdge {
    fn emit(&mut self, session: &mut SinkSession) -> Result<FollowOn> {
        let mut endpoint = Element::from(Vertex::new(self.edge.to, self.endpoint_label.as_str()));
        let mut edge = self.edge.clone();
        if let Some(id) = session.write(&mut endpoint)? {
            edge.to = id.get();
        }
        let edge: Box<dyn Emitable> = Box::new(Element::Edge(edge));
        Ok(Box::new(core::iter::once(Ok(edge))))
    }
}
