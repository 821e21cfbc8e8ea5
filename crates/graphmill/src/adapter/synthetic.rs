use crate::{
    Config, Edge, Element, Error, Phase, Result, Vertex,
    adapter::{EmitStream, Emitter},
    config::keys,
    driver::{WorkChunk, WorkChunkDriver, WorkItem, chunks},
    emit::{DependentEdge, Emitable},
};

/// Generates a graph from numeric work items.
///
/// Phase one emits one vertex per item `n`, labelled
/// `synthetic.vertex.label` and carrying `seq = n`. Phase two emits
/// `synthetic.edge.fanout` edges per item, from `n` to `(n + k) % top` for
/// `k` in `1..=fanout`, where `top` is `work.range.top`. With
/// `synthetic.edge.materialize = true` each edge is emitted as a
/// [`DependentEdge`], writing its destination vertex first.
#[derive(Debug, Clone)]
pub struct SyntheticEmitter {
    vertex_label: String,
    edge_label: String,
    fanout: u64,
    top: Option<u64>,
    materialize: bool,
}

impl SyntheticEmitter {
    pub const DEFAULTS: &'static [(&'static str, &'static str)] = &[
        (keys::SYNTHETIC_VERTEX_LABEL, "vertex"),
        (keys::SYNTHETIC_EDGE_LABEL, "edge"),
        (keys::SYNTHETIC_EDGE_FANOUT, "1"),
        (keys::SYNTHETIC_EDGE_MATERIALIZE, "false"),
    ];

    pub fn from_config(config: &Config) -> Result<Self> {
        let config = config.with_defaults(Self::DEFAULTS);
        Ok(Self {
            vertex_label: config.require(keys::SYNTHETIC_VERTEX_LABEL)?.to_string(),
            edge_label: config.require(keys::SYNTHETIC_EDGE_LABEL)?.to_string(),
            fanout: config.parse_required(keys::SYNTHETIC_EDGE_FANOUT)?,
            top: config.parse(keys::WORK_RANGE_TOP)?.filter(|top| *top > 0),
            materialize: config.parse_required(keys::SYNTHETIC_EDGE_MATERIALIZE)?,
        })
    }

    fn vertex(&self, n: u64) -> Element {
        Vertex::new(n, self.vertex_label.as_str())
            .with_property("seq", n)
            .into()
    }

    fn edge(&self, n: u64, k: u64) -> Box<dyn Emitable> {
        let to = match self.top {
            // Widened so `n + k` cannot overflow; the remainder is below `top`.
            Some(top) => ((u128::from(n) + u128::from(k)) % u128::from(top)) as u64,
            None => n.wrapping_add(k),
        };
        let edge = Edge::new(self.edge_label.as_str(), n, to).with_property("rank", k);
        if self.materialize {
            Box::new(DependentEdge::new(edge, self.vertex_label.as_str()))
        } else {
            Box::new(Element::Edge(edge))
        }
    }

    fn for_item(&self, item: WorkItem, phase: Phase) -> EmitStream<'_> {
        let Some(n) = item.as_id() else {
            return Box::new(core::iter::once(Err(Error::UnsupportedWork {
                component: "synthetic emitter",
                unit: item.to_string(),
            })));
        };
        match phase {
            Phase::One => Box::new(core::iter::once(Ok(
                Box::new(self.vertex(n)) as Box<dyn Emitable>
            ))),
            Phase::Two => Box::new((1..=self.fanout).map(move |k| Ok::<_, Error>(self.edge(n, k)))),
        }
    }
}

impl Emitter for SyntheticEmitter {
    fn phases(&self) -> &[Phase] {
        &Phase::ALL
    }

    fn stream<'a>(&'a self, driver: &'a dyn WorkChunkDriver, phase: Phase) -> EmitStream<'a> {
        Box::new(chunks(driver).flat_map(move |chunk| -> EmitStream<'a> {
            match chunk {
                Ok(WorkChunk::Items(items)) => Box::new(
                    items
                        .into_iter()
                        .flat_map(move |item| self.for_item(item, phase)),
                ),
                Ok(unit @ WorkChunk::File(_)) => {
                    Box::new(core::iter::once(Err(Error::UnsupportedWork {
                        component: "synthetic emitter",
                        unit: unit.to_string(),
                    })))
                }
                Err(e) => Box::new(core::iter::once(Err(e))),
            }
        }))
    }
}
