//! Pluggable sources, sinks and codecs.
//!
//! The engine only talks to these traits. Concrete implementations are built
//! from configuration through the [`Registry`](crate::Registry); the
//! reference implementations below are registered by default:
//!
//! | Concern  | Name        | Type                 |
//! |----------|-------------|----------------------|
//! | emitter  | `synthetic` | [`SyntheticEmitter`] |
//! | emitter  | `jsonl`     | [`JsonLinesEmitter`] |
//! | output   | `memory`    | [`MemoryOutput`]     |
//! | output   | `jsonl`     | [`JsonLinesOutput`]  |
//! | codec    | `json`      | [`JsonEncoder`], [`JsonDecoder`] |

mod json;
mod jsonl;
mod memory;
mod metrics;
mod session;
mod synthetic;

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use json::*;
pub use jsonl::*;
pub use memory::*;
pub use metrics::*;
pub use session::*;
pub use synthetic::*;

use crate::{Element, ElementKind, Phase, Result, driver::WorkChunkDriver, emit::Emitable};

/// A lazy stream of top-level emitables.
pub type EmitStream<'a> = Box<dyn Iterator<Item = Result<Box<dyn Emitable>>> + Send + 'a>;

/// Turns work chunks into graph elements.
///
/// One emitter is built per pipeline slot; building it from configuration is
/// its initialization.
pub trait Emitter: Send + Sync + fmt::Debug {
    /// Phases this emitter can produce elements for.
    fn phases(&self) -> &[Phase];

    /// Streams the elements for `phase`.
    ///
    /// The stream must keep pulling `driver` until it reports exhaustion, so
    /// that all pipelines sharing the driver drain it together.
    fn stream<'a>(&'a self, driver: &'a dyn WorkChunkDriver, phase: Phase) -> EmitStream<'a>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A sink for graph elements.
pub trait Output: Send + Sync + fmt::Debug {
    /// Opens a writer for elements of `kind` labelled `label`.
    fn writer(&self, kind: ElementKind, label: &str) -> Result<Box<dyn OutputWriter>>;

    /// Named counters describing what has been written so far.
    fn metrics(&self) -> BTreeMap<String, u64>;

    /// Removes everything previously written to this sink.
    fn drop_storage(&self) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// Writes elements of one (kind, label) pair.
pub trait OutputWriter: Send {
    fn write_to_output(&mut self, element: &Element) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Renders elements for text sinks.
pub trait Encoder: Send + Sync + fmt::Debug {
    fn encode(&self, element: &Element) -> Result<String>;

    /// Describes the layout of the records written after it, if the encoding
    /// has one.
    fn encode_item_metadata(&self, element: &Element) -> Option<String>;
}

/// Parses elements read by text sources.
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Decodes one raw entry. `header` is the most recent metadata line seen
    /// in the same unit of work.
    fn decode_element(&self, raw: &str, header: Option<&str>, phase: Phase) -> Result<Element>;

    /// Returns `true` for entries that carry no element (blank lines,
    /// comments, metadata headers).
    fn skip_entry(&self, raw: &str) -> bool;
}

/// The encoder and decoder loaded for a phase.
#[derive(Debug, Clone)]
pub struct Codecs {
    pub encoder: Arc<dyn Encoder>,
    pub decoder: Arc<dyn Decoder>,
}

impl Default for Codecs {
    fn default() -> Self {
        Self {
            encoder: Arc::new(JsonEncoder),
            decoder: Arc::new(JsonDecoder),
        }
    }
}
