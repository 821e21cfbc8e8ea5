//! Work distribution and identity allocation.
//!
//! A phase owns exactly one [`WorkChunkDriver`] and one
//! [`OutputIdDriver`](id::OutputIdDriver), shared by all of its pipelines.

pub mod id;
mod iter;
mod range;
mod work;

pub use iter::*;
pub use range::*;
pub use work::*;
