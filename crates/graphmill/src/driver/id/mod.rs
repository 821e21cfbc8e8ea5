//! Output identity strategies.
//!
//! - [`RangedIdDriver`]: a shared counter between a floor and a ceiling.
//! - [`GeneratedIdDriver`]: lock-free, time-ordered snowflake-style ids.
//! - [`PassthroughIdDriver`]: mirrors the identity found on the source
//!   element.

mod generated;
mod passthrough;
mod ranged;

use core::fmt;

pub use generated::*;
pub use passthrough::*;
pub use ranged::*;

use crate::{Element, OutputId};

/// A supplier of identities for newly written elements.
///
/// A driver is a per-phase singleton shared by every pipeline of the phase,
/// so implementations must be safe under concurrent calls.
pub trait OutputIdDriver: Send + Sync + fmt::Debug {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the next identity, or `None` once the strategy has nothing
    /// left to hand out.
    fn next_id(&self) -> Option<OutputId>;

    /// Returns the next identity for `hint`.
    ///
    /// Counter-based strategies ignore the hint; passthrough derives the
    /// identity from it.
    fn next_id_for(&self, hint: &Element) -> Option<OutputId> {
        let _ = hint;
        self.next_id()
    }
}
