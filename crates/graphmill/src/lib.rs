#![doc = include_str!("../README.md")]

pub mod adapter;
mod clock;
pub mod config;
mod context;
pub mod driver;
mod element;
pub mod emit;
mod error;
mod handler;
mod phase;
mod phase_runner;
mod pipeline;
mod processor;
mod registry;
mod runtime;


pub use crate::clock::*;
pub use crate::config::Config;
pub use crate::context::*;
pub use crate::element::*;
pub use crate::error::*;
pub use crate::handler::*;
pub use crate::phase::*;
pub use crate::phase_runner::*;
pub use crate::pipeline::*;
pub use crate::processor::PhaseSummary;
pub use crate::registry::*;
pub use crate::runtime::*;
