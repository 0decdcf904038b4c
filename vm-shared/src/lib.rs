//! Shared types for the prototype VM and its Synaptic Bridge.
//!
//! This crate emits logs using the `log` façade; configure the logging
//! backend of your choice during the initialization of the consuming
//! application.

pub mod error;
pub mod trace;
pub mod wire;

pub use error::Fault;
pub use trace::TraceContext;
pub use wire::{ResponseMap, TaskDescriptor, WireValue};
