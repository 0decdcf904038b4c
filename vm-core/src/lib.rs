//! A prototype-based message-passing VM core: object heap, incremental
//! tricolor collector, weak links, cuckoo-hashed slots, message trees, the
//! evaluator, and a cooperative coroutine scheduler.
//!
//! This package emits logs through the `log` façade; configure the backend
//! of your choice during initialization of the embedding application.

pub mod block;
pub mod builtins;
pub mod call;
pub mod collector;
pub mod coroutine;
pub mod embed;
pub mod evaluator;
pub mod ffi;
pub mod heap;
pub mod message;
pub mod object;
pub mod operators;
pub mod sandbox;
pub mod slots;
pub mod state;
pub mod symbol;
pub mod toy_parser;
pub mod weak;

pub use block::{Activatable, Block, CFunction};
pub use call::Call;
pub use coroutine::{Coroutine, CoroutineId, StopStatus};
pub use evaluator::Evaluator;
pub use heap::{ObjectHeap, ObjectId};
pub use message::Message;
pub use object::{Object, ObjectKind};
pub use sandbox::SandboxConfig;
pub use slots::Slots;
pub use state::State;
pub use symbol::{Symbol, SymbolTable};

pub use vm_shared::error::{Fault, SandboxReason};

/// Convenience alias used across the evaluator and primitives.
pub type VmResult<T> = Result<T, Fault>;
