//! Synaptic Bridge: an FFI gateway from the VM to an external analytical
//! worker pool (vector search, persistence, telemetry) reachable only
//! through `submitTask` and shared-memory handles, never through direct
//! object references.
//!
//! This package emits logs through the `log` façade; configure the backend
//! of your choice during initialization of the embedding application.

pub mod bridge;
pub mod error;
pub mod ffi;
pub mod protocol;
pub mod shared_memory;
pub mod telemetry;
pub mod worker;

pub use bridge::{Bridge, BridgeStatus};
pub use error::{BridgeError, BridgeResult};
pub use protocol::{WorkerOperation, WorkerProtocol};
pub use shared_memory::{SharedMemoryHandle, SharedMemoryPool};
pub use telemetry::{MetricsSnapshot, Summary, TaskEvent, TelemetryStore};
pub use worker::WorkerPool;
