//! The error taxonomy shared between the VM core and the Synaptic Bridge.
//!
//! Individual subsystems raise narrower errors close to the fault (see
//! `vm_core::VmError`, `vm_bridge::BridgeError`); this enum is the thing an
//! embedder ultimately observes, the way `ActorError` widens `SyscallError`
//! at the boundary that talks to the outside world.

use thiserror::Error;

/// The complete fault taxonomy from the error handling design.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("'{message}' does not understand '{selector}'")]
    DoesNotUnderstand { message: String, selector: String },

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("argument count mismatch: expected {expected}, got {got}")]
    ArgumentCount { expected: String, got: usize },

    #[error("sandbox exceeded: {reason}")]
    SandboxExceeded { reason: SandboxReason },

    #[error("division by zero")]
    DivisionByZero,

    #[error("numeric overflow")]
    NumericOverflow,

    #[error("io error: {0}")]
    IoError(String),

    #[error("bridge not initialized")]
    BridgeNotInitialized,

    #[error("bridge transport error: {0}")]
    BridgeTransportError(String),

    #[error("bridge worker error: {0}")]
    BridgeWorkerError(String),

    #[error("bridge received a malformed payload: {0}")]
    BridgeBadPayload(String),

    #[error("bridge reply exceeded its capacity ({capacity} bytes)")]
    BridgeReplyTooLarge { capacity: usize },

    #[error("fatal allocation failure")]
    FatalAllocation,
}

/// Why the sandbox tripped. Kept separate from `Fault` so callers that only
/// care about sandbox accounting don't have to match the whole taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxReason {
    MessageCountLimit,
    TimeLimit,
}

impl std::fmt::Display for SandboxReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SandboxReason::MessageCountLimit => write!(f, "message count limit reached"),
            SandboxReason::TimeLimit => write!(f, "wall-clock time limit reached"),
        }
    }
}

impl Fault {
    /// True for the handful of faults that can never be meaningfully
    /// recovered from inside the VM (mirrors `ExitCode::is_system_error`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::FatalAllocation)
    }
}
