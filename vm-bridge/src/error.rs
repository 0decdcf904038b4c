//! The Bridge's own narrow error enum (§7), widened into `vm_shared::Fault`
//! at the boundary that reports back to the VM — the same layering the
//! teacher uses for `SyscallError` → `ActorError`.

use thiserror::Error;
use vm_shared::Fault;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("bridge not initialized")]
    NotInitialized,

    #[error("bridge already initialized")]
    AlreadyInitialized,

    #[error("worker count must be positive")]
    InvalidWorkerCount,

    #[error("payload of {size} bytes exceeds the transport limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("worker returned a malformed response: {0}")]
    MalformedResponse(String),

    #[error("worker transport failure: {0}")]
    TransportFailure(String),

    #[error("reply exceeded its {capacity}-byte capacity")]
    ReplyTooLarge { capacity: usize },

    #[error("shared memory handle {0} not found")]
    UnknownHandle(u32),

    #[error("shared memory handle {0} already destroyed")]
    AlreadyDestroyed(u32),

    #[error("shared memory name '{0}' already in use")]
    DuplicateName(String),

    #[error("shared memory handle pool exhausted")]
    PoolExhausted,

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(String),
}

impl From<BridgeError> for Fault {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::NotInitialized => Fault::BridgeNotInitialized,
            BridgeError::MalformedResponse(m) => Fault::BridgeBadPayload(m),
            BridgeError::ReplyTooLarge { capacity } => Fault::BridgeReplyTooLarge { capacity },
            other => Fault::BridgeTransportError(other.to_string()),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;
