//! WorkerProtocol (§4.8): serializes a `TaskDescriptor` with an injected
//! trace context into the wire payload a worker consumes, and parses its
//! reply back into a `ResponseMap`. Kept as a single module with an
//! exhaustive operation/action enum so the worker side (`worker.rs`) and
//! the VM side stay in lock-step, per the design notes.

use vm_shared::{ResponseMap, TaskDescriptor, TraceContext};

use crate::error::{BridgeError, BridgeResult};

/// The operations the simulated worker table understands (§4.8 AMBIENT).
/// An unrecognized `operation` is not a protocol error — it is dispatched
/// as `WorkerOperation::Unknown` and answered with `success=false`, the way
/// a real foreign worker would reject a request it doesn't implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOperation {
    Ping,
    VectorSearch,
    Persistence,
    Telemetry,
    Unknown,
}

impl WorkerOperation {
    pub fn from_str(s: &str) -> Self {
        match s {
            "ping" => Self::Ping,
            "vector_search" => Self::VectorSearch,
            "persistence" => Self::Persistence,
            "telemetry" => Self::Telemetry,
            _ => Self::Unknown,
        }
    }
}

pub struct WorkerProtocol;

impl WorkerProtocol {
    /// Serializes a task with a fresh trace context, returning the wire
    /// payload and the context so the caller can correlate telemetry.
    pub fn encode(task: &TaskDescriptor) -> BridgeResult<(String, TraceContext)> {
        let trace = TraceContext::new();
        let payload = task.to_payload(&trace).map_err(|e| BridgeError::MalformedResponse(e.to_string()))?;
        Ok((payload, trace))
    }

    /// Parses a completed worker's raw reply, enforcing `replyCapacity`.
    pub fn decode(raw: &[u8], reply_capacity: usize) -> BridgeResult<ResponseMap> {
        if raw.len() > reply_capacity {
            return Err(BridgeError::ReplyTooLarge { capacity: reply_capacity });
        }
        serde_json::from_slice(raw).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
    }

    pub fn encode_response(response: &ResponseMap) -> BridgeResult<Vec<u8>> {
        serde_json::to_vec(response).map_err(|e| BridgeError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_shared::WireValue;

    #[test]
    fn encode_then_decode_round_trips_success_field() {
        let response = ResponseMap { success: true, trace_context: TraceContext::new(), fields: Default::default() };
        let bytes = WorkerProtocol::encode_response(&response).unwrap();
        let decoded = WorkerProtocol::decode(&bytes, bytes.len()).unwrap();
        assert!(decoded.success);
    }

    #[test]
    fn oversized_reply_is_rejected() {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("echo".to_string(), WireValue::String("x".repeat(200)));
        let response = ResponseMap { success: true, trace_context: TraceContext::new(), fields };
        let bytes = WorkerProtocol::encode_response(&response).unwrap();
        assert!(matches!(WorkerProtocol::decode(&bytes, 8), Err(BridgeError::ReplyTooLarge { capacity: 8 })));
    }

    #[test]
    fn unknown_operation_string_maps_to_unknown_variant() {
        assert_eq!(WorkerOperation::from_str("teleport"), WorkerOperation::Unknown);
        assert_eq!(WorkerOperation::from_str("ping"), WorkerOperation::Ping);
    }
}
