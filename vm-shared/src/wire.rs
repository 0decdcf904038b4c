//! The self-describing wire format used for `TaskDescriptor`/`ResponseMap`
//! payloads that cross the Synaptic Bridge. Exactly representable by
//! string-keyed heterogeneous maps, lists, numbers, booleans, and strings —
//! deliberately no richer than that, so the same shape can be produced by a
//! foreign worker written in any language.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::trace::TraceContext;

/// A self-describing value: map, list, number, bool, string, or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
}

impl WireValue {
    pub fn as_map(&self) -> Option<&BTreeMap<String, WireValue>> {
        match self {
            WireValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            WireValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            WireValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            WireValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn map() -> BTreeMap<String, WireValue> {
        BTreeMap::new()
    }
}

/// A task submitted to the bridge: `operation`/`action` select the worker
/// behavior, `config` carries operation-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub operation: String,
    pub action: String,
    pub config: WireValue,
}

impl TaskDescriptor {
    pub fn new(operation: impl Into<String>, action: impl Into<String>, config: WireValue) -> Self {
        Self {
            operation: operation.into(),
            action: action.into(),
            config,
        }
    }

    /// Serializes this descriptor, with its trace context, to the
    /// self-describing textual payload used for transport.
    pub fn to_payload(&self, trace: &TraceContext) -> serde_json::Result<String> {
        let mut envelope = serde_json::to_value(self)?;
        if let serde_json::Value::Object(ref mut map) = envelope {
            map.insert(
                "trace_context".to_string(),
                serde_json::json!({ "traceparent": trace.traceparent }),
            );
        }
        serde_json::to_string(&envelope)
    }
}

/// The response to a completed task: `success`, the echoed trace context,
/// and operation-specific fields flattened into the same JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMap {
    pub success: bool,
    pub trace_context: TraceContext,
    #[serde(flatten, default)]
    pub fields: BTreeMap<String, WireValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_round_trips_through_json() {
        let mut cfg = WireValue::map();
        cfg.insert("n".to_string(), WireValue::Number(3.0));
        let td = TaskDescriptor::new("ping", "echo", WireValue::Map(cfg));
        let trace = TraceContext::new();
        let payload = td.to_payload(&trace).unwrap();
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["operation"], "ping");
        assert_eq!(value["trace_context"]["traceparent"], trace.traceparent);
    }

    #[test]
    fn response_map_serializes_success_and_trace() {
        let mut fields = BTreeMap::new();
        fields.insert("echoed".to_string(), WireValue::Number(3.0));
        let resp = ResponseMap {
            success: true,
            trace_context: TraceContext::new(),
            fields,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back["success"], true);
    }
}
