//! W3C-traceparent-formatted trace context, injected into every task the
//! Bridge dispatches and echoed back in the response.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// `00-<32 hex trace-id>-<16 hex parent-id>-<2 hex flags>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub traceparent: String,
}

impl TraceContext {
    /// Generates a fresh, randomized trace context for one dispatched task.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let mut trace_id = [0u8; 16];
        let mut parent_id = [0u8; 8];
        rng.fill_bytes(&mut trace_id);
        rng.fill_bytes(&mut parent_id);
        Self {
            traceparent: format!(
                "00-{}-{}-01",
                hex_encode(&trace_id),
                hex_encode(&parent_id)
            ),
        }
    }

    /// Validates the `00-[0-9a-f]{32}-[0-9a-f]{16}-[0-9a-f]{2}` pattern from
    /// the testable properties section.
    pub fn is_well_formed(traceparent: &str) -> bool {
        let parts: Vec<&str> = traceparent.split('-').collect();
        if parts.len() != 4 {
            return false;
        }
        parts[0] == "00"
            && parts[1].len() == 32
            && is_hex(parts[1])
            && parts[2].len() == 16
            && is_hex(parts[2])
            && parts[3].len() == 2
            && is_hex(parts[3])
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new()
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_traceparent_is_well_formed() {
        let tc = TraceContext::new();
        assert!(TraceContext::is_well_formed(&tc.traceparent), "{}", tc.traceparent);
    }

    #[test]
    fn rejects_malformed_traceparents() {
        assert!(!TraceContext::is_well_formed("not-a-traceparent"));
        assert!(!TraceContext::is_well_formed("01-abcd-abcd-01"));
        assert!(!TraceContext::is_well_formed(
            "00-ABCDEF00000000000000000000000000-0000000000000000-01"
        ));
    }
}
