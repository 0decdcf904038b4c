//! Per-coroutine sandbox accounting (§4.7). A `SandboxConfig` bounds how
//! much a coroutine may do before the evaluator raises
//! `Fault::SandboxExceeded`; a `SandboxMeter` is the live counter state the
//! evaluator checks on every message dispatch.

use std::time::{Duration, Instant};

use crate::SandboxReason;

#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxConfig {
    pub message_count_limit: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl SandboxConfig {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_message_count_limit(mut self, limit: u64) -> Self {
        self.message_count_limit = Some(limit);
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }
}

/// Live counters for one coroutine's sandbox. `started_at` is lazily set on
/// the first dispatch so a coroutine that never runs never starts its clock.
pub struct SandboxMeter {
    config: SandboxConfig,
    messages_dispatched: u64,
    started_at: Option<Instant>,
}

impl SandboxMeter {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config, messages_dispatched: 0, started_at: None }
    }

    /// Called once per message dispatch, before the message is evaluated.
    /// Returns `Some(reason)` the instant a limit is crossed so the
    /// evaluator can raise `Fault::SandboxExceeded` instead of proceeding.
    pub fn tick(&mut self) -> Option<SandboxReason> {
        if self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        self.messages_dispatched += 1;
        if let Some(limit) = self.config.message_count_limit {
            if self.messages_dispatched > limit {
                return Some(SandboxReason::MessageCountLimit);
            }
        }
        if let Some(limit) = self.config.time_limit {
            if let Some(start) = self.started_at {
                if start.elapsed() >= limit {
                    return Some(SandboxReason::TimeLimit);
                }
            }
        }
        None
    }

    pub fn messages_dispatched(&self) -> u64 {
        self.messages_dispatched
    }

    pub fn reset(&mut self) {
        self.messages_dispatched = 0;
        self.started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_count_limit_trips_exactly_once_over() {
        let mut meter = SandboxMeter::new(SandboxConfig::unbounded().with_message_count_limit(3));
        assert!(meter.tick().is_none());
        assert!(meter.tick().is_none());
        assert!(meter.tick().is_none());
        assert_eq!(meter.tick(), Some(SandboxReason::MessageCountLimit));
    }

    #[test]
    fn unbounded_config_never_trips() {
        let mut meter = SandboxMeter::new(SandboxConfig::unbounded());
        for _ in 0..10_000 {
            assert!(meter.tick().is_none());
        }
    }
}
