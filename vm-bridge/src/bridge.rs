//! `Bridge` (§4.8): the public surface a VM builtin or a host embedder
//! drives. Owns the worker pool, the shared-memory handle pool, and the
//! telemetry ring, and serializes access to each the way §5's "shared
//! resources need mutual exclusion, the VM thread itself doesn't" calls
//! for. The per-thread last-error buffer follows the same "thread-local,
//! not shared" rule §5 gives the VM side.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use vm_shared::{ResponseMap, TaskDescriptor, TraceContext};

use crate::error::{BridgeError, BridgeResult};
use crate::shared_memory::{SharedMemoryHandle, SharedMemoryPool};
use crate::telemetry::{MetricsSnapshot, Summary, TelemetryStore};
use crate::worker::WorkerPool;

/// Requests larger than this are rejected before they ever reach a worker
/// (§4.8: transport has a payload ceiling independent of `replyCapacity`).
const MAX_PAYLOAD_BYTES: usize = 1 << 20;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

#[derive(Debug, Clone)]
pub struct BridgeStatus {
    pub initialized: bool,
    pub worker_count: u32,
    pub proxy_ids: Vec<String>,
}

pub struct Bridge {
    workers: Option<WorkerPool>,
    shared_memory: Mutex<SharedMemoryPool>,
    telemetry: Arc<Mutex<TelemetryStore>>,
}

impl Bridge {
    pub fn new() -> Self {
        Self {
            workers: None,
            shared_memory: Mutex::new(SharedMemoryPool::new()),
            telemetry: Arc::new(Mutex::new(TelemetryStore::new(512, 32))),
        }
    }

    pub fn start(&mut self, workers: u32) -> BridgeResult<()> {
        if self.workers.is_some() {
            return self.record(Err(BridgeError::AlreadyInitialized));
        }
        let pool = self.record(WorkerPool::start(workers, self.telemetry.clone()))?;
        log::info!("bridge started with {workers} worker(s)");
        self.workers = Some(pool);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(pool) = self.workers.take() {
            log::info!("bridge shutting down, {} worker(s)", pool.worker_count());
            pool.stop();
        }
    }

    pub fn status(&self) -> BridgeStatus {
        match &self.workers {
            Some(pool) => BridgeStatus {
                initialized: true,
                worker_count: pool.worker_count() as u32,
                proxy_ids: pool.proxy_ids().to_vec(),
            },
            None => BridgeStatus { initialized: false, worker_count: 0, proxy_ids: Vec::new() },
        }
    }

    /// Dispatches one task and blocks until the worker responds (§4.8).
    /// Worker-level failure surfaces as `ResponseMap { success: false }`,
    /// never as an `Err` here; an `Err` means the transport itself failed.
    pub fn submit_task(&self, descriptor: TaskDescriptor, reply_capacity: usize) -> BridgeResult<ResponseMap> {
        let workers = match &self.workers {
            Some(pool) => pool,
            None => return self.record(Err(BridgeError::NotInitialized)),
        };
        let trace = TraceContext::new();
        let payload = self.record(
            descriptor
                .to_payload(&trace)
                .map_err(|e| BridgeError::MalformedResponse(e.to_string())),
        )?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return self.record(Err(BridgeError::PayloadTooLarge { size: payload.len(), limit: MAX_PAYLOAD_BYTES }));
        }
        self.record(workers.submit(descriptor, trace, reply_capacity))
    }

    pub fn create_shared_memory(&self, size: usize) -> BridgeResult<SharedMemoryHandle> {
        self.record(self.lock_shared_memory()?.create(size))
    }

    pub fn map_shared_memory(&self, id: u32) -> BridgeResult<Vec<u8>> {
        self.record(self.lock_shared_memory()?.map(id).map(|slice| slice.to_vec()))
    }

    pub fn unmap_shared_memory(&self, id: u32) -> BridgeResult<()> {
        self.record(self.lock_shared_memory()?.unmap(id))
    }

    pub fn destroy_shared_memory(&self, id: u32) -> BridgeResult<()> {
        self.record(self.lock_shared_memory()?.destroy(id))
    }

    /// Per-proxy dispatch counters (§4.8); an empty `proxies` slice reports
    /// every proxy the store has ever recorded an event for.
    pub fn metrics_snapshot(&self, proxies: &[String]) -> BridgeResult<BTreeMap<String, MetricsSnapshot>> {
        Ok(self.lock_telemetry()?.snapshot(proxies))
    }

    pub fn metrics_reset(&self, proxies: &[String]) -> BridgeResult<()> {
        self.lock_telemetry()?.reset(proxies);
        Ok(())
    }

    pub fn metrics_snapshot_and_reset(&self, proxy: &str) -> BridgeResult<MetricsSnapshot> {
        Ok(self.lock_telemetry()?.snapshot_and_reset(proxy))
    }

    /// Aggregates across the given proxies (empty means every proxy).
    pub fn metrics_summary(&self, proxies: &[String]) -> BridgeResult<Summary> {
        Ok(self.lock_telemetry()?.summary(proxies))
    }

    pub fn metrics_summary_history(&self) -> BridgeResult<Vec<Summary>> {
        Ok(self.lock_telemetry()?.summary_history())
    }

    pub fn configure_summary_history(&self, capacity: usize) -> BridgeResult<()> {
        self.lock_telemetry()?.configure_summary_history(capacity);
        Ok(())
    }

    pub fn clear_summary_history(&self) -> BridgeResult<()> {
        self.lock_telemetry()?.clear_summary_history();
        Ok(())
    }

    pub fn get_last_error(&self) -> Option<String> {
        LAST_ERROR.with(|slot| slot.borrow().clone())
    }

    pub fn clear_error(&self) {
        LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
    }

    fn lock_shared_memory(&self) -> BridgeResult<std::sync::MutexGuard<'_, SharedMemoryPool>> {
        self.shared_memory.lock().map_err(|_| BridgeError::LockPoisoned("shared memory pool".into()))
    }

    fn lock_telemetry(&self) -> BridgeResult<std::sync::MutexGuard<'_, TelemetryStore>> {
        self.telemetry.lock().map_err(|_| BridgeError::LockPoisoned("telemetry store".into()))
    }

    fn record<T>(&self, result: BridgeResult<T>) -> BridgeResult<T> {
        if let Err(ref e) = result {
            log::warn!("bridge operation failed: {e}");
            LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(e.to_string()));
        }
        result
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_shared::WireValue;

    fn ping_task() -> TaskDescriptor {
        TaskDescriptor::new("ping", "echo", WireValue::Map(WireValue::map()))
    }

    #[test]
    fn submit_before_start_fails_with_not_initialized() {
        let bridge = Bridge::new();
        let err = bridge.submit_task(ping_task(), 4096).unwrap_err();
        assert_eq!(err, BridgeError::NotInitialized);
        assert!(bridge.get_last_error().is_some());
    }

    #[test]
    fn starting_twice_fails_with_already_initialized() {
        let mut bridge = Bridge::new();
        bridge.start(2).unwrap();
        assert_eq!(bridge.start(1).unwrap_err(), BridgeError::AlreadyInitialized);
    }

    #[test]
    fn three_pings_all_succeed_and_metrics_accumulate() {
        let mut bridge = Bridge::new();
        bridge.start(2).unwrap();
        for _ in 0..3 {
            let response = bridge.submit_task(ping_task(), 4096).unwrap();
            assert!(response.success);
        }
        let snapshot = bridge.metrics_snapshot(&[]).unwrap();
        let total_invocations: u64 = snapshot.values().map(|s| s.invocations).sum();
        let total_failures: u64 = snapshot.values().map(|s| s.failures).sum();
        assert_eq!(total_invocations, 3);
        assert_eq!(total_failures, 0);
    }

    #[test]
    fn metrics_reset_zeroes_the_snapshot() {
        let mut bridge = Bridge::new();
        bridge.start(1).unwrap();
        bridge.submit_task(ping_task(), 4096).unwrap();
        bridge.metrics_reset(&[]).unwrap();
        let snapshot = bridge.metrics_snapshot(&["proxy-0".to_string()]).unwrap();
        assert_eq!(snapshot["proxy-0"].invocations, 0);
        assert_eq!(snapshot["proxy-0"].success_rate, 1.0);
    }

    #[test]
    fn clear_error_empties_the_last_error_buffer() {
        let bridge = Bridge::new();
        let _ = bridge.submit_task(ping_task(), 4096);
        assert!(bridge.get_last_error().is_some());
        bridge.clear_error();
        assert!(bridge.get_last_error().is_none());
    }

    #[test]
    fn shared_memory_round_trip_through_the_bridge() {
        let bridge = Bridge::new();
        let handle = bridge.create_shared_memory(32).unwrap();
        bridge.map_shared_memory(handle.id).unwrap();
        bridge.unmap_shared_memory(handle.id).unwrap();
        bridge.destroy_shared_memory(handle.id).unwrap();
        assert!(matches!(bridge.destroy_shared_memory(handle.id), Err(BridgeError::AlreadyDestroyed(_))));
    }
}
