//! The worker pool (§4.8 AMBIENT): `std::thread` workers pulled from a
//! shared FIFO queue, the way the teacher's `EnginePool` guards a bounded
//! resource with `Mutex`+`Condvar` — here the bounded resource is "workers
//! available to claim the next task" rather than "engines available to
//! instantiate a module".
//!
//! Workers are *simulated foreign code*: the real external worker binary is
//! an external collaborator (§4.8), so each worker thread executes a small
//! built-in operation table keyed by `operation`/`action`. This keeps
//! `submitTask` genuinely concurrent and testable without a real subprocess.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use vm_shared::{ResponseMap, TaskDescriptor, TraceContext, WireValue};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::WorkerOperation;
use crate::telemetry::{TaskEvent, TelemetryStore};

struct QueuedTask {
    descriptor: TaskDescriptor,
    trace: TraceContext,
    reply_capacity: usize,
    submitted_at: Instant,
    respond_to: mpsc::Sender<BridgeResult<ResponseMap>>,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedTask>>,
    condvar: Condvar,
    shutdown: AtomicBool,
    telemetry: Arc<Mutex<TelemetryStore>>,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    proxy_ids: Vec<String>,
}

impl WorkerPool {
    pub fn start(workers: u32, telemetry: Arc<Mutex<TelemetryStore>>) -> BridgeResult<Self> {
        if workers == 0 {
            return Err(BridgeError::InvalidWorkerCount);
        }
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            shutdown: AtomicBool::new(false),
            telemetry,
        });

        let mut handles = Vec::with_capacity(workers as usize);
        let mut proxy_ids = Vec::with_capacity(workers as usize);
        for i in 0..workers {
            let proxy_id = format!("proxy-{i}");
            proxy_ids.push(proxy_id.clone());
            let shared = shared.clone();
            handles.push(std::thread::spawn(move || worker_loop(proxy_id, shared)));
        }

        Ok(Self { shared, handles, proxy_ids })
    }

    pub fn proxy_ids(&self) -> &[String] {
        &self.proxy_ids
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Enqueues a task and blocks the calling thread until a worker
    /// completes it (§4.8: "blocks the calling coroutine's native thread
    /// until the worker signals completion").
    pub fn submit(&self, descriptor: TaskDescriptor, trace: TraceContext, reply_capacity: usize) -> BridgeResult<ResponseMap> {
        let (tx, rx) = mpsc::channel();
        {
            let mut queue = self.shared.queue.lock().map_err(|_| BridgeError::LockPoisoned("worker queue".into()))?;
            queue.push_back(QueuedTask { descriptor, trace, reply_capacity, submitted_at: Instant::now(), respond_to: tx });
        }
        self.shared.condvar.notify_one();
        rx.recv().map_err(|_| BridgeError::TransportFailure("worker dropped without responding".into()))?
    }

    pub fn stop(self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.condvar.notify_all();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(proxy_id: String, shared: Arc<Shared>) {
    log::debug!("{proxy_id} started");
    loop {
        let task = {
            let guard = shared.queue.lock().expect("worker queue poisoned");
            let mut guard = shared
                .condvar
                .wait_while(guard, |q| q.is_empty() && !shared.shutdown.load(Ordering::SeqCst))
                .expect("worker queue poisoned");
            match guard.pop_front() {
                Some(task) => task,
                None => {
                    if shared.shutdown.load(Ordering::SeqCst) {
                        log::debug!("{proxy_id} shutting down");
                        return;
                    }
                    continue;
                }
            }
        };

        let start = Instant::now();
        let (success, fields, error_class) = execute(&task.descriptor);
        let duration = start.elapsed();

        let response = ResponseMap { success, trace_context: task.trace.clone(), fields };
        let encoded_len = crate::protocol::WorkerProtocol::encode_response(&response).map(|b| b.len()).unwrap_or(0);
        let result = if encoded_len > task.reply_capacity {
            Err(BridgeError::ReplyTooLarge { capacity: task.reply_capacity })
        } else {
            Ok(response)
        };

        let mut telemetry = shared.telemetry.lock().expect("telemetry lock poisoned");
        telemetry.record(TaskEvent {
            proxy_id: proxy_id.clone(),
            message_name: task.descriptor.operation.clone(),
            duration,
            success: result.is_ok() && success,
            error_class: if success { None } else { error_class },
            trace_context: task.trace.clone(),
            queued_for: start.duration_since(task.submitted_at),
        });
        drop(telemetry);

        let _ = task.respond_to.send(result);
    }
}

/// The simulated operation table. Real foreign-worker behavior (vector
/// index lookup, durable persistence, telemetry aggregation) is an external
/// collaborator; these stand in just well enough to make dispatch,
/// timing, and error-path telemetry observable end to end.
fn execute(descriptor: &TaskDescriptor) -> (bool, BTreeMap<String, WireValue>, Option<String>) {
    let mut fields = BTreeMap::new();
    match WorkerOperation::from_str(&descriptor.operation) {
        WorkerOperation::Ping => {
            fields.insert("action".to_string(), WireValue::String(descriptor.action.clone()));
            if let Some(map) = descriptor.config.as_map() {
                for (k, v) in map {
                    fields.insert(format!("echoed_{k}"), v.clone());
                }
            }
            (true, fields, None)
        }
        WorkerOperation::VectorSearch => {
            fields.insert("matches".to_string(), WireValue::List(vec![WireValue::Number(0.91), WireValue::Number(0.77)]));
            (true, fields, None)
        }
        WorkerOperation::Persistence => {
            fields.insert("stored".to_string(), WireValue::Bool(true));
            (true, fields, None)
        }
        WorkerOperation::Telemetry => {
            fields.insert("acknowledged".to_string(), WireValue::Bool(true));
            (true, fields, None)
        }
        WorkerOperation::Unknown => {
            log::warn!("rejecting unsupported operation '{}'", descriptor.operation);
            fields.insert("error".to_string(), WireValue::String(format!("unsupported operation '{}'", descriptor.operation)));
            (false, fields, Some("unsupported_operation".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_shared::WireValue as WV;

    fn telemetry() -> Arc<Mutex<TelemetryStore>> {
        Arc::new(Mutex::new(TelemetryStore::new(256, 32)))
    }

    #[test]
    fn ping_echo_round_trip_succeeds() {
        let pool = WorkerPool::start(2, telemetry()).unwrap();
        let mut cfg = WireValue::map();
        cfg.insert("n".to_string(), WV::Number(3.0));
        let task = TaskDescriptor::new("ping", "echo", WireValue::Map(cfg));
        let response = pool.submit(task, TraceContext::new(), 4096).unwrap();
        assert!(response.success);
        pool.stop();
    }

    #[test]
    fn unknown_operation_responds_with_failure_not_an_error() {
        let pool = WorkerPool::start(1, telemetry()).unwrap();
        let task = TaskDescriptor::new("levitate", "now", WireValue::Map(WireValue::map()));
        let response = pool.submit(task, TraceContext::new(), 4096).unwrap();
        assert!(!response.success);
        pool.stop();
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(WorkerPool::start(0, telemetry()), Err(BridgeError::InvalidWorkerCount)));
    }
}
