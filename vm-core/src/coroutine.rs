//! Cooperative coroutines (§4.6). Per the design notes' neutral mapping
//! ("a single OS thread driving a state machine over message trees"), a
//! coroutine here is not a real fiber: it is a resumable cursor over the
//! sibling chain of its run-message's top-level statements. `yield` pauses
//! at the current statement boundary and is resumed from exactly there.
//! Yielding from inside a nested block unwinds via `StopStatus::Yield`
//! exactly like `return`/`break`/`continue` already unwind the Rust call
//! stack (§4.5 step 4) — the resume point that gets captured is always the
//! run-message's enclosing top-level statement. This is a deliberate
//! simplification recorded in DESIGN.md: it is sufficient for the
//! `1 yield; 2 yield; 3` style of scenario 2, and for the `try` coroutine
//! spawn, without requiring a fiber/stack-switch dependency the teacher
//! crate does not carry.

use std::rc::Rc;

use crate::heap::ObjectId;
use crate::message::Message;
use crate::sandbox::{SandboxConfig, SandboxMeter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoroutineId(pub(crate) u32);

impl CoroutineId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// Per-activation control-flow signal, checked by the evaluator after every
/// activation (§4.5 step 4). `Yield` is this crate's addition to the base
/// return/break/continue/exception set, needed to implement §4.6's
/// `resume`/`yield` pair without a CPS-transformed evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    Normal,
    Return(ObjectId),
    Break,
    Continue,
    Exception(ObjectId),
    Yield(ObjectId),
    SandboxExceeded(crate::SandboxReason),
}

impl StopStatus {
    pub fn is_normal(&self) -> bool {
        matches!(self, StopStatus::Normal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroState {
    Inert,
    Running,
    Parked,
    Terminated,
}

/// One coroutine's resumable state. Owned by `State`'s coroutine table.
pub struct Coroutine {
    pub id: CoroutineId,
    /// Every coroutine but main has a non-null parent (§3 invariant).
    pub parent: Option<CoroutineId>,
    pub state: CoroState,
    pub run_target: ObjectId,
    pub run_locals: ObjectId,
    /// Where to resume: `None` once inert-and-never-started is no longer
    /// the case and the chain is exhausted.
    pub cursor: Option<Rc<Message>>,
    pub result: Option<ObjectId>,
    pub exception: Option<ObjectId>,
    pub debugging: bool,
    /// Generational root set: values retained in the topmost pool survive
    /// intervening collections. Pushed on entry to a protection scope,
    /// popped on exit.
    pub retain_pool: Vec<Vec<ObjectId>>,
    pub sandbox: SandboxMeter,
}

impl Coroutine {
    pub fn new(
        id: CoroutineId,
        parent: Option<CoroutineId>,
        run_target: ObjectId,
        run_locals: ObjectId,
        body: Rc<Message>,
        sandbox: SandboxConfig,
    ) -> Self {
        Self {
            id,
            parent,
            state: CoroState::Inert,
            run_target,
            run_locals,
            cursor: Some(body),
            result: None,
            exception: None,
            debugging: false,
            retain_pool: vec![Vec::new()],
            sandbox: SandboxMeter::new(sandbox),
        }
    }

    pub fn push_retain_scope(&mut self) {
        self.retain_pool.push(Vec::new());
    }

    pub fn pop_retain_scope(&mut self) {
        if self.retain_pool.len() > 1 {
            self.retain_pool.pop();
        }
    }

    pub fn retain(&mut self, id: ObjectId) {
        if let Some(top) = self.retain_pool.last_mut() {
            top.push(id);
        }
    }

    /// All currently retained ids, across every pool frame — used by the
    /// collector as an additional root source per coroutine.
    pub fn retained_ids(&self) -> Vec<ObjectId> {
        self.retain_pool.iter().flatten().copied().collect()
    }

    /// Cancellation (§4.6): the next message activation on this coroutine
    /// unwinds via an exception.
    pub fn cancel(&mut self, exception: ObjectId) {
        self.exception = Some(exception);
    }

    pub fn is_terminated(&self) -> bool {
        self.state == CoroState::Terminated
    }
}
