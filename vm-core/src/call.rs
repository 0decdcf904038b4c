//! Per-activation `Call` records (§3), chained into the current
//! coroutine's call stack so an uncaught exception can print a backtrace.

use std::rc::Rc;

use crate::coroutine::{CoroutineId, StopStatus};
use crate::heap::ObjectId;
use crate::message::Message;

#[derive(Clone)]
pub struct Call {
    pub sender: ObjectId,
    pub target: ObjectId,
    /// The slot value that was found and activated.
    pub activated: ObjectId,
    pub message: Rc<Message>,
    /// The object on whose slots the message was actually found — may
    /// differ from `target` when lookup walked the prototype chain.
    /// `resend` uses this to continue the walk one level up.
    pub slot_context: ObjectId,
    pub coroutine: CoroutineId,
    pub stop_status: StopStatus,
}

impl Call {
    pub fn new(
        sender: ObjectId,
        target: ObjectId,
        activated: ObjectId,
        message: Rc<Message>,
        slot_context: ObjectId,
        coroutine: CoroutineId,
    ) -> Self {
        Self {
            sender,
            target,
            activated,
            message,
            slot_context,
            coroutine,
            stop_status: StopStatus::Normal,
        }
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("line", &self.message.line)
            .field("stop_status", &self.stop_status)
            .finish()
    }
}
