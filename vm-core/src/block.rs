//! Activatable payloads (§3): blocks (closures) and C-functions
//! (primitives). "Activation" is defined in `evaluator.rs`; this module
//! only carries the data each kind needs to be activated.

use std::cell::Cell;
use std::rc::Rc;

use crate::heap::ObjectId;
use crate::message::Message;
use crate::symbol::Symbol;
use crate::{Evaluator, VmResult};

/// A closure: a message tree root plus the argument names it binds and the
/// lexical scope it captured at definition time.
#[derive(Clone)]
pub struct Block {
    pub body: Rc<Message>,
    pub arg_names: Vec<Symbol>,
    /// `None` means "use the caller's locals as parent" (§3).
    pub captured_scope: Option<ObjectId>,
    /// Whether a nonlocal return/break/continue propagates through this
    /// block to its enclosing method, or stops here.
    pub pass_stops: bool,
    pub profiler: Rc<Cell<u64>>,
}

impl Block {
    pub fn new(body: Rc<Message>, arg_names: Vec<Symbol>, captured_scope: Option<ObjectId>) -> Self {
        Self {
            body,
            arg_names,
            captured_scope,
            pass_stops: false,
            profiler: Rc::new(Cell::new(0)),
        }
    }

    pub fn record_activation(&self) {
        self.profiler.set(self.profiler.get() + 1);
    }

    pub fn activation_count(&self) -> u64 {
        self.profiler.get()
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("arg_names", &self.arg_names.len())
            .field("pass_stops", &self.pass_stops)
            .finish()
    }
}

/// The native entry point a `CFunction` invokes: `(target, locals, message)`
/// with the evaluator passed in so the primitive can recurse into message
/// evaluation, allocate objects, or raise a `Fault`.
pub type NativeFn = fn(&mut Evaluator, ObjectId, ObjectId, &Rc<Message>) -> VmResult<ObjectId>;

/// A primitive implemented in native code. `expected_self_tag`, when set,
/// is checked by the evaluator before invocation and surfaced as
/// `Fault::TypeMismatch` on mismatch.
#[derive(Clone, Copy)]
pub struct CFunction {
    pub name: Symbol,
    pub expected_self_tag: Option<&'static str>,
    pub func: NativeFn,
}

impl std::fmt::Debug for CFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CFunction")
            .field("expected_self_tag", &self.expected_self_tag)
            .finish()
    }
}

/// Implemented by whatever `ObjectKind` variant is being activated; lets
/// the evaluator's activation step stay uniform across primitives, blocks,
/// and plain (self-returning) objects.
pub trait Activatable {
    fn describe(&self) -> &'static str;
}

impl Activatable for Block {
    fn describe(&self) -> &'static str {
        "Block"
    }
}

impl Activatable for CFunction {
    fn describe(&self) -> &'static str {
        "CFunction"
    }
}
