//! Safe embedding surface (§6). `extern "C"` plumbing lives in `ffi.rs`;
//! this module is ordinary Rust, the layer an in-process Rust host talks to
//! directly and the layer the FFI shim wraps for everyone else.

use std::rc::Rc;

use crate::coroutine::CoroutineId;
use crate::evaluator::Evaluator;
use crate::heap::ObjectId;
use crate::message::Message;
use crate::operators::{preprocess, OperatorTable};
use crate::sandbox::SandboxConfig;
use crate::state::State;
use crate::{Fault, VmResult};

/// Host-supplied hooks invoked during evaluation: diagnostic output,
/// uncaught-exception reporting, and a requested-exit signal. All optional;
/// an embedder that registers none of them gets silent defaults.
#[derive(Default)]
pub struct EmbedCallbacks {
    print: Option<Box<dyn FnMut(&str)>>,
    report_exception: Option<Box<dyn FnMut(&Fault)>>,
    exit: Option<Box<dyn FnMut(i32)>>,
    /// Fired each time `resume` switches `current_coroutine` (§6's
    /// `active_coro` hook) — lets an embedder track which coroutine is live,
    /// e.g. for a debugger.
    active_coro: Option<Box<dyn FnMut(u32)>>,
    /// Fired once, right after the built-in Lobby surface is installed, so
    /// a host can layer its own bindings on top before any user code runs.
    bindings_init: Option<Box<dyn FnMut()>>,
}

impl EmbedCallbacks {
    pub fn print(&mut self, text: &str) {
        match &mut self.print {
            Some(f) => f(text),
            None => println!("{text}"),
        }
    }

    pub fn report_exception(&mut self, fault: &Fault) {
        match &mut self.report_exception {
            Some(f) => f(fault),
            None => eprintln!("unhandled fault: {fault}"),
        }
    }

    pub fn exit(&mut self, code: i32) {
        if let Some(f) = &mut self.exit {
            f(code);
        }
    }

    pub fn active_coro(&mut self, coro_index: u32) {
        if let Some(f) = &mut self.active_coro {
            f(coro_index);
        }
    }

    pub fn bindings_init(&mut self) {
        if let Some(f) = &mut self.bindings_init {
            f();
        }
    }
}

/// One running VM. Owns the `State` and the operator table used to
/// preprocess every message tree handed to it before first evaluation.
pub struct Embedding {
    pub state: State,
    operators: OperatorTable,
}

impl Embedding {
    pub fn new(sandbox: SandboxConfig) -> Self {
        let mut state = State::new(sandbox);
        let operators = OperatorTable::with_defaults(&mut state.symtab);
        crate::builtins::install(&mut state);
        state.callbacks.bindings_init();
        Self { state, operators }
    }

    pub fn set_print_callback(&mut self, f: impl FnMut(&str) + 'static) {
        self.state.callbacks.print = Some(Box::new(f));
    }

    pub fn set_exception_callback(&mut self, f: impl FnMut(&Fault) + 'static) {
        self.state.callbacks.report_exception = Some(Box::new(f));
    }

    pub fn set_exit_callback(&mut self, f: impl FnMut(i32) + 'static) {
        self.state.callbacks.exit = Some(Box::new(f));
    }

    pub fn set_active_coro_callback(&mut self, f: impl FnMut(u32) + 'static) {
        self.state.callbacks.active_coro = Some(Box::new(f));
    }

    pub fn set_bindings_init_callback(&mut self, f: impl FnMut() + 'static) {
        self.state.callbacks.bindings_init = Some(Box::new(f));
    }

    pub fn exit_result(&self) -> i32 {
        self.state.exit_code
    }

    /// Records `argv` as a `Sequence`-of-strings slot on the Lobby (§6's
    /// `state_argc_argv`), under `"Args"`.
    pub fn set_cli_args(&mut self, args: &[String]) {
        let lobby = self.state.lobby;
        let items: Vec<ObjectId> = args
            .iter()
            .map(|a| self.state.alloc_with_prototype(crate::object::ObjectKind::Sequence(a.as_bytes().to_vec()), lobby))
            .collect();
        let mut map = indexmap::IndexMap::new();
        for (i, id) in items.into_iter().enumerate() {
            let sym = self.state.symtab.intern_str(&i.to_string());
            map.insert(sym, id);
        }
        let list = self.state.alloc_with_prototype(crate::object::ObjectKind::Map(map), lobby);
        let args_sym = self.state.symtab.intern_str("Args");
        self.state.heap.get_mut(lobby).unwrap().set_slot(&self.state.symtab, args_sym, list);
    }

    /// Parses `source` with the bundled toy parser and runs it to
    /// completion — the library-internal backer for `state_do_cstring`.
    pub fn do_source(&mut self, source: &str) -> VmResult<ObjectId> {
        match crate::toy_parser::parse(&mut self.state, source)? {
            Some(body) => self.do_message(body),
            None => Ok(self.state.lobby),
        }
    }

    /// Reads `path` and runs it — the library-internal backer for
    /// `state_do_file`.
    pub fn do_file(&mut self, path: &std::path::Path) -> VmResult<ObjectId> {
        let source = std::fs::read_to_string(path).map_err(|e| Fault::IoError(e.to_string()))?;
        self.do_source(&source)
    }

    /// Runs `body` to completion on the main coroutine. A pre-built message
    /// tree stands in for `doFile`/`doString` here — parsing text into one
    /// is an external collaborator's job (§6), out of this crate's scope.
    pub fn do_message(&mut self, body: Rc<Message>) -> VmResult<ObjectId> {
        let body = preprocess(&self.operators, &mut self.state.symtab, Some(body));
        let main = self.state.main_coroutine;
        self.state.coroutine_mut(main).cursor = body;
        let mut evaluator = Evaluator::new(&mut self.state);
        match evaluator.resume(main) {
            Ok(v) => Ok(v),
            Err(fault) => {
                self.state.report_exception(&fault);
                Err(fault)
            }
        }
    }

    /// Spawns a child coroutine to run `body`, without resuming it yet.
    pub fn spawn(&mut self, target: ObjectId, locals: ObjectId, body: Rc<Message>, sandbox: SandboxConfig) -> CoroutineId {
        let body = preprocess(&self.operators, &mut self.state.symtab, Some(body));
        self.state.spawn_coroutine(target, locals, body.unwrap_or_else(|| Rc::new(Message::new(self.state.symtab.intern(b"")))), sandbox)
    }

    pub fn resume(&mut self, coro: CoroutineId) -> VmResult<ObjectId> {
        let mut evaluator = Evaluator::new(&mut self.state);
        evaluator.resume(coro)
    }

    /// Single unevaluated-message send, catching `Fault::DoesNotUnderstand`
    /// into a boolean instead of propagating it — the embedding-facing
    /// equivalent of `performIfHandled`.
    pub fn try_to_perform(&mut self, receiver: ObjectId, message: &Rc<Message>) -> VmResult<Option<ObjectId>> {
        let locals = self.state.lobby;
        let coro = self.state.current_coroutine;
        let mut evaluator = Evaluator::new(&mut self.state);
        match evaluator.dispatch(coro, receiver, locals, receiver, message) {
            Ok(v) => Ok(Some(v)),
            Err(Fault::DoesNotUnderstand { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
