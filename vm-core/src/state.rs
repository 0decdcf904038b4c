//! `State`: the single owner of everything a running VM needs (§3, §5). One
//! `State` per embedding, touched from exactly one OS thread — the
//! "shared-resource policy" that lets the collector's lists, the symbol
//! table, and the current-coroutine register go without locking.

use std::collections::HashMap;
use std::rc::Rc;

use crate::block::{Block, CFunction};
use crate::collector::Collector;
use crate::coroutine::{CoroState, Coroutine, CoroutineId, StopStatus};
use crate::embed::EmbedCallbacks;
use crate::heap::{ObjectHeap, ObjectId};
use crate::message::Message;
use crate::object::{Object, ObjectKind};
use crate::sandbox::SandboxConfig;
use crate::symbol::{Symbol, SymbolTable};
use crate::weak::WeakLinks;

/// Small-integer cache range (§4.1: "cached singletons... never freed").
/// Mirrors how the collector's permanent roots are described.
const CACHED_NUMBER_LOW: i64 = -1;
const CACHED_NUMBER_HIGH: i64 = 255;

pub struct State {
    pub heap: ObjectHeap,
    pub symtab: SymbolTable,
    pub collector: Collector,
    pub weak: WeakLinks,
    coroutines: Vec<Coroutine>,
    pub lobby: ObjectId,
    pub main_coroutine: CoroutineId,
    pub current_coroutine: CoroutineId,
    cached_numbers: HashMap<i64, ObjectId>,
    /// Units of collector work performed per message dispatch (§4.1).
    pub gc_quantum: usize,
    pub callbacks: EmbedCallbacks,
    /// Scratch control-flow register, written by whichever primitive last
    /// triggered a stop (`return`/`yield`/...) and read back by the
    /// evaluator immediately after. Exactly one coroutine ever runs at a
    /// time, so one register suffices (§5's single-thread shared-resource
    /// policy).
    pub pending_stop: StopStatus,
    /// Set by `request_exit` (§6's `state_exit_result`); the process-level
    /// exit code an embedder should propagate once the VM stops running.
    pub exit_code: i32,
}

impl State {
    pub fn new(sandbox: SandboxConfig) -> Self {
        let mut heap = ObjectHeap::new();
        let mut symtab = SymbolTable::new();
        let mut collector = Collector::new(256);
        let weak = WeakLinks::new();

        let lobby = heap.alloc(Object::new(ObjectKind::Opaque));
        collector.on_allocate(&mut heap, lobby);
        collector.add_root(lobby);

        let mut cached_numbers = HashMap::new();
        for n in CACHED_NUMBER_LOW..=CACHED_NUMBER_HIGH {
            let id = heap.alloc(Object::new(ObjectKind::Number(n as f64)));
            collector.on_allocate(&mut heap, id);
            collector.add_root(id);
            cached_numbers.insert(n, id);
        }

        let lobby_sym = symtab.intern_str("Lobby");
        heap.get_mut(lobby).unwrap().set_slot(&symtab, lobby_sym, lobby);

        let root_body = Rc::new(Message::new(symtab.intern_str("")));
        let main = Coroutine::new(CoroutineId(0), None, lobby, lobby, root_body, sandbox);

        let mut state = Self {
            heap,
            symtab,
            collector,
            weak,
            coroutines: vec![main],
            lobby,
            main_coroutine: CoroutineId(0),
            current_coroutine: CoroutineId(0),
            cached_numbers,
            gc_quantum: 8,
            callbacks: EmbedCallbacks::default(),
            pending_stop: StopStatus::Normal,
            exit_code: 0,
        };
        state.coroutines[0].state = CoroState::Running;
        state
    }

    pub fn number(&mut self, value: f64) -> ObjectId {
        if value.fract() == 0.0 && value.is_finite() {
            let as_int = value as i64;
            if (CACHED_NUMBER_LOW..=CACHED_NUMBER_HIGH).contains(&as_int) && as_int as f64 == value {
                return self.cached_numbers[&as_int];
            }
        }
        let id = self.heap.alloc(Object::new(ObjectKind::Number(value)));
        self.collector.on_allocate(&mut self.heap, id);
        id
    }

    pub fn alloc_with_prototype(&mut self, kind: ObjectKind, proto: ObjectId) -> ObjectId {
        let id = self.heap.alloc(Object::with_prototype(kind, proto));
        self.collector.on_allocate(&mut self.heap, id);
        id
    }

    pub fn alloc_cfunction(&mut self, name: &str, expected_self_tag: Option<&'static str>, func: crate::block::NativeFn) -> ObjectId {
        let sym = self.symtab.intern_str(name);
        let cf = CFunction { name: sym, expected_self_tag, func };
        let id = self.heap.alloc(Object::new(ObjectKind::CFunction(cf)));
        self.collector.on_allocate(&mut self.heap, id);
        id
    }

    pub fn alloc_block(&mut self, body: Rc<Message>, arg_names: Vec<Symbol>, captured_scope: Option<ObjectId>) -> ObjectId {
        let block = Block::new(body, arg_names, captured_scope);
        let id = self.heap.alloc(Object::new(ObjectKind::Block(block)));
        self.collector.on_allocate(&mut self.heap, id);
        id
    }

    /// Cached small integers are allocated before `builtins::install` can
    /// hang a `Number` prototype off the Lobby, so their prototype list
    /// starts empty and is patched in here once the prototype exists.
    pub fn attach_number_prototype(&mut self, number_proto: ObjectId) {
        for id in self.cached_numbers.values().copied().collect::<Vec<_>>() {
            if let Some(obj) = self.heap.get_mut(id) {
                obj.prototypes = vec![number_proto];
            }
        }
    }

    /// Performs the collector's per-dispatch bounded work. Called once per
    /// message send by the evaluator (§4.1, §4.5).
    pub fn gc_tick(&mut self) {
        let transient_roots = self.transient_roots();
        self.collector.step(&mut self.heap, &mut self.weak, self.gc_quantum, &transient_roots);
    }

    pub fn spawn_coroutine(
        &mut self,
        run_target: ObjectId,
        run_locals: ObjectId,
        body: Rc<Message>,
        sandbox: SandboxConfig,
    ) -> CoroutineId {
        let id = CoroutineId(self.coroutines.len() as u32);
        let parent = Some(self.current_coroutine);
        self.coroutines.push(Coroutine::new(id, parent, run_target, run_locals, body, sandbox));
        id
    }

    pub fn coroutine(&self, id: CoroutineId) -> &Coroutine {
        &self.coroutines[id.index() as usize]
    }

    pub fn coroutine_mut(&mut self, id: CoroutineId) -> &mut Coroutine {
        &mut self.coroutines[id.index() as usize]
    }

    pub fn coroutine_count(&self) -> usize {
        self.coroutines.len()
    }

    /// Additional collector roots contributed by every coroutine's retain
    /// pool and pending result — registered once at startup isn't enough
    /// since the pools mutate at runtime, so `gc_tick` asks for them fresh
    /// on every call and feeds them into the collector's cycle boundary
    /// (`Collector` itself knows nothing about coroutines).
    pub fn transient_roots(&self) -> Vec<ObjectId> {
        let mut roots = Vec::new();
        for coro in &self.coroutines {
            roots.extend(coro.retained_ids());
            if let Some(r) = coro.result {
                roots.push(r);
            }
        }
        roots
    }

    pub fn report_exception(&mut self, fault: &crate::Fault) {
        self.callbacks.report_exception(fault);
    }

    /// Records the code a host should exit with and notifies the `exit`
    /// callback; does not itself terminate the process (§6).
    pub fn request_exit(&mut self, code: i32) {
        self.exit_code = code;
        self.callbacks.exit(code);
    }

    pub fn print(&mut self, text: &str) {
        self.callbacks.print(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_numbers_are_identity_stable() {
        let mut state = State::new(SandboxConfig::unbounded());
        let a = state.number(42.0);
        let b = state.number(42.0);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_large_numbers_allocate_fresh_objects() {
        let mut state = State::new(SandboxConfig::unbounded());
        let a = state.number(10_000.5);
        let b = state.number(10_000.5);
        assert_ne!(a, b, "non-cached numbers are fresh allocations, not interned");
    }
}
