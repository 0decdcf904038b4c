//! The evaluator (§4.5): slot lookup along the prototype chain, the
//! `forward`/doesNotUnderstand fallback, activation dispatch across the
//! three activatable shapes (CFunction, Block, self-evaluating data), and
//! the stop-status handling that implements `return`/`yield` by unwinding
//! the Rust call stack rather than switching stacks (see `coroutine.rs`).

use std::collections::HashSet;
use std::rc::Rc;

use crate::coroutine::{CoroState, CoroutineId, StopStatus};
use crate::heap::ObjectId;
use crate::message::Message;
use crate::object::ObjectKind;
use crate::state::State;
use crate::symbol::Symbol;
use crate::{Fault, VmResult};

pub struct Evaluator<'s> {
    pub state: &'s mut State,
}

impl<'s> Evaluator<'s> {
    pub fn new(state: &'s mut State) -> Self {
        Self { state }
    }

    fn tag_of(&self, id: ObjectId) -> &'static str {
        self.state.heap.get(id).map(|o| o.kind.tag_name()).unwrap_or("Object")
    }

    /// Depth-first search over the prototype DAG, visiting each object at
    /// most once (§4.5 "cycle safety") — multiple inheritance means this is
    /// a search over a graph that may legitimately contain diamonds and,
    /// if misbuilt by the embedder, cycles.
    pub(crate) fn lookup(&self, start: ObjectId, name: Symbol) -> Option<(ObjectId, ObjectId)> {
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(obj) = self.state.heap.get(id) {
                if let Some(v) = obj.get_slot(&self.state.symtab, name) {
                    return Some((id, v));
                }
                for p in obj.prototypes.iter().rev() {
                    stack.push(*p);
                }
            }
        }
        None
    }

    pub fn set_slot(&mut self, owner: ObjectId, key: Symbol, value: ObjectId) {
        self.state.collector.write_barrier(&mut self.state.heap, owner, value);
        if let Some(obj) = self.state.heap.get_mut(owner) {
            obj.set_slot(&self.state.symtab, key, value);
        }
    }

    /// Evaluates one argument subtree as a standalone expression, in the
    /// caller's `(target, locals)` context. Used by `CFunction`s and by
    /// block activation to evaluate arguments eagerly.
    pub fn eval_expr(&mut self, target: ObjectId, locals: ObjectId, coro: CoroutineId, expr: &Rc<Message>) -> VmResult<ObjectId> {
        let (value, _) = self.eval_sequence(target, locals, coro, Some(expr.clone()))?;
        Ok(value)
    }

    /// Walks a statement/cascade chain: each node's result becomes the
    /// receiver of the following node, unless the node is marked
    /// `is_end_of_line`, which resets the receiver back to `locals` for a
    /// fresh statement (§4.5, §3). Stops early — returning the remaining
    /// cursor — the moment `state.pending_stop` leaves `Normal`, so a
    /// caller (typically `resume`) can capture a coroutine's pause point.
    pub fn eval_sequence(
        &mut self,
        target: ObjectId,
        locals: ObjectId,
        coro: CoroutineId,
        mut cursor: Option<Rc<Message>>,
    ) -> VmResult<(ObjectId, Option<Rc<Message>>)> {
        let mut receiver = locals;
        let mut result = target;
        while let Some(msg) = cursor {
            result = self.dispatch(coro, target, locals, receiver, &msg)?;
            if !matches!(self.state.pending_stop, StopStatus::Normal) {
                return Ok((result, msg.next.clone()));
            }
            let eol = msg.is_end_of_line;
            cursor = msg.next.clone();
            receiver = if eol { locals } else { result };
        }
        Ok((result, None))
    }

    /// One message send: sandbox/GC accounting, the cached-literal
    /// fast-path, slot lookup (falling back to `forward`), and activation.
    pub fn dispatch(
        &mut self,
        coro: CoroutineId,
        target: ObjectId,
        locals: ObjectId,
        receiver: ObjectId,
        message: &Rc<Message>,
    ) -> VmResult<ObjectId> {
        if let Some(reason) = self.state.coroutine_mut(coro).sandbox.tick() {
            return Err(Fault::SandboxExceeded { reason });
        }
        self.state.gc_tick();

        if let Some(literal) = message.cached() {
            return Ok(literal);
        }

        match self.lookup(receiver, message.name) {
            Some((slot_context, activated)) => self.activate(coro, target, locals, receiver, slot_context, activated, message),
            None => {
                let forward_sym = self.state.symtab.intern_str("forward");
                match self.lookup(receiver, forward_sym) {
                    Some((slot_context, activated)) => {
                        self.activate(coro, target, locals, receiver, slot_context, activated, message)
                    }
                    None => Err(Fault::DoesNotUnderstand {
                        message: self.tag_of(receiver).to_string(),
                        selector: self.state.symtab.as_str(message.name).to_string(),
                    }),
                }
            }
        }
    }

    fn activate(
        &mut self,
        coro: CoroutineId,
        caller_target: ObjectId,
        caller_locals: ObjectId,
        new_self: ObjectId,
        _slot_context: ObjectId,
        activated: ObjectId,
        message: &Rc<Message>,
    ) -> VmResult<ObjectId> {
        match self.tag_of(activated) {
            "CFunction" => {
                let cf = match &self.state.heap.get(activated).unwrap().kind {
                    ObjectKind::CFunction(cf) => *cf,
                    _ => unreachable!(),
                };
                if let Some(expected) = cf.expected_self_tag {
                    let got = self.tag_of(new_self);
                    if got != expected {
                        return Err(Fault::TypeMismatch { expected: expected.to_string(), got: got.to_string() });
                    }
                }
                (cf.func)(self, new_self, caller_locals, message)
            }
            "Block" => self.activate_block(coro, caller_target, caller_locals, new_self, activated, message),
            _ => Ok(activated),
        }
    }

    fn activate_block(
        &mut self,
        coro: CoroutineId,
        caller_target: ObjectId,
        caller_locals: ObjectId,
        new_self: ObjectId,
        activated: ObjectId,
        message: &Rc<Message>,
    ) -> VmResult<ObjectId> {
        let (body, arg_names, captured_scope, pass_stops) = match &self.state.heap.get(activated).unwrap().kind {
            ObjectKind::Block(b) => {
                b.record_activation();
                (b.body.clone(), b.arg_names.clone(), b.captured_scope, b.pass_stops)
            }
            _ => unreachable!(),
        };

        if message.args.len() < arg_names.len() {
            return Err(Fault::ArgumentCount { expected: arg_names.len().to_string(), got: message.args.len() });
        }
        let mut evaluated = Vec::with_capacity(message.args.len());
        for arg in &message.args {
            evaluated.push(self.eval_expr(caller_target, caller_locals, coro, arg)?);
        }

        let scope_parent = captured_scope.unwrap_or(new_self);
        let new_locals = self.state.alloc_with_prototype(ObjectKind::Opaque, scope_parent);
        for (name, value) in arg_names.iter().zip(evaluated.iter()) {
            self.set_slot(new_locals, *name, *value);
        }

        let (result, _) = self.eval_sequence(new_self, new_locals, coro, Some(body))?;
        match self.state.pending_stop {
            StopStatus::Return(v) if !pass_stops => {
                self.state.pending_stop = StopStatus::Normal;
                Ok(v)
            }
            _ => Ok(result),
        }
    }

    /// Resumes (or starts) a coroutine, running until it yields, raises, or
    /// runs to completion. See `coroutine.rs` for the resumption model.
    pub fn resume(&mut self, coro: CoroutineId) -> VmResult<ObjectId> {
        let prev = self.state.current_coroutine;
        self.state.current_coroutine = coro;
        self.state.callbacks.active_coro(coro.index());

        let c = self.state.coroutine(coro);
        if c.is_terminated() {
            let result = c.result.unwrap_or(c.run_target);
            self.state.current_coroutine = prev;
            return Ok(result);
        }
        let (run_target, run_locals, cursor) = (c.run_target, c.run_locals, c.cursor.clone());
        self.state.coroutine_mut(coro).state = CoroState::Running;

        let outcome = self.eval_sequence(run_target, run_locals, coro, cursor);
        let pending = std::mem::replace(&mut self.state.pending_stop, StopStatus::Normal);

        let result = match outcome {
            Ok((value, remaining)) => match pending {
                StopStatus::Yield(v) => {
                    let c = self.state.coroutine_mut(coro);
                    c.cursor = remaining;
                    c.state = CoroState::Parked;
                    Ok(v)
                }
                _ => {
                    let c = self.state.coroutine_mut(coro);
                    c.result = Some(value);
                    c.state = CoroState::Terminated;
                    Ok(value)
                }
            },
            Err(fault) => {
                let c = self.state.coroutine_mut(coro);
                c.state = CoroState::Terminated;
                c.exception = Some(run_target);
                Err(fault)
            }
        };
        self.state.current_coroutine = prev;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Object;
    use crate::sandbox::SandboxConfig;
    use crate::state::State;

    fn single_stmt(state: &mut State, value: f64, selector: &str, eol: bool) -> Rc<Message> {
        let n = state.number(value);
        let mut receiver = Message::literal(state.symtab.intern_str(""), n);
        let sel = state.symtab.intern_str(selector);
        let mut tail = Message::new(sel);
        tail.is_end_of_line = eol;
        receiver.next = Some(Rc::new(tail));
        Rc::new(receiver)
    }

    #[test]
    fn prototype_chain_lookup_finds_inherited_slot() {
        let mut state = State::new(SandboxConfig::unbounded());
        let parent = state.heap.alloc(Object::new(ObjectKind::Opaque));
        state.collector.on_allocate(&mut state.heap, parent);
        let greet_sym = state.symtab.intern_str("greeting");
        let value = state.number(7.0);
        state.heap.get_mut(parent).unwrap().set_slot(&state.symtab, greet_sym, value);

        let child = state.alloc_with_prototype(ObjectKind::Opaque, parent);

        let evaluator = Evaluator::new(&mut state);
        let found = evaluator.lookup(child, greet_sym);
        assert_eq!(found, Some((parent, value)));
    }

    #[test]
    fn differential_clone_shadows_prototype_slot() {
        let mut state = State::new(SandboxConfig::unbounded());
        let parent = state.heap.alloc(Object::new(ObjectKind::Opaque));
        state.collector.on_allocate(&mut state.heap, parent);
        let x = state.symtab.intern_str("x");
        let shared = state.number(1.0);
        state.heap.get_mut(parent).unwrap().set_slot(&state.symtab, x, shared);

        let child = state.alloc_with_prototype(ObjectKind::Opaque, parent);
        let shadow = state.number(2.0);
        state.heap.get_mut(child).unwrap().set_slot(&state.symtab, x, shadow);

        let evaluator = Evaluator::new(&mut state);
        assert_eq!(evaluator.lookup(child, x), Some((child, shadow)));
        assert_eq!(evaluator.lookup(parent, x), Some((parent, shared)));
    }

    #[test]
    fn does_not_understand_is_raised_for_missing_selector() {
        let mut state = State::new(SandboxConfig::unbounded());
        let obj = state.heap.alloc(Object::new(ObjectKind::Opaque));
        state.collector.on_allocate(&mut state.heap, obj);
        let locals = obj;
        let coro = state.current_coroutine;
        let stmt = single_stmt(&mut state, 0.0, "totallyUnknownSelector", true);
        let mut evaluator = Evaluator::new(&mut state);
        let err = evaluator.dispatch(coro, obj, locals, obj, &stmt.next.clone().unwrap());
        assert!(matches!(err, Err(Fault::DoesNotUnderstand { .. })));
    }

    #[test]
    fn sandbox_message_count_limit_raises_fault() {
        let mut state = State::new(SandboxConfig::unbounded().with_message_count_limit(2));
        crate::builtins::install(&mut state);
        let coro = state.current_coroutine;
        let obj = state.lobby;
        let first = single_stmt(&mut state, 1.0, "yield", false);
        let mut evaluator = Evaluator::new(&mut state);
        // First two dispatches (literal, then "yield") succeed; a third
        // trips the limit.
        assert!(evaluator.dispatch(coro, obj, obj, obj, &first).is_ok());
        let second = first.next.clone().unwrap();
        let outcome = evaluator.dispatch(coro, obj, obj, obj, &second);
        assert!(outcome.is_ok(), "yield itself should still be within budget");
        let third = single_stmt(&mut *evaluator.state, 2.0, "yield", false);
        let outcome = evaluator.dispatch(coro, obj, obj, obj, &third);
        assert!(matches!(outcome, Err(Fault::SandboxExceeded { .. })));
    }
}
