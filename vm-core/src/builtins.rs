//! The minimal built-in Lobby surface needed to exercise the evaluator,
//! coroutines, and sandbox end to end (SPEC_FULL.md supplement — the
//! parser/lexer that would normally populate a much larger Lobby is out of
//! scope, §6). Every primitive here is grounded in the same
//! `NativeFn`/`CFunction` shape `block.rs` defines.

use std::rc::Rc;

use crate::block::NativeFn;
use crate::evaluator::Evaluator;
use crate::heap::ObjectId;
use crate::message::Message;
use crate::object::ObjectKind;
use crate::sandbox::SandboxConfig;
use crate::state::State;
use crate::{Fault, VmResult};

fn install_primitive(state: &mut State, owner: ObjectId, name: &str, expected_self_tag: Option<&'static str>, f: NativeFn) {
    let cfun_id = state.alloc_cfunction(name, expected_self_tag, f);
    let sym = state.symtab.intern_str(name);
    state.heap.get_mut(owner).unwrap().set_slot(&state.symtab, sym, cfun_id);
}

/// Populates the Lobby (and the Number/Coroutine prototypes hung off it)
/// with the primitives needed by the end-to-end scenarios: differential
/// inheritance, coroutine yield/resume, and sandboxed execution.
pub fn install(state: &mut State) {
    let object_proto = state.lobby;

    install_primitive(state, object_proto, "clone", None, clone_fn);
    install_primitive(state, object_proto, "do", None, do_fn);
    install_primitive(state, object_proto, "setSlotWithType", None, set_slot_with_type_fn);
    install_primitive(state, object_proto, "updateSlot", None, set_slot_with_type_fn);
    install_primitive(state, object_proto, "getSlot", None, get_slot_fn);
    install_primitive(state, object_proto, "yield", None, yield_fn);
    install_primitive(state, object_proto, "return", None, return_fn);
    install_primitive(state, object_proto, "try", None, try_fn);
    install_primitive(state, object_proto, "exit", None, exit_fn);

    let number_proto = state.alloc_with_prototype(ObjectKind::Opaque, object_proto);
    let number_sym = state.symtab.intern_str("Number");
    state.heap.get_mut(object_proto).unwrap().set_slot(&state.symtab, number_sym, number_proto);
    install_primitive(state, number_proto, "+", Some("Number"), add_fn);
    install_primitive(state, number_proto, "-", Some("Number"), sub_fn);
    install_primitive(state, number_proto, "*", Some("Number"), mul_fn);
    install_primitive(state, number_proto, "/", Some("Number"), div_fn);
    state.attach_number_prototype(number_proto);

    let coroutine_proto = state.alloc_with_prototype(ObjectKind::Opaque, object_proto);
    let coroutine_sym = state.symtab.intern_str("Coroutine");
    state.heap.get_mut(object_proto).unwrap().set_slot(&state.symtab, coroutine_sym, coroutine_proto);
    install_primitive(state, coroutine_proto, "with", None, with_fn);
    install_primitive(state, coroutine_proto, "resume", Some("Coroutine"), resume_fn);
}

fn clone_fn(ev: &mut Evaluator, self_obj: ObjectId, _locals: ObjectId, _message: &Rc<Message>) -> VmResult<ObjectId> {
    let kind = ev.state.heap.get(self_obj).map(|o| o.kind.clone()).unwrap_or(ObjectKind::Opaque);
    Ok(ev.state.alloc_with_prototype(kind, self_obj))
}

/// Evaluates its single argument expression with `self` as both target and
/// locals — the minimal reading of "run this code against me" without a
/// textual block-literal syntax to parse.
fn do_fn(ev: &mut Evaluator, self_obj: ObjectId, _locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let arg = message.args.first().ok_or(Fault::ArgumentCount { expected: "1".into(), got: 0 })?;
    let coro = ev.state.current_coroutine;
    ev.eval_expr(self_obj, self_obj, coro, arg)
}

/// Both `setSlotWithType` and `updateSlot` resolve their target slot from
/// the first argument message's own (unevaluated) selector, rather than
/// from an evaluated string — see `operators.rs`'s assignment rewrite.
/// They are not currently distinguished (no create-vs-must-exist check);
/// a stricter `updateSlot` is a natural follow-up, not implemented here.
fn set_slot_with_type_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let name_msg = message.args.first().ok_or(Fault::ArgumentCount { expected: "2".into(), got: message.args.len() })?;
    let value_expr = message.args.get(1).ok_or(Fault::ArgumentCount { expected: "2".into(), got: message.args.len() })?;
    let coro = ev.state.current_coroutine;
    let value = ev.eval_expr(self_obj, locals, coro, value_expr)?;
    ev.set_slot(self_obj, name_msg.name, value);
    Ok(value)
}

fn get_slot_fn(ev: &mut Evaluator, self_obj: ObjectId, _locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let name_msg = message.args.first().ok_or(Fault::ArgumentCount { expected: "1".into(), got: 0 })?;
    match ev.lookup(self_obj, name_msg.name) {
        Some((_, value)) => Ok(value),
        None => Ok(ev.state.lobby),
    }
}

fn yield_fn(ev: &mut Evaluator, self_obj: ObjectId, _locals: ObjectId, _message: &Rc<Message>) -> VmResult<ObjectId> {
    ev.state.pending_stop = crate::coroutine::StopStatus::Yield(self_obj);
    Ok(self_obj)
}

fn return_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let coro = ev.state.current_coroutine;
    let value = match message.args.first() {
        Some(expr) => ev.eval_expr(self_obj, locals, coro, expr)?,
        None => self_obj,
    };
    ev.state.pending_stop = crate::coroutine::StopStatus::Return(value);
    Ok(value)
}

/// Spawns a child coroutine to run the message and resumes it once,
/// reporting any fault through the embedding's exception callback instead
/// of propagating it — the boundary most embedders actually want from a
/// "try this, don't crash the caller" primitive.
fn try_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let arg = message.args.first().ok_or(Fault::ArgumentCount { expected: "1".into(), got: 0 })?;
    let child = ev.state.spawn_coroutine(self_obj, locals, arg.clone(), SandboxConfig::unbounded());
    match ev.resume(child) {
        Ok(v) => Ok(v),
        Err(fault) => {
            ev.state.report_exception(&fault);
            Ok(self_obj)
        }
    }
}

/// `exit(code)` records the requested exit code and notifies the host's
/// `exit` callback (§6's `state_exit_result`); it does not itself stop the
/// running coroutine, matching an embedding's own event loop owning the
/// actual process shutdown.
fn exit_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let coro = ev.state.current_coroutine;
    let code = match message.args.first() {
        Some(expr) => number_value(ev.state, ev.eval_expr(self_obj, locals, coro, expr)?)? as i32,
        None => 0,
    };
    ev.state.request_exit(code);
    Ok(self_obj)
}

fn with_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    let arg = message.args.first().ok_or(Fault::ArgumentCount { expected: "1".into(), got: 0 })?;
    let coro = ev.state.current_coroutine;
    let block_id = ev.eval_expr(self_obj, locals, coro, arg)?;
    let (body, captured_scope) = match &ev.state.heap.get(block_id).unwrap().kind {
        ObjectKind::Block(b) => (b.body.clone(), b.captured_scope),
        other => {
            return Err(Fault::TypeMismatch { expected: "Block".into(), got: other.tag_name().into() });
        }
    };
    let run_target = captured_scope.unwrap_or(locals);
    let run_locals = ev.state.alloc_with_prototype(ObjectKind::Opaque, run_target);
    let new_id = ev.state.spawn_coroutine(run_target, run_locals, body, SandboxConfig::unbounded());
    Ok(ev.state.alloc_with_prototype(ObjectKind::Coroutine(new_id), self_obj))
}

fn resume_fn(ev: &mut Evaluator, self_obj: ObjectId, _locals: ObjectId, _message: &Rc<Message>) -> VmResult<ObjectId> {
    let coro_id = match &ev.state.heap.get(self_obj).unwrap().kind {
        ObjectKind::Coroutine(id) => *id,
        _ => unreachable!("expected_self_tag already checked this is a Coroutine"),
    };
    ev.resume(coro_id)
}

fn number_value(state: &State, id: ObjectId) -> VmResult<f64> {
    match state.heap.get(id).map(|o| &o.kind) {
        Some(ObjectKind::Number(n)) => Ok(*n),
        Some(other) => Err(Fault::TypeMismatch { expected: "Number".into(), got: other.tag_name().into() }),
        None => Err(Fault::TypeMismatch { expected: "Number".into(), got: "<freed>".into() }),
    }
}

fn binary_numeric(
    ev: &mut Evaluator,
    self_obj: ObjectId,
    locals: ObjectId,
    message: &Rc<Message>,
    op: impl Fn(f64, f64) -> VmResult<f64>,
) -> VmResult<ObjectId> {
    let arg = message.args.first().ok_or(Fault::ArgumentCount { expected: "1".into(), got: 0 })?;
    let coro = ev.state.current_coroutine;
    let rhs_id = ev.eval_expr(self_obj, locals, coro, arg)?;
    let lhs = number_value(ev.state, self_obj)?;
    let rhs = number_value(ev.state, rhs_id)?;
    let result = op(lhs, rhs)?;
    Ok(ev.state.number(result))
}

fn add_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    binary_numeric(ev, self_obj, locals, message, |a, b| Ok(a + b))
}

fn sub_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    binary_numeric(ev, self_obj, locals, message, |a, b| Ok(a - b))
}

fn mul_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    binary_numeric(ev, self_obj, locals, message, |a, b| Ok(a * b))
}

fn div_fn(ev: &mut Evaluator, self_obj: ObjectId, locals: ObjectId, message: &Rc<Message>) -> VmResult<ObjectId> {
    binary_numeric(ev, self_obj, locals, message, |a, b| if b == 0.0 { Err(Fault::DivisionByZero) } else { Ok(a / b) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::SandboxConfig;

    #[test]
    fn cloned_object_has_clone_source_as_its_only_prototype() {
        let mut state = State::new(SandboxConfig::unbounded());
        install(&mut state);
        let lobby = state.lobby;
        let child = state.alloc_with_prototype(ObjectKind::Opaque, lobby);
        let clone_sym = state.symtab.intern_str("clone");
        let mut evaluator = Evaluator::new(&mut state);
        let coro = evaluator.state.current_coroutine;
        let msg = Rc::new(Message::new(clone_sym));
        let cloned = evaluator.dispatch(coro, child, child, child, &msg).unwrap();
        assert_ne!(cloned, child);
        assert_eq!(evaluator.state.heap.get(cloned).unwrap().prototypes, vec![child]);
    }

    #[test]
    fn addition_of_two_numbers_computes_sum() {
        let mut state = State::new(SandboxConfig::unbounded());
        install(&mut state);
        let three = state.number(3.0);
        let four = state.number(4.0);
        let plus_sym = state.symtab.intern_str("+");
        let arg = Rc::new(Message::literal(plus_sym, four));
        let msg = Rc::new(Message::with_args(plus_sym, vec![arg]));
        let mut evaluator = Evaluator::new(&mut state);
        let coro = evaluator.state.current_coroutine;
        let result = evaluator.dispatch(coro, three, three, three, &msg).unwrap();
        match evaluator.state.heap.get(result).unwrap().kind {
            ObjectKind::Number(n) => assert_eq!(n, 7.0),
            _ => panic!("expected a Number"),
        }
    }

    #[test]
    fn addition_respects_type_mismatch() {
        let mut state = State::new(SandboxConfig::unbounded());
        install(&mut state);
        let seven = state.number(7.0);
        let not_a_number = state.lobby;
        let plus_sym = state.symtab.intern_str("+");
        let arg = Rc::new(Message::literal(plus_sym, not_a_number));
        let msg = Rc::new(Message::with_args(plus_sym, vec![arg]));
        let mut evaluator = Evaluator::new(&mut state);
        let coro = evaluator.state.current_coroutine;
        let err = evaluator.dispatch(coro, seven, seven, seven, &msg);
        assert!(matches!(err, Err(Fault::TypeMismatch { .. })));
    }

    #[test]
    fn division_by_zero_raises_fault() {
        let mut state = State::new(SandboxConfig::unbounded());
        install(&mut state);
        let ten = state.number(10.0);
        let zero = state.number(0.0);
        let slash_sym = state.symtab.intern_str("/");
        let arg = Rc::new(Message::literal(slash_sym, zero));
        let msg = Rc::new(Message::with_args(slash_sym, vec![arg]));
        let mut evaluator = Evaluator::new(&mut state);
        let coro = evaluator.state.current_coroutine;
        let err = evaluator.dispatch(coro, ten, ten, ten, &msg);
        assert!(matches!(err, Err(Fault::DivisionByZero)));
    }
}
