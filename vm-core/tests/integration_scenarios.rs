//! End-to-end scenarios exercising the evaluator, builtins, coroutines, and
//! sandbox accounting together rather than one module in isolation.

use std::rc::Rc;

use vm_core::{Evaluator, Fault, Message, ObjectKind, SandboxConfig, State};

fn unary(state: &mut State, selector: &str, eol: bool) -> Rc<Message> {
    let sym = state.symtab.intern_str(selector);
    let mut m = Message::new(sym);
    m.is_end_of_line = eol;
    Rc::new(m)
}

fn keyword_send(state: &mut State, selector: &str, name_arg: &str, value_arg: Rc<Message>) -> Rc<Message> {
    let sym = state.symtab.intern_str(selector);
    let name_sym = state.symtab.intern_str(name_arg);
    let name_msg = Rc::new(Message::new(name_sym));
    Rc::new(Message::with_args(sym, vec![name_msg, value_arg]))
}

/// `getSlot` only ever reads `message.args[0].name`; a single-argument send
/// with no evaluated value is all it needs.
fn get_slot_send(state: &mut State, name_arg: &str) -> Rc<Message> {
    let sym = state.symtab.intern_str("getSlot");
    let name_sym = state.symtab.intern_str(name_arg);
    let name_msg = Rc::new(Message::new(name_sym));
    Rc::new(Message::with_args(sym, vec![name_msg]))
}

fn literal_of(state: &mut State, value: f64) -> Rc<Message> {
    let n = state.number(value);
    Rc::new(Message::literal(state.symtab.intern_str(""), n))
}

/// Scenario 1: a clone shadows a slot without disturbing its prototype's
/// own value (prototype-chain lookup with differential inheritance).
#[test]
fn differential_inheritance_shadows_without_mutating_the_prototype() {
    let mut state = State::new(SandboxConfig::unbounded());
    vm_core::builtins::install(&mut state);
    let lobby = state.lobby;
    let coro = state.current_coroutine;

    let parent = state.alloc_with_prototype(ObjectKind::Opaque, lobby);

    // parent setSlotWithType(x, 42)
    let set_x_42 = keyword_send(&mut state, "setSlotWithType", "x", literal_of(&mut state, 42.0));
    let mut evaluator = Evaluator::new(&mut state);
    evaluator.dispatch(coro, parent, parent, parent, &set_x_42).unwrap();

    // child := parent clone
    let clone_msg = unary(evaluator.state, "clone", true);
    let child = evaluator.dispatch(coro, parent, parent, parent, &clone_msg).unwrap();
    assert_eq!(evaluator.state.heap.get(child).unwrap().prototypes, vec![parent]);

    // child getSlot(x) inherits the parent's value before any shadowing.
    let get_x = get_slot_send(evaluator.state, "x");
    let inherited = evaluator.dispatch(coro, child, child, child, &get_x).unwrap();
    match evaluator.state.heap.get(inherited).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 42.0),
        _ => panic!("expected the inherited Number"),
    }

    // child setSlotWithType(x, 100) shadows without touching the parent.
    let set_x_100 = keyword_send(evaluator.state, "setSlotWithType", "x", literal_of(evaluator.state, 100.0));
    evaluator.dispatch(coro, child, child, child, &set_x_100).unwrap();

    let get_x_again = get_slot_send(evaluator.state, "x");
    let child_x = evaluator.dispatch(coro, child, child, child, &get_x_again).unwrap();
    match evaluator.state.heap.get(child_x).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 100.0),
        _ => panic!("expected the Number"),
    }

    let get_parent_x = get_slot_send(evaluator.state, "x");
    let parent_x = evaluator.dispatch(coro, parent, parent, parent, &get_parent_x).unwrap();
    match evaluator.state.heap.get(parent_x).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 42.0, "parent's own slot must be unaffected by the child's shadowing"),
        _ => panic!("expected the Number"),
    }
}

/// Scenario 2: `1 yield; 2 yield; 3` pauses at each yield and resumes with
/// the next statement's receiver, terminating with the trailing literal.
#[test]
fn coroutine_yields_in_order_then_terminates_with_the_final_statement() {
    let mut state = State::new(SandboxConfig::unbounded());
    vm_core::builtins::install(&mut state);
    let lobby = state.lobby;

    let mut n3 = (*literal_of(&mut state, 3.0)).clone();
    n3.is_end_of_line = true;
    let mut nodes = vec![literal_of(&mut state, 1.0), unary(&mut state, "yield", true), literal_of(&mut state, 2.0), unary(&mut state, "yield", true), Rc::new(n3)];
    for i in (0..nodes.len() - 1).rev() {
        let next = nodes[i + 1].clone();
        let mut owned = (*nodes[i]).clone();
        owned.next = Some(next);
        nodes[i] = Rc::new(owned);
    }
    let body = nodes[0].clone();

    let coro = state.spawn_coroutine(lobby, lobby, body, SandboxConfig::unbounded());
    let mut evaluator = Evaluator::new(&mut state);

    let first = evaluator.resume(coro).unwrap();
    match evaluator.state.heap.get(first).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 1.0),
        _ => panic!("expected Number(1)"),
    }

    let second = evaluator.resume(coro).unwrap();
    match evaluator.state.heap.get(second).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 2.0),
        _ => panic!("expected Number(2)"),
    }

    let third = evaluator.resume(coro).unwrap();
    match evaluator.state.heap.get(third).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 3.0),
        _ => panic!("expected the terminal Number(3)"),
    }

    // A coroutine that has already terminated just hands back its result.
    let again = evaluator.resume(coro).unwrap();
    match evaluator.state.heap.get(again).unwrap().kind {
        ObjectKind::Number(n) => assert_eq!(n, 3.0),
        _ => panic!("terminated coroutine should keep returning its result"),
    }
}

/// Scenario 6: a sandbox with `messageCountLimit = 50` runs every dispatch
/// up to the limit and then raises on the next one, never silently
/// truncating the run.
#[test]
fn sandbox_message_count_limit_of_fifty_is_enforced_exactly() {
    let mut state = State::new(SandboxConfig::unbounded().with_message_count_limit(50));
    vm_core::builtins::install(&mut state);
    let lobby = state.lobby;

    // Build 30 "<n> yield" statements chained together — far more than the
    // 25 the limit allows, so the run must stop partway through.
    let mut nodes = Vec::new();
    for i in 0..30 {
        nodes.push(literal_of(&mut state, i as f64));
        nodes.push(unary(&mut state, "yield", true));
    }
    for i in (0..nodes.len() - 1).rev() {
        let next = nodes[i + 1].clone();
        let mut owned = (*nodes[i]).clone();
        owned.next = Some(next);
        nodes[i] = Rc::new(owned);
    }
    let body = nodes[0].clone();

    let coro = state.spawn_coroutine(lobby, lobby, body, SandboxConfig::unbounded().with_message_count_limit(50));
    let mut evaluator = Evaluator::new(&mut state);

    let mut successes = 0;
    let mut failed_with_sandbox = false;
    for _ in 0..30 {
        match evaluator.resume(coro) {
            Ok(_) => successes += 1,
            Err(Fault::SandboxExceeded { .. }) => {
                failed_with_sandbox = true;
                break;
            }
            Err(other) => panic!("unexpected fault: {other:?}"),
        }
    }

    assert!(failed_with_sandbox, "expected the sandbox limit to eventually trip");
    // Each statement costs two dispatches (literal, then yield); a limit of
    // 50 allows exactly 25 full statements before the 26th's first dispatch
    // trips it.
    assert_eq!(successes, 25);
}
