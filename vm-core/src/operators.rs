//! Operator shuffle (§4.5): precedence reordering plus assignment-operator
//! rewriting, run once over a message tree before its first evaluation.
//! This module is a pure structural transform — it never touches `State` or
//! the heap, so it can be unit-tested without an evaluator.
//!
//! Input shape: a "flat" chain built by an external parser/lexer (§6) as
//! `operand0 -> op1 -> operand1 -> op2 -> operand2 -> ...` linked through
//! `Message::next`, where each `opN` is a bare, zero-arg message named after
//! the operator symbol. `shuffle` folds that chain into a properly nested
//! tree by precedence (precedence climbing over the token list), and
//! rewrites the two assignment pseudo-operators (`:=`, `=`) into
//! `setSlotWithType`/`updateSlot` sends before folding runs.

use std::collections::HashMap;
use std::rc::Rc;

use crate::message::Message;
use crate::symbol::{Symbol, SymbolTable};

pub struct OperatorTable {
    precedence: HashMap<Symbol, u8>,
    create_assign: Symbol,
    update_assign: Symbol,
}

impl OperatorTable {
    /// Registers the standard C-family precedence levels (higher binds
    /// tighter), plus the two assignment selectors rewritten before folding.
    pub fn with_defaults(symtab: &mut SymbolTable) -> Self {
        let mut precedence = HashMap::new();
        let mut level = |symtab: &mut SymbolTable, syms: &[&str], prec: u8| {
            for s in syms {
                precedence.insert(symtab.intern_str(s), prec);
            }
        };
        level(symtab, &["*", "/", "%"], 7);
        level(symtab, &["+", "-"], 6);
        level(symtab, &["<<", ">>"], 5);
        level(symtab, &["<", "<=", ">", ">="], 4);
        level(symtab, &["==", "!="], 3);
        level(symtab, &["and", "&&"], 2);
        level(symtab, &["or", "||"], 1);
        Self {
            precedence,
            create_assign: symtab.intern_str(":="),
            update_assign: symtab.intern_str("="),
        }
    }

    pub fn precedence_of(&self, sym: Symbol) -> Option<u8> {
        self.precedence.get(&sym).copied()
    }

    pub fn is_operator(&self, sym: Symbol) -> bool {
        self.precedence.contains_key(&sym) || sym == self.create_assign || sym == self.update_assign
    }

    fn is_assignment(&self, sym: Symbol) -> bool {
        sym == self.create_assign || sym == self.update_assign
    }
}

#[derive(Clone)]
enum Token {
    Operand(Rc<Message>),
    Operator(Symbol),
}

/// Runs the shuffle over one flat chain starting at `head`. Returns the
/// folded tree's root and the tail (`.next`) to resume normal statement
/// walking from. A chain with no recognized operators is returned
/// unchanged (tail = head.next).
pub fn shuffle(table: &OperatorTable, symtab: &mut SymbolTable, head: Rc<Message>) -> (Rc<Message>, Option<Rc<Message>>) {
    let (tokens, tail) = tokenize(table, head.clone());
    if tokens.len() <= 1 {
        return (head, tail);
    }
    let tokens = rewrite_assignments(table, symtab, tokens);
    if tokens.len() == 1 {
        let Token::Operand(m) = tokens.into_iter().next().unwrap() else {
            unreachable!()
        };
        return (m, tail);
    }
    let mut pos = 0usize;
    let folded = fold(table, &tokens, &mut pos, 0);
    (folded, tail)
}

/// Splits the chain at the first statement/cascade boundary: `is_end_of_line`
/// on a node, or a non-operator appearing where an operator was expected.
fn tokenize(table: &OperatorTable, head: Rc<Message>) -> (Vec<Token>, Option<Rc<Message>>) {
    let mut tokens = Vec::new();
    let mut cursor = Some(head);
    let mut tail = None;
    let mut expect_operand = true;
    while let Some(msg) = cursor {
        if expect_operand {
            let end_of_line = msg.is_end_of_line;
            let next = msg.next.clone();
            tokens.push(Token::Operand(msg));
            expect_operand = false;
            if end_of_line {
                tail = next;
                break;
            }
            cursor = next;
        } else if table.is_operator(msg.name) {
            let end_of_line = msg.is_end_of_line;
            let next = msg.next.clone();
            tokens.push(Token::Operator(msg.name));
            expect_operand = true;
            if end_of_line {
                tail = next;
                break;
            }
            cursor = next;
        } else {
            tail = Some(msg);
            break;
        }
    }
    (tokens, tail)
}

/// Rewrites `lhs := rhs` / `lhs = rhs` pairs into single `setSlotWithType`/
/// `updateSlot` operand tokens before precedence folding runs, so
/// assignment is handled out-of-band rather than given a numeric
/// precedence level. The slot name comes from the LHS message's own
/// selector (not an evaluated argument), keeping this pass free of heap
/// access.
fn rewrite_assignments(table: &OperatorTable, symtab: &mut SymbolTable, tokens: Vec<Token>) -> Vec<Token> {
    let create = symtab.intern_str("setSlotWithType");
    let update = symtab.intern_str("updateSlot");
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if let (Token::Operand(lhs), Some(Token::Operator(op))) = (&tokens[i], tokens.get(i + 1)) {
            if table.is_assignment(*op) {
                if let Some(Token::Operand(rhs)) = tokens.get(i + 2) {
                    let selector = if *op == table.create_assign { create } else { update };
                    let rewritten = Rc::new(
                        Message::with_args(selector, vec![lhs.clone(), rhs.clone()]).with_line("", lhs.line),
                    );
                    out.push(Token::Operand(rewritten));
                    i += 3;
                    continue;
                }
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

/// Precedence climbing: `pos` indexes into `tokens` (always pointing at an
/// operand on entry), and is advanced past whatever this call consumes.
///
/// Builds a *cascade*, not a nested-args tree: each folded operator becomes
/// a node appended via `.next` onto the running left operand, exactly the
/// shape `eval_chain` (§4.5) expects — the receiver of each node is
/// whatever the previous node evaluated to. Only the right-hand operand of
/// each operator (possibly itself a multi-node cascade, for a
/// higher-precedence subexpression) is nested as an argument.
fn fold(table: &OperatorTable, tokens: &[Token], pos: &mut usize, min_prec: u8) -> Rc<Message> {
    let first = match &tokens[*pos] {
        Token::Operand(m) => (**m).clone(),
        Token::Operator(_) => unreachable!("fold must start on an operand"),
    };
    *pos += 1;
    let mut cascade = vec![first];
    loop {
        let op = match tokens.get(*pos) {
            Some(Token::Operator(op)) => *op,
            _ => break,
        };
        let prec = table.precedence_of(op).unwrap_or(0);
        if prec < min_prec {
            break;
        }
        *pos += 1; // consume operator
        let rhs = fold(table, tokens, pos, prec + 1);
        cascade.push(Message::with_args(op, vec![rhs]));
    }
    let mut rev = cascade.into_iter().rev();
    let mut acc = rev.next().expect("cascade always has at least one node");
    for mut node in rev {
        node.next = Some(Rc::new(acc));
        acc = node;
    }
    Rc::new(acc)
}

/// Applies `shuffle` across an entire tree once: every statement in the
/// top-level chain, and recursively every argument subtree of every node
/// produced, so a call's arguments can themselves be un-shuffled operator
/// chains. Called once per coroutine body, at spawn time, matching "before
/// first evaluation" (§4.5) — never re-run per dispatch.
///
/// A chain built directly (not through a flat operator span — the common
/// case for trees this crate constructs itself rather than receiving from
/// an external parser) round-trips through `shuffle` unchanged at each
/// node, so this walks such chains in place and only replaces structure
/// where folding actually found an operator span to rewrite.
pub fn preprocess(table: &OperatorTable, symtab: &mut SymbolTable, head: Option<Rc<Message>>) -> Option<Rc<Message>> {
    let head = head?;
    let (folded, tail) = shuffle(table, symtab, head.clone());
    if Rc::ptr_eq(&folded, &head) {
        let mut m = (*head).clone();
        m.args = m.args.into_iter().map(|a| preprocess(table, symtab, Some(a)).unwrap()).collect();
        m.next = preprocess(table, symtab, m.next);
        return Some(Rc::new(m));
    }
    let folded = preprocess_cascade_args(table, symtab, folded);
    let rest = preprocess(table, symtab, tail);
    Some(append_at_end(folded, rest))
}

/// Recurses into every node's `args` along a freshly folded cascade,
/// without touching `.next` (the cascade's own linkage is already final).
fn preprocess_cascade_args(table: &OperatorTable, symtab: &mut SymbolTable, msg: Rc<Message>) -> Rc<Message> {
    let mut m = (*msg).clone();
    m.args = m.args.into_iter().map(|a| preprocess(table, symtab, Some(a)).unwrap()).collect();
    m.next = m.next.map(|n| preprocess_cascade_args(table, symtab, n));
    Rc::new(m)
}

/// Walks to the end of `head`'s `.next` chain (expected to terminate in
/// `None`) and attaches `rest` there.
fn append_at_end(head: Rc<Message>, rest: Option<Rc<Message>>) -> Rc<Message> {
    let mut m = (*head).clone();
    m.next = match m.next {
        Some(n) => Some(append_at_end(n, rest)),
        None => rest,
    };
    Rc::new(m)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(symtab: &mut SymbolTable, name: &str) -> Message {
        Message::new(symtab.intern_str(name))
    }

    /// Builds a flat `.next`-linked chain from already-constructed messages,
    /// in source order.
    fn chain(mut nodes: Vec<Message>) -> Rc<Message> {
        let mut acc = nodes.pop().expect("non-empty chain");
        while let Some(mut node) = nodes.pop() {
            node.next = Some(Rc::new(acc));
            acc = node;
        }
        Rc::new(acc)
    }

    #[test]
    fn single_operand_chain_is_returned_unchanged() {
        let mut symtab = SymbolTable::new();
        let table = OperatorTable::with_defaults(&mut symtab);
        let a = leaf(&mut symtab, "a");
        let a_name = a.name;
        let (result, _) = shuffle(&table, &mut symtab, Rc::new(a));
        assert_eq!(result.name, a_name);
    }

    #[test]
    fn assignment_rewrites_to_set_slot_with_type() {
        let mut symtab = SymbolTable::new();
        let table = OperatorTable::with_defaults(&mut symtab);
        let head = chain(vec![
            leaf(&mut symtab, "x"),
            leaf(&mut symtab, ":="),
            leaf(&mut symtab, "5"),
        ]);
        let (result, _) = shuffle(&table, &mut symtab, head);
        assert_eq!(symtab.as_str(result.name), "setSlotWithType");
        assert_eq!(result.args.len(), 2);
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let mut symtab = SymbolTable::new();
        let table = OperatorTable::with_defaults(&mut symtab);
        // a + b * c  =>  cascade [a, +(args=[b->*(args=[c])])]
        // i.e. "+" is sent to whatever "a" evaluates to, with its argument
        // being the independently-evaluated "b * c" subexpression.
        let head = chain(vec![
            leaf(&mut symtab, "a"),
            leaf(&mut symtab, "+"),
            leaf(&mut symtab, "b"),
            leaf(&mut symtab, "*"),
            leaf(&mut symtab, "c"),
        ]);
        let (result, _) = shuffle(&table, &mut symtab, head);
        assert_eq!(symtab.as_str(result.name), "a");
        let plus = result.next.as_ref().expect("+ node follows a");
        assert_eq!(symtab.as_str(plus.name), "+");
        assert_eq!(plus.args.len(), 1);
        let rhs = &plus.args[0];
        assert_eq!(symtab.as_str(rhs.name), "b");
        let times = rhs.next.as_ref().expect("* node follows b");
        assert_eq!(symtab.as_str(times.name), "*");
        assert_eq!(symtab.as_str(times.args[0].name), "c");
    }

    #[test]
    fn end_of_line_splits_chain_into_separate_statements() {
        let mut symtab = SymbolTable::new();
        let table = OperatorTable::with_defaults(&mut symtab);
        let mut first = leaf(&mut symtab, "a");
        first.is_end_of_line = true;
        let second = leaf(&mut symtab, "b");
        let head = chain(vec![first, second]);
        let (result, tail) = shuffle(&table, &mut symtab, head);
        assert_eq!(symtab.as_str(result.name), "a");
        assert!(tail.is_some());
        assert_eq!(symtab.as_str(tail.unwrap().name), "b");
    }
}
