//! The message tree (§3, §4.5): immutable after parse, shared across
//! activations. The lexer/parser is an external collaborator (§6) — this
//! module only defines the shape it hands to the evaluator.

use std::rc::Rc;

use crate::heap::ObjectId;
use crate::symbol::Symbol;

/// A cached literal result attached to a message at parse time, so the
/// evaluator can skip slot lookup entirely for number/string/symbol
/// literals (§4.5 step 1).
#[derive(Debug, Clone, Copy)]
pub enum CachedLiteral {
    None,
    Object(ObjectId),
}

/// One node in a message tree. Argument subtrees and an optional sibling
/// ("next") form a singly-linked statement list; everything here is
/// immutable once the parser hands it to the evaluator.
#[derive(Debug, Clone)]
pub struct Message {
    pub name: Symbol,
    pub args: Vec<Rc<Message>>,
    pub cached_literal: CachedLiteral,
    pub source_label: Option<Rc<str>>,
    pub line: u32,
    pub next: Option<Rc<Message>>,
    pub is_end_of_line: bool,
}

impl Message {
    pub fn new(name: Symbol) -> Self {
        Self {
            name,
            args: Vec::new(),
            cached_literal: CachedLiteral::None,
            source_label: None,
            line: 0,
            next: None,
            is_end_of_line: false,
        }
    }

    pub fn with_args(name: Symbol, args: Vec<Rc<Message>>) -> Self {
        let mut m = Self::new(name);
        m.args = args;
        m
    }

    pub fn literal(name: Symbol, value: ObjectId) -> Self {
        let mut m = Self::new(name);
        m.cached_literal = CachedLiteral::Object(value);
        m
    }

    pub fn with_line(mut self, label: impl Into<Rc<str>>, line: u32) -> Self {
        self.source_label = Some(label.into());
        self.line = line;
        self
    }

    pub fn followed_by(mut self, next: Rc<Message>) -> Self {
        self.next = Some(next);
        self
    }

    pub fn cached(&self) -> Option<ObjectId> {
        match self.cached_literal {
            CachedLiteral::Object(id) => Some(id),
            CachedLiteral::None => None,
        }
    }
}
