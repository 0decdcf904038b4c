//! The object record (§3 Data Model) and its primitive payload tags.

use indexmap::IndexMap;

use crate::block::{Block, CFunction};
use crate::heap::ObjectId;
use crate::slots::Slots;
use crate::symbol::Symbol;
use crate::weak::ListenerId;

/// Collector color, per §4.1. Two bits suffice; kept as a plain enum for
/// readability rather than packed bits — the object record is already
/// heap-allocated so there's no packing pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    White,
    Gray,
    Black,
    /// Not a real tricolor state — membership in the collector's recycled
    /// free-list, distinct from "scheduled for sweep".
    Freed,
}

/// Primitive payload carried by an object, beyond its slots and prototype
/// chain. `spec.md` §3 lists "sequence bytes, number double, stream handle,
/// coroutine stack" as examples; this is the concrete tag set fixed by
/// SPEC_FULL.md §3 for a runnable core.
#[derive(Debug, Clone)]
pub enum ObjectKind {
    /// A plain object with no primitive payload (e.g. `Object clone`).
    Opaque,
    Number(f64),
    Sequence(Vec<u8>),
    /// An ordered symbol-keyed map, distinct from slots: slots are an
    /// object's own identity/inheritance surface, a `Map` is a first-class
    /// value passed around like any other (SPEC_FULL.md §3 supplement).
    Map(IndexMap<Symbol, ObjectId>),
    Block(Block),
    CFunction(CFunction),
    Coroutine(crate::coroutine::CoroutineId),
}

impl ObjectKind {
    pub fn tag_name(&self) -> &'static str {
        match self {
            ObjectKind::Opaque => "Object",
            ObjectKind::Number(_) => "Number",
            ObjectKind::Sequence(_) => "Sequence",
            ObjectKind::Map(_) => "Map",
            ObjectKind::Block(_) => "Block",
            ObjectKind::CFunction(_) => "CFunction",
            ObjectKind::Coroutine(_) => "Coroutine",
        }
    }
}

/// An allocated object: its tag/payload, slots, prototype chain, and the
/// collector bookkeeping (color plus intrusive list links) that lets the
/// collector move it between color lists in O(1).
pub struct Object {
    pub kind: ObjectKind,
    pub slots: Slots,
    /// Ordered prototype references — multiple inheritance is a list, not a
    /// single parent pointer.
    pub prototypes: Vec<ObjectId>,
    pub color: Color,
    pub(crate) list_prev: Option<ObjectId>,
    pub(crate) list_next: Option<ObjectId>,
    pub(crate) listeners: Vec<ListenerId>,
}

impl Object {
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            kind,
            slots: Slots::new(),
            prototypes: Vec::new(),
            color: Color::Gray,
            list_prev: None,
            list_next: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_prototype(kind: ObjectKind, proto: ObjectId) -> Self {
        let mut o = Self::new(kind);
        o.prototypes.push(proto);
        o
    }

    pub fn register_listener(&mut self, id: ListenerId) {
        if !self.listeners.contains(&id) {
            self.listeners.push(id);
        }
    }

    pub fn unregister_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|l| *l != id);
    }

    /// All `ObjectId`s this object directly references: prototypes and slot
    /// values. Used by the collector's scan phase and is the only place the
    /// "outgoing references" notion needs to be kept in sync with the data
    /// model.
    pub fn outgoing_refs(&self) -> Vec<ObjectId> {
        let mut refs = self.prototypes.clone();
        refs.extend(self.slots.values());
        match &self.kind {
            ObjectKind::Block(b) => {
                if let Some(scope) = b.captured_scope {
                    refs.push(scope);
                }
            }
            ObjectKind::Map(m) => refs.extend(m.values().copied()),
            _ => {}
        }
        refs
    }

    pub fn set_slot(&mut self, symtab: &crate::symbol::SymbolTable, key: Symbol, value: ObjectId) {
        self.slots.insert(symtab, key, value);
    }

    pub fn get_slot(&self, symtab: &crate::symbol::SymbolTable, key: Symbol) -> Option<ObjectId> {
        self.slots.get(symtab, key)
    }
}
