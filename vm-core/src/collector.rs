//! The incremental tricolor mark-sweep collector (§4.1).
//!
//! Four intrusive, doubly-linked lists — white, gray, black, and (logically)
//! the freed objects recycled into per-tag pools — hold every live object.
//! List membership changes by unlink + push-front, which is O(1) the way
//! the spec requires. Each call to `step` performs a small, bounded amount
//! of work so a caller (the evaluator, once per message dispatch) can keep
//! the mutator responsive without ever stopping the world.
//!
//! Collector lists are plain `Option<ObjectId>`-linked (no sentinel node) —
//! functionally identical to a sentinel-terminated circular list for the
//! purposes of O(1) membership transitions, just without an allocated
//! sentinel object. Color-list *rotation* at cycle end (yesterday's black
//! becomes today's white) is itself performed incrementally, one object per
//! quantum, so it never shows up as a stop-the-world pass either.

use std::collections::HashMap;

use crate::heap::{ObjectHeap, ObjectId};
use crate::object::Color;
use crate::slots::Slots;
use crate::weak::WeakLinks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Marking,
    Sweeping,
    Rotating,
}

pub struct Collector {
    white: Option<ObjectId>,
    gray: Option<ObjectId>,
    black: Option<ObjectId>,
    phase: Phase,
    /// Permanent roots: the Lobby, cached singletons, cached small integers.
    roots: Vec<ObjectId>,
    recycle: HashMap<&'static str, Vec<Slots>>,
    max_recycled: usize,
    recycled_count: usize,
    swept_last_cycle: usize,
}

impl Collector {
    pub fn new(max_recycled_objects: usize) -> Self {
        Self {
            white: None,
            gray: None,
            black: None,
            phase: Phase::Marking,
            roots: Vec::new(),
            recycle: HashMap::new(),
            max_recycled: max_recycled_objects,
            recycled_count: 0,
            swept_last_cycle: 0,
        }
    }

    /// Registers a permanent root (cached integers, the Lobby). Roots are
    /// re-grayed at the start of every cycle, so they are never swept even
    /// across the black→white rotation.
    pub fn add_root(&mut self, id: ObjectId) {
        self.roots.push(id);
    }

    pub fn color_of(&self, heap: &ObjectHeap, id: ObjectId) -> Option<Color> {
        heap.get(id).map(|o| o.color)
    }

    /// A freshly allocated object starts life gray (reachable, unscanned).
    pub fn on_allocate(&mut self, heap: &mut ObjectHeap, id: ObjectId) {
        self.push_front(heap, id, Color::Gray);
    }

    /// Takes a `Slots` from the recycle pool for `tag`, if one is
    /// available, so a fresh allocation can skip re-growing its table.
    pub fn take_recycled_slots(&mut self, tag: &'static str) -> Option<Slots> {
        let pool = self.recycle.get_mut(tag)?;
        let slots = pool.pop();
        if slots.is_some() {
            self.recycled_count -= 1;
        }
        slots
    }

    /// Write barrier (§4.1 invariants): if `owner` is black and `referent`
    /// is white, gray the referent so a `black → white` edge never survives
    /// past the barrier.
    pub fn write_barrier(&mut self, heap: &mut ObjectHeap, owner: ObjectId, referent: ObjectId) {
        let owner_black = matches!(self.color_of(heap, owner), Some(Color::Black));
        let referent_white = matches!(self.color_of(heap, referent), Some(Color::White));
        if owner_black && referent_white {
            self.move_to(heap, referent, Color::Gray);
        }
    }

    /// Performs up to `quantum` units of incremental work: marking,
    /// sweeping, and rotation are all bounded steps drawn from the same
    /// budget, so callers can invoke this once per message dispatch.
    /// `transient_roots` are re-grayed at the next cycle boundary alongside
    /// the permanent roots (§4.6: coroutine retain pools are a generational
    /// root set, not just the Lobby and cached singletons).
    pub fn step(&mut self, heap: &mut ObjectHeap, weak: &mut WeakLinks, quantum: usize, transient_roots: &[ObjectId]) {
        let mut budget = quantum;
        while budget > 0 {
            match self.phase {
                Phase::Marking => {
                    if let Some(id) = self.gray {
                        self.unlink(heap, id);
                        let refs = heap.get(id).map(|o| o.outgoing_refs()).unwrap_or_default();
                        for r in refs {
                            if matches!(self.color_of(heap, r), Some(Color::White)) {
                                self.move_to(heap, r, Color::Gray);
                            }
                        }
                        self.push_front(heap, id, Color::Black);
                        budget -= 1;
                    } else {
                        self.phase = Phase::Sweeping;
                    }
                }
                Phase::Sweeping => {
                    if let Some(id) = self.white {
                        self.unlink(heap, id);
                        self.sweep_one(heap, weak, id);
                        self.swept_last_cycle += 1;
                        budget -= 1;
                    } else {
                        self.phase = Phase::Rotating;
                    }
                }
                Phase::Rotating => {
                    if let Some(id) = self.black {
                        self.unlink(heap, id);
                        self.push_front(heap, id, Color::White);
                        budget -= 1;
                    } else {
                        self.phase = Phase::Marking;
                        self.swept_last_cycle = 0;
                        self.start_cycle(heap, transient_roots);
                    }
                }
            }
        }
    }

    /// Re-grays every currently-white root — permanent and transient — to
    /// seed a new marking pass.
    fn start_cycle(&mut self, heap: &mut ObjectHeap, transient_roots: &[ObjectId]) {
        let roots: Vec<ObjectId> = self.roots.iter().copied().chain(transient_roots.iter().copied()).collect();
        for root in roots {
            if matches!(self.color_of(heap, root), Some(Color::White)) {
                self.move_to(heap, root, Color::Gray);
            }
        }
    }

    fn sweep_one(&mut self, heap: &mut ObjectHeap, weak: &mut WeakLinks, id: ObjectId) {
        let (listeners, tag, mut slots) = match heap.get_mut(id) {
            Some(obj) => {
                let listeners = std::mem::take(&mut obj.listeners);
                let tag = obj.kind.tag_name();
                let slots = std::mem::replace(&mut obj.slots, Slots::new());
                (listeners, tag, slots)
            }
            None => return,
        };
        for listener in listeners {
            weak.notify_collected(listener);
        }
        heap.dealloc(id);
        if self.recycled_count < self.max_recycled {
            slots.clear();
            self.recycle.entry(tag).or_default().push(slots);
            self.recycled_count += 1;
        }
    }

    fn list_head_mut(&mut self, color: Color) -> &mut Option<ObjectId> {
        match color {
            Color::White => &mut self.white,
            Color::Gray => &mut self.gray,
            Color::Black => &mut self.black,
            Color::Freed => unreachable!("Freed is not a traversable color list"),
        }
    }

    fn unlink(&mut self, heap: &mut ObjectHeap, id: ObjectId) {
        let (prev, next, color) = match heap.get(id) {
            Some(obj) => (obj.list_prev, obj.list_next, obj.color),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(o) = heap.get_mut(p) {
                    o.list_next = next;
                }
            }
            None => *self.list_head_mut(color) = next,
        }
        if let Some(n) = next {
            if let Some(o) = heap.get_mut(n) {
                o.list_prev = prev;
            }
        }
        if let Some(o) = heap.get_mut(id) {
            o.list_prev = None;
            o.list_next = None;
        }
    }

    fn push_front(&mut self, heap: &mut ObjectHeap, id: ObjectId, color: Color) {
        let old_head = *self.list_head_mut(color);
        if let Some(h) = old_head {
            if let Some(o) = heap.get_mut(h) {
                o.list_prev = Some(id);
            }
        }
        if let Some(o) = heap.get_mut(id) {
            o.list_next = old_head;
            o.list_prev = None;
            o.color = color;
        }
        *self.list_head_mut(color) = Some(id);
    }

    fn move_to(&mut self, heap: &mut ObjectHeap, id: ObjectId, color: Color) {
        self.unlink(heap, id);
        self.push_front(heap, id, color);
    }

    /// Runs to the next `Marking` phase boundary — useful for tests and for
    /// a "force one GC" call, where a single full cycle (mark everything
    /// reachable, sweep everything else, rotate) is wanted immediately
    /// rather than spread across many quanta.
    pub fn run_full_cycle(&mut self, heap: &mut ObjectHeap, weak: &mut WeakLinks, transient_roots: &[ObjectId]) {
        loop {
            self.step(heap, weak, 1, transient_roots);
            if self.phase == Phase::Sweeping {
                break;
            }
        }
        loop {
            self.step(heap, weak, 1, transient_roots);
            if self.phase == Phase::Rotating {
                break;
            }
        }
        loop {
            self.step(heap, weak, 1, transient_roots);
            if self.phase == Phase::Marking {
                break;
            }
        }
    }

    pub fn white_count(&self, heap: &ObjectHeap) -> usize {
        self.count_list(heap, self.white)
    }

    pub fn gray_count(&self, heap: &ObjectHeap) -> usize {
        self.count_list(heap, self.gray)
    }

    pub fn black_count(&self, heap: &ObjectHeap) -> usize {
        self.count_list(heap, self.black)
    }

    fn count_list(&self, heap: &ObjectHeap, head: Option<ObjectId>) -> usize {
        let mut count = 0;
        let mut cur = head;
        while let Some(id) = cur {
            count += 1;
            cur = heap.get(id).and_then(|o| o.list_next);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectKind};
    use crate::symbol::SymbolTable;

    fn setup() -> (ObjectHeap, Collector, WeakLinks, SymbolTable) {
        (ObjectHeap::new(), Collector::new(64), WeakLinks::new(), SymbolTable::new())
    }

    #[test]
    fn newly_allocated_objects_eventually_become_black_or_get_collected() {
        let (mut heap, mut gc, mut weak, _symtab) = setup();
        let root = heap.alloc(Object::new(ObjectKind::Opaque));
        gc.on_allocate(&mut heap, root);
        gc.add_root(root);
        for _ in 0..100 {
            gc.step(&mut heap, &mut weak, 4, &[]);
        }
        assert!(heap.is_live(root));
        assert_eq!(gc.color_of(&heap, root), Some(Color::Black));
    }

    #[test]
    fn unreachable_cycle_is_swept_without_freeing_roots() {
        let (mut heap, mut gc, mut weak, mut symtab) = setup();
        let root = heap.alloc(Object::new(ObjectKind::Opaque));
        gc.on_allocate(&mut heap, root);
        gc.add_root(root);

        // Build a cyclic chain of 1000 objects reachable only from `root`
        // via a single slot, then sever that one reference.
        let mut ids = Vec::new();
        for _ in 0..1000 {
            let id = heap.alloc(Object::new(ObjectKind::Opaque));
            gc.on_allocate(&mut heap, id);
            ids.push(id);
        }
        for i in 0..ids.len() {
            let next = ids[(i + 1) % ids.len()];
            heap.get_mut(ids[i]).unwrap().prototypes.push(next);
        }
        let anchor_sym = symtab.intern_str("anchor");
        heap.get_mut(root).unwrap().set_slot(&symtab, anchor_sym, ids[0]);

        gc.run_full_cycle(&mut heap, &mut weak, &[]);
        assert!(heap.is_live(root));
        for id in &ids {
            assert!(heap.is_live(*id), "reachable cycle member freed too early");
        }

        // Sever the only external reference into the cycle and run full
        // cycles until everything is swept.
        heap.get_mut(root).unwrap().slots.clear();
        for _ in 0..10 {
            gc.run_full_cycle(&mut heap, &mut weak, &[]);
        }

        assert!(heap.is_live(root));
        for id in ids {
            assert!(!heap.is_live(id), "expected cyclic garbage to be collected");
        }
    }

    #[test]
    fn transient_root_survives_cycles_that_a_twin_with_no_root_does_not() {
        let (mut heap, mut gc, mut weak, _symtab) = setup();

        let retained = heap.alloc(Object::new(ObjectKind::Opaque));
        gc.on_allocate(&mut heap, retained);
        let unrooted = heap.alloc(Object::new(ObjectKind::Opaque));
        gc.on_allocate(&mut heap, unrooted);

        // Neither object is reachable from a permanent root; `retained` is
        // only kept alive by being passed as a transient root every cycle,
        // the way a coroutine's retain pool would supply it.
        for _ in 0..5 {
            gc.run_full_cycle(&mut heap, &mut weak, &[retained]);
        }

        assert!(heap.is_live(retained), "transient root must survive repeated collections");
        assert!(!heap.is_live(unrooted), "an object with no root at all should eventually be swept");
    }
}
