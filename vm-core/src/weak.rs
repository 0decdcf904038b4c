//! Weak links (§4.2): a non-owning reference plus a listener subscription
//! on the target. When the collector is about to free a target, it invokes
//! each registered listener's notification, which nulls the weak link's
//! cell. Reading a weak link after its target has been collected yields
//! `None`; callers at the evaluator layer map that to the nil singleton.

use crate::heap::{ObjectHeap, ObjectId};

/// Handle to one weak-link subscription. Distinct from `ObjectId` — it
/// indexes the link table, not the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u32);

enum Cell {
    Live(ObjectId),
    Collected,
    /// Slot is on the free list, pending reuse by a future `create`.
    Vacant { next_free: Option<u32> },
}

/// Registry of weak-link cells. Owned by `State` alongside the collector.
pub struct WeakLinks {
    cells: Vec<Cell>,
    free_head: Option<u32>,
}

impl WeakLinks {
    pub fn new() -> Self {
        Self {
            cells: Vec::new(),
            free_head: None,
        }
    }

    /// Creates a weak link to `target` and registers this link as a
    /// listener on the target object, so the collector can find it when
    /// `target` is about to be freed.
    pub fn create(&mut self, heap: &mut ObjectHeap, target: ObjectId) -> ListenerId {
        let id = self.alloc_cell(target);
        if let Some(obj) = heap.get_mut(target) {
            obj.register_listener(id);
        } else {
            // Target is already gone; the link starts out collected.
            self.cells[id.0 as usize] = Cell::Collected;
        }
        id
    }

    fn alloc_cell(&mut self, target: ObjectId) -> ListenerId {
        match self.free_head {
            Some(index) => {
                let next_free = match &self.cells[index as usize] {
                    Cell::Vacant { next_free } => *next_free,
                    _ => unreachable!("free list pointed at a live cell"),
                };
                self.free_head = next_free;
                self.cells[index as usize] = Cell::Live(target);
                ListenerId(index)
            }
            None => {
                let index = self.cells.len() as u32;
                self.cells.push(Cell::Live(target));
                ListenerId(index)
            }
        }
    }

    /// Called by the collector's sweep phase for every listener registered
    /// on an object it is about to free. Idempotent.
    pub fn notify_collected(&mut self, id: ListenerId) {
        if let Some(cell) = self.cells.get_mut(id.0 as usize) {
            *cell = Cell::Collected;
        }
    }

    /// Reads the current target, or `None` if it has been collected.
    pub fn read(&self, id: ListenerId) -> Option<ObjectId> {
        match self.cells.get(id.0 as usize) {
            Some(Cell::Live(target)) => Some(*target),
            _ => None,
        }
    }

    /// Unregisters a link, freeing its cell for reuse. Idempotent: calling
    /// this twice on the same id is a no-op the second time.
    pub fn unregister(&mut self, heap: &mut ObjectHeap, id: ListenerId) {
        match self.cells.get(id.0 as usize) {
            Some(Cell::Vacant { .. }) | None => return,
            Some(Cell::Live(target)) => {
                if let Some(obj) = heap.get_mut(*target) {
                    obj.unregister_listener(id);
                }
            }
            Some(Cell::Collected) => {}
        }
        self.cells[id.0 as usize] = Cell::Vacant {
            next_free: self.free_head,
        };
        self.free_head = Some(id.0);
    }
}

impl Default for WeakLinks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Object, ObjectKind};

    #[test]
    fn reading_live_link_returns_target() {
        let mut heap = ObjectHeap::new();
        let mut weak = WeakLinks::new();
        let target = heap.alloc(Object::new(ObjectKind::Opaque));
        let link = weak.create(&mut heap, target);
        assert_eq!(weak.read(link), Some(target));
    }

    #[test]
    fn notify_collected_nulls_the_link() {
        let mut heap = ObjectHeap::new();
        let mut weak = WeakLinks::new();
        let target = heap.alloc(Object::new(ObjectKind::Opaque));
        let link = weak.create(&mut heap, target);
        weak.notify_collected(link);
        assert_eq!(weak.read(link), None);
        // idempotent
        weak.notify_collected(link);
        assert_eq!(weak.read(link), None);
    }

    #[test]
    fn unregister_is_idempotent() {
        let mut heap = ObjectHeap::new();
        let mut weak = WeakLinks::new();
        let target = heap.alloc(Object::new(ObjectKind::Opaque));
        let link = weak.create(&mut heap, target);
        weak.unregister(&mut heap, link);
        weak.unregister(&mut heap, link);
    }

    #[test]
    fn linking_an_already_collected_target_reads_as_nil() {
        let mut heap = ObjectHeap::new();
        let mut weak = WeakLinks::new();
        let target = heap.alloc(Object::new(ObjectKind::Opaque));
        heap.dealloc(target);
        let link = weak.create(&mut heap, target);
        assert_eq!(weak.read(link), None);
    }
}
