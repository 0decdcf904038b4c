//! Per-object slot mapping (§4.4): cuckoo hashing over the symbol's two
//! hash words, bounded displacement, grow-on-failed-insert, shrink when
//! load drops below 1/8. Key comparison is symbol identity — no byte
//! comparison is ever needed once a `Symbol` has been produced by the
//! table.

use crate::heap::ObjectId;
use crate::symbol::{Symbol, SymbolTable};

const MAX_DISPLACEMENT: usize = 10;
const INITIAL_CAPACITY: usize = 8;

#[derive(Clone, Copy)]
struct Entry {
    key: Symbol,
    value: ObjectId,
}

/// A single object's symbol → value mapping. Iteration order is explicitly
/// not meaningful (per spec) and is whatever the cuckoo table happens to
/// hold.
pub struct Slots {
    table: Vec<Option<Entry>>,
    len: usize,
}

impl Slots {
    pub fn new() -> Self {
        Self {
            table: vec![None; INITIAL_CAPACITY],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, symtab: &SymbolTable, key: Symbol) -> Option<ObjectId> {
        let (h1, h2) = symtab.hash_words(key);
        let mask = self.table.len() - 1;
        for h in [h1, h2] {
            let idx = (h as usize) & mask;
            if let Some(e) = self.table[idx] {
                if e.key == key {
                    return Some(e.value);
                }
            }
        }
        None
    }

    pub fn contains(&self, symtab: &SymbolTable, key: Symbol) -> bool {
        self.get(symtab, key).is_some()
    }

    /// Inserts or overwrites `key`'s value. Emits no write-barrier event
    /// itself — the caller (the evaluator's slot-write primitive) is
    /// responsible for calling `Collector::write_barrier`, since only it
    /// knows the owning object's color.
    pub fn insert(&mut self, symtab: &SymbolTable, key: Symbol, value: ObjectId) {
        // Overwrite in place if the key already lives at either candidate slot.
        let (h1, h2) = symtab.hash_words(key);
        let mask = self.table.len() - 1;
        for h in [h1, h2] {
            let idx = (h as usize) & mask;
            if let Some(e) = &mut self.table[idx] {
                if e.key == key {
                    e.value = value;
                    return;
                }
            }
        }
        self.len += 1;
        self.cuckoo_insert(symtab, Entry { key, value });
    }

    fn cuckoo_insert(&mut self, symtab: &SymbolTable, mut entry: Entry) {
        for _ in 0..MAX_DISPLACEMENT {
            let (h1, _) = symtab.hash_words(entry.key);
            let mask = self.table.len() - 1;
            let idx = (h1 as usize) & mask;
            match self.table[idx].replace(entry) {
                None => return,
                Some(evicted) => {
                    // Displaced entry moves to its *other* candidate slot.
                    let (eh1, eh2) = symtab.hash_words(evicted.key);
                    let primary = (eh1 as usize) & mask;
                    let alt = if primary == idx {
                        (eh2 as usize) & mask
                    } else {
                        primary
                    };
                    if alt == idx {
                        // Both candidate slots coincide (degenerate hash
                        // collision on word selection) — park the evicted
                        // entry here and treat as unresolved displacement.
                        entry = evicted;
                        continue;
                    }
                    match self.table[alt] {
                        None => {
                            self.table[alt] = Some(evicted);
                            return;
                        }
                        Some(_) => {
                            entry = evicted;
                            // loop continues, relocating evicted further.
                        }
                    }
                }
            }
        }
        // Displacement chain exhausted: grow and retry from scratch.
        self.grow(symtab);
        self.cuckoo_insert(symtab, entry);
    }

    pub fn remove(&mut self, symtab: &SymbolTable, key: Symbol) -> Option<ObjectId> {
        let (h1, h2) = symtab.hash_words(key);
        let mask = self.table.len() - 1;
        for h in [h1, h2] {
            let idx = (h as usize) & mask;
            if let Some(e) = self.table[idx] {
                if e.key == key {
                    self.table[idx] = None;
                    self.len -= 1;
                    self.maybe_shrink(symtab);
                    return Some(e.value);
                }
            }
        }
        None
    }

    fn grow(&mut self, symtab: &SymbolTable) {
        let new_capacity = self.table.len() * 2;
        self.rehash_to(symtab, new_capacity);
    }

    fn maybe_shrink(&mut self, symtab: &SymbolTable) {
        if self.table.len() > INITIAL_CAPACITY && self.len * 8 < self.table.len() {
            let new_capacity = (self.table.len() / 2).max(INITIAL_CAPACITY);
            self.rehash_to(symtab, new_capacity);
        }
    }

    fn rehash_to(&mut self, symtab: &SymbolTable, new_capacity: usize) {
        let old_entries: Vec<Entry> = self.table.iter().filter_map(|e| *e).collect();
        self.table = vec![None; new_capacity];
        for entry in old_entries {
            self.cuckoo_insert(symtab, entry);
        }
    }

    /// All values currently stored — used by the collector's scan phase to
    /// find this object's outgoing references.
    pub fn values(&self) -> Vec<ObjectId> {
        self.table.iter().filter_map(|e| e.map(|e| e.value)).collect()
    }

    pub fn keys(&self) -> Vec<Symbol> {
        self.table.iter().filter_map(|e| e.map(|e| e.key)).collect()
    }

    /// Empties the table while keeping its backing allocation, so a
    /// recycled object can reuse the `Vec` instead of starting from
    /// `INITIAL_CAPACITY` again. Used by the collector's recycle pool.
    pub fn clear(&mut self) {
        for slot in self.table.iter_mut() {
            *slot = None;
        }
        self.len = 0;
    }
}

impl Default for Slots {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ObjectHeap;
    use crate::object::{Object, ObjectKind};

    fn dummy_id(heap: &mut ObjectHeap) -> ObjectId {
        heap.alloc(Object::new(ObjectKind::Opaque))
    }

    #[test]
    fn insert_and_get_round_trip() {
        let mut symtab = SymbolTable::new();
        let mut heap = ObjectHeap::new();
        let mut slots = Slots::new();
        let k = symtab.intern_str("x");
        let v = dummy_id(&mut heap);
        slots.insert(&symtab, k, v);
        assert_eq!(slots.get(&symtab, k), Some(v));
    }

    #[test]
    fn overwrite_keeps_single_entry() {
        let mut symtab = SymbolTable::new();
        let mut heap = ObjectHeap::new();
        let mut slots = Slots::new();
        let k = symtab.intern_str("x");
        let v1 = dummy_id(&mut heap);
        let v2 = dummy_id(&mut heap);
        slots.insert(&symtab, k, v1);
        slots.insert(&symtab, k, v2);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots.get(&symtab, k), Some(v2));
    }

    #[test]
    fn survives_many_insertions_with_growth() {
        let mut symtab = SymbolTable::new();
        let mut heap = ObjectHeap::new();
        let mut slots = Slots::new();
        let mut pairs = Vec::new();
        for i in 0..200 {
            let k = symtab.intern_str(&format!("slot{i}"));
            let v = dummy_id(&mut heap);
            slots.insert(&symtab, k, v);
            pairs.push((k, v));
        }
        for (k, v) in pairs {
            assert_eq!(slots.get(&symtab, k), Some(v));
        }
    }

    #[test]
    fn remove_then_shrink_still_finds_remaining_keys() {
        let mut symtab = SymbolTable::new();
        let mut heap = ObjectHeap::new();
        let mut slots = Slots::new();
        let mut keys = Vec::new();
        for i in 0..100 {
            let k = symtab.intern_str(&format!("k{i}"));
            let v = dummy_id(&mut heap);
            slots.insert(&symtab, k, v);
            keys.push(k);
        }
        for k in keys.iter().take(90) {
            slots.remove(&symtab, *k);
        }
        for k in keys.iter().skip(90) {
            assert!(slots.contains(&symtab, *k));
        }
    }
}
