// File: src/table.rs
//
// Open-addressed, linear-probing hash table keyed by Value, used for both
// the string intern pool and the VM's global variables. Grounded in the
// reference implementation's generic `hashValue`-based table (as opposed
// to the canonical clox table, which hardcodes `ObjString*` keys) — see
// SPEC_FULL.md §3's Interning/Hash Table clause.

use crate::memory::Heap;
use crate::value::{ObjRef, Value};

const MAX_LOAD_FACTOR: f64 = 0.5;

#[derive(Debug, Clone)]
struct Entry {
    key: Value,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Entry { key: Value::Empty, value: Value::Nil }
    }
}

/// Hashes a `Value` the way the reference table does: strings use their
/// cached FNV-1a hash, everything else gets a cheap fixed or derived hash.
/// Only string keys are ever used by this crate (intern pool and globals),
/// but the table is defined generically per spec.
fn hash_value(value: &Value, heap: &Heap) -> u32 {
    match value {
        Value::Bool(true) => 3,
        Value::Bool(false) => 5,
        Value::Nil => 7,
        Value::Number(n) => {
            let seed: u32 = 2166136261;
            (seed ^ (*n as i64 as u32)).wrapping_mul(16777619)
        }
        Value::Object(r) => heap.as_string(*r).map(|s| s.hash).unwrap_or(0),
        Value::Empty => 0,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    a == b
}

pub struct Table {
    entries: Vec<Entry>,
    count: usize,
}

impl Table {
    pub fn new() -> Self {
        Table { entries: Vec::new(), count: 0 }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Finds the slot `key` belongs in, per linear probing: returns the
    /// first empty slot or an earlier tombstone, whichever comes first, or
    /// the slot holding an equal key.
    fn find_entry(entries: &[Entry], capacity: usize, key: &Value, heap: &Heap) -> usize {
        let mut index = (hash_value(key, heap) as usize) % capacity;
        let mut tombstone: Option<usize> = None;
        loop {
            let entry = &entries[index];
            match entry.key {
                Value::Empty => {
                    if entry.value == Value::Nil {
                        return tombstone.unwrap_or(index);
                    } else if tombstone.is_none() {
                        tombstone = Some(index);
                    }
                }
                _ if values_equal(&entry.key, key) => return index,
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize, heap: &Heap) {
        let mut entries = vec![Entry::empty(); capacity];
        let mut count = 0;
        for entry in &self.entries {
            if entry.key == Value::Empty {
                continue;
            }
            let dest = Self::find_entry(&entries, capacity, &entry.key, heap);
            entries[dest] = entry.clone();
            count += 1;
        }
        self.entries = entries;
        self.count = count;
    }

    pub fn get(&self, key: &Value, heap: &Heap) -> Option<Value> {
        if self.count == 0 {
            return None;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key, heap);
        let entry = &self.entries[index];
        if entry.key == Value::Empty {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Inserts or overwrites `key`. Returns true if `key` was not already
    /// present (clox's `isNewKey`).
    pub fn set(&mut self, key: Value, value: Value, heap: &Heap) -> bool {
        if (self.count + 1) as f64 > self.capacity() as f64 * MAX_LOAD_FACTOR {
            let new_capacity = grow_capacity(self.capacity());
            self.adjust_capacity(new_capacity, heap);
        }
        let index = Self::find_entry(&self.entries, self.capacity(), &key, heap);
        let entry = &mut self.entries[index];
        let is_new_key = entry.key == Value::Empty;
        if is_new_key && entry.value == Value::Nil {
            self.count += 1;
        }
        entry.key = key;
        entry.value = value;
        is_new_key
    }

    pub fn delete(&mut self, key: &Value, heap: &Heap) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, self.capacity(), key, heap);
        let entry = &mut self.entries[index];
        if entry.key == Value::Empty {
            return false;
        }
        entry.key = Value::Empty;
        entry.value = Value::Bool(true);
        true
    }

    /// Looks up an interned string by raw bytes and precomputed hash
    /// without needing a `Value` key to already exist. This is how
    /// `Heap::intern` avoids allocating a throwaway string just to probe
    /// the table.
    pub fn find_string(&self, chars: &str, hash: u32, heap: &Heap) -> Option<ObjRef> {
        if self.count == 0 {
            return None;
        }
        let capacity = self.capacity();
        let mut index = (hash as usize) % capacity;
        loop {
            let entry = &self.entries[index];
            match entry.key {
                Value::Empty if entry.value == Value::Nil => return None,
                Value::Object(r) => {
                    if let Some(s) = heap.as_string(r) {
                        if s.hash == hash && s.as_str() == chars {
                            return Some(r);
                        }
                    }
                }
                _ => {}
            }
            index = (index + 1) % capacity;
        }
    }

    /// Removes entries whose string key is unmarked, per the GC's weak
    /// string-table sweep (SPEC_FULL.md §4.5).
    pub fn remove_unmarked_string_keys(&mut self, is_marked: impl Fn(ObjRef) -> bool) {
        for entry in &mut self.entries {
            if let Value::Object(r) = entry.key {
                if !is_marked(r) {
                    entry.key = Value::Empty;
                    entry.value = Value::Bool(true);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().filter(|e| e.key != Value::Empty).map(|e| (&e.key, &e.value))
    }
}

fn grow_capacity(capacity: usize) -> usize {
    if capacity < 8 {
        8
    } else {
        capacity * 2
    }
}

impl Default for Table {
    fn default() -> Self {
        Table::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Heap;

    #[test]
    fn set_then_get_round_trips() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let key = Value::Object(heap.intern("answer"));
        table.set(key, Value::Number(42.0), &heap);
        assert_eq!(table.get(&key, &heap), Some(Value::Number(42.0)));
    }

    #[test]
    fn delete_then_get_returns_none_but_table_still_works() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let a = Value::Object(heap.intern("a"));
        let b = Value::Object(heap.intern("b"));
        table.set(a, Value::Number(1.0), &heap);
        table.set(b, Value::Number(2.0), &heap);
        assert!(table.delete(&a, &heap));
        assert_eq!(table.get(&a, &heap), None);
        assert_eq!(table.get(&b, &heap), Some(Value::Number(2.0)));
    }

    #[test]
    fn grows_past_half_load_factor() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        for i in 0..100 {
            let key = Value::Object(heap.intern(&format!("key{i}")));
            table.set(key, Value::Number(i as f64), &heap);
        }
        for i in 0..100 {
            let key = Value::Object(heap.intern(&format!("key{i}")));
            assert_eq!(table.get(&key, &heap), Some(Value::Number(i as f64)));
        }
    }

    #[test]
    fn find_string_locates_interned_string_without_allocating() {
        let mut heap = Heap::new();
        let mut table = Table::new();
        let r = heap.intern("hello");
        table.set(Value::Object(r), Value::Nil, &heap);
        let hash = heap.as_string(r).unwrap().hash;
        assert_eq!(table.find_string("hello", hash, &heap), Some(r));
        assert_eq!(table.find_string("goodbye", hash, &heap), None);
    }
}
