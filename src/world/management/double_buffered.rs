//! Double-buffered work queues
//!
//! Any thread may [`DoubleBuffered::add`] into the front buffer; the tick
//! thread periodically swaps it with a private back buffer and drains that
//! without holding the lock. The collection type decides whether duplicate
//! entries within one generation collapse (sets) or accumulate (vectors).

use std::hash::{Hash, Hasher};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::world::core::ChunkId;

/// Storage behind one side of a [`DoubleBuffered`] queue
pub trait EntryCollection: Default + Send {
    type Entry;

    /// Returns false if the entry was folded into an existing one
    fn insert(&mut self, entry: Self::Entry) -> bool;
    fn len(&self) -> usize;
    fn clear(&mut self);
}

impl<T: Send> EntryCollection for Vec<T> {
    type Entry = T;

    fn insert(&mut self, entry: T) -> bool {
        self.push(entry);
        true
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn clear(&mut self) {
        Vec::clear(self)
    }
}

impl<T: Hash + Eq + Send> EntryCollection for FxHashSet<T> {
    type Entry = T;

    fn insert(&mut self, entry: T) -> bool {
        std::collections::HashSet::insert(self, entry)
    }

    fn len(&self) -> usize {
        std::collections::HashSet::len(self)
    }

    fn clear(&mut self) {
        std::collections::HashSet::clear(self)
    }
}

pub struct DoubleBuffered<C: EntryCollection> {
    front: Mutex<C>,
}

impl<C: EntryCollection> Default for DoubleBuffered<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: EntryCollection> DoubleBuffered<C> {
    pub fn new() -> Self {
        Self {
            front: Mutex::new(C::default()),
        }
    }

    /// Returns false if an equal entry is already pending
    pub fn add(&self, entry: C::Entry) -> bool {
        self.front.lock().insert(entry)
    }

    /// Exchange the pending entries with `back`, which must have been drained
    pub fn swap(&self, back: &mut C) {
        debug_assert_eq!(back.len(), 0, "swapping into an undrained buffer");
        back.clear();
        std::mem::swap(&mut *self.front.lock(), back);
    }

    pub fn pending(&self) -> usize {
        self.front.lock().len()
    }
}

/// Finalization request, unique per chunk within one generation
#[derive(Debug, Clone, Copy)]
pub struct FinalizeEntry {
    pub id: ChunkId,
    /// Re-merge and re-mesh a chunk that already has a mesh
    pub merely_update: bool,
    /// Consecutive times this chunk waited on a loading neighbour
    pub retries: u32,
}

/// Unload request, unique per chunk within one generation
#[derive(Debug, Clone, Copy)]
pub struct UnloadEntry {
    pub id: ChunkId,
    pub allow_cache: bool,
    /// Terrain generation failed; the chunk never left `LoadingTerrain`
    pub generation_failed: bool,
}

macro_rules! keyed_by_chunk {
    ($entry:ty) => {
        impl PartialEq for $entry {
            fn eq(&self, other: &Self) -> bool {
                self.id == other.id
            }
        }

        impl Eq for $entry {}

        impl Hash for $entry {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state)
            }
        }
    };
}

keyed_by_chunk!(FinalizeEntry);
keyed_by_chunk!(UnloadEntry);

pub type FinalizeQueue = DoubleBuffered<FxHashSet<FinalizeEntry>>;
pub type UnloadQueue = DoubleBuffered<FxHashSet<UnloadEntry>>;
pub type UncacheQueue = DoubleBuffered<FxHashSet<ChunkId>>;
pub type GarbageQueue<T> = DoubleBuffered<Vec<T>>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_set_deduplicates_by_chunk() {
        let queue = FinalizeQueue::new();
        let id = ChunkId::new(1, 2);
        assert!(queue.add(FinalizeEntry { id, merely_update: false, retries: 0 }));
        assert!(!queue.add(FinalizeEntry { id, merely_update: true, retries: 3 }));
        assert!(queue.add(FinalizeEntry { id: ChunkId::new(2, 1), merely_update: false, retries: 0 }));
        assert_eq!(queue.pending(), 2);

        let mut back = FxHashSet::default();
        queue.swap(&mut back);
        assert_eq!(back.len(), 2);
        assert_eq!(queue.pending(), 0);

        // first insert wins
        let kept = back.iter().find(|e| e.id == id).copied();
        assert_eq!(kept.map(|e| e.merely_update), Some(false));

        // the same chunk may be queued again in the next generation
        assert!(queue.add(FinalizeEntry { id, merely_update: true, retries: 0 }));
    }

    #[test]
    fn test_vec_keeps_duplicates() {
        let queue = GarbageQueue::<ChunkId>::new();
        let id = ChunkId::new(0, 0);
        assert!(queue.add(id));
        assert!(queue.add(id));

        let mut back = Vec::new();
        queue.swap(&mut back);
        assert_eq!(back, vec![id, id]);
    }

    #[test]
    fn test_concurrent_adds_are_all_drained() {
        let queue = Arc::new(GarbageQueue::<ChunkId>::new());
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        queue.add(ChunkId::new(t, i));
                    }
                })
            })
            .collect();

        let mut drained = Vec::new();
        let mut back = Vec::new();
        for handle in threads {
            queue.swap(&mut back);
            drained.append(&mut back);
            handle.join().unwrap();
        }
        queue.swap(&mut back);
        drained.append(&mut back);

        assert_eq!(drained.len(), 1000);
    }
}
