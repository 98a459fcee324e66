//! Chunk id → slot lookup
//!
//! Only the tick thread inserts or removes entries. Worker tasks read it to
//! find a neighbour's slot and state while finalizing.

use std::hash::BuildHasherDefault;
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHasher;

use super::state::ChunkState;
use crate::world::core::ChunkId;
use crate::world::storage::{ChunkArena, SlotId};

pub struct ChunkRegistry {
    slots: DashMap<ChunkId, SlotId, BuildHasherDefault<FxHasher>>,
    arena: Arc<ChunkArena>,
}

impl ChunkRegistry {
    pub fn new(arena: Arc<ChunkArena>) -> Self {
        Self {
            slots: DashMap::with_hasher(BuildHasherDefault::default()),
            arena,
        }
    }

    pub fn arena(&self) -> &Arc<ChunkArena> {
        &self.arena
    }

    pub fn slot_of(&self, id: ChunkId) -> Option<SlotId> {
        self.slots.get(&id).map(|entry| *entry.value())
    }

    /// Slot and state; absent chunks are `Unloaded`
    pub fn entry(&self, id: ChunkId) -> (Option<SlotId>, ChunkState) {
        match self.slot_of(id) {
            Some(slot) => (Some(slot), self.arena.slot(slot).state()),
            None => (None, ChunkState::Unloaded),
        }
    }

    pub fn state(&self, id: ChunkId) -> ChunkState {
        self.entry(id).1
    }

    pub fn contains(&self, id: ChunkId) -> bool {
        self.slots.contains_key(&id)
    }

    pub(crate) fn insert(&self, id: ChunkId, slot: SlotId) {
        if let Some(previous) = self.slots.insert(id, slot) {
            log::error!(
                "[ChunkRegistry::insert] Chunk {} was already registered in {:?}",
                id,
                previous
            );
        }
    }

    pub(crate) fn remove(&self, id: ChunkId) -> Option<SlotId> {
        self.slots.remove(&id).map(|(_, slot)| slot)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Every registered chunk with its current state
    pub fn snapshot(&self) -> Vec<(ChunkId, SlotId, ChunkState)> {
        self.slots
            .iter()
            .map(|entry| {
                let slot = *entry.value();
                (*entry.key(), slot, self.arena.slot(slot).state())
            })
            .collect()
    }

    pub fn count_in_state(&self, state: ChunkState) -> usize {
        self.slots
            .iter()
            .filter(|entry| self.arena.slot(*entry.value()).state() == state)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::storage::{ChunkMesh, ChunkPool};

    #[test]
    fn test_absent_chunks_are_unloaded() {
        let pool = ChunkPool::new(1);
        let registry = ChunkRegistry::new(Arc::clone(pool.arena()));
        assert_eq!(registry.entry(ChunkId::new(3, 3)), (None, ChunkState::Unloaded));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_state_follows_slot() {
        let mut pool = ChunkPool::new(2);
        let registry = ChunkRegistry::new(Arc::clone(pool.arena()));
        let id = ChunkId::new(-1, 4);
        let slot = pool.allocate(id, ChunkMesh::new()).unwrap();
        registry.insert(id, slot);

        assert_eq!(registry.state(id), ChunkState::Unloaded);
        pool.arena()
            .slot(slot)
            .compare_state(ChunkState::Unloaded, ChunkState::LoadingTerrain)
            .unwrap();
        assert_eq!(registry.entry(id), (Some(slot), ChunkState::LoadingTerrain));
        assert_eq!(registry.count_in_state(ChunkState::LoadingTerrain), 1);
        assert_eq!(registry.snapshot(), vec![(id, slot, ChunkState::LoadingTerrain)]);

        assert_eq!(registry.remove(id), Some(slot));
        assert!(!registry.contains(id));
    }
}
