//! Chunk and mesh pools
//!
//! Chunks live in a fixed arena of slots addressed by [`SlotId`]. Each slot
//! carries the chunk's lifecycle state and an atomic reference count; a slot
//! only returns to the free list once it has been retired with no references
//! outstanding. Allocation and release happen on the tick thread only.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::chunk::{Chunk, FREED_SENTINEL};
use super::mesh::ChunkMesh;
use crate::world::core::ChunkId;
use crate::world::management::ChunkState;

/// Set while a slot is being freed or sits on the free list
const RETIRED: u32 = 1 << 31;

/// Stable index of a chunk slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

pub struct ChunkSlot {
    refs: AtomicU32,
    state: AtomicU8,
    id: AtomicU64,
    chunk: RwLock<Chunk>,
}

impl ChunkSlot {
    fn new() -> Self {
        Self {
            refs: AtomicU32::new(RETIRED),
            state: AtomicU8::new(ChunkState::Unloaded as u8),
            id: AtomicU64::new(0),
            chunk: RwLock::new(Chunk::vacant()),
        }
    }

    pub fn state(&self) -> ChunkState {
        ChunkState::from_u8(self.state.load(Ordering::Acquire)).unwrap_or(ChunkState::Unloaded)
    }

    /// Move from `from` to `to`, failing with the actual state if it differs
    pub(crate) fn compare_state(&self, from: ChunkState, to: ChunkState) -> Result<(), ChunkState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| ChunkState::from_u8(actual).unwrap_or(ChunkState::Unloaded))
    }

    pub fn id(&self) -> ChunkId {
        ChunkId::from_raw(self.id.load(Ordering::Acquire))
    }

    pub fn ref_count(&self) -> u32 {
        self.refs.load(Ordering::Acquire) & !RETIRED
    }

    pub fn is_retired(&self) -> bool {
        (self.refs.load(Ordering::Acquire) & RETIRED) != 0
    }

    /// Add a reference on behalf of a task. The caller must already know the
    /// slot is live: it holds a reference itself or is the tick thread.
    pub(crate) fn retain(&self) {
        let previous = self.refs.fetch_add(1, Ordering::AcqRel);
        debug_assert!((previous & RETIRED) == 0, "retain on retired slot");
    }

    /// Take a reference if the slot still holds `expected` and is not being freed
    pub(crate) fn try_retain(&self, expected: ChunkId) -> bool {
        let acquired = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                ((refs & RETIRED) == 0).then_some(refs + 1)
            })
            .is_ok();
        if !acquired {
            return false;
        }
        if self.id() != expected || self.state() == ChunkState::Unloaded {
            self.release();
            return false;
        }
        true
    }

    /// Drop a reference. Returns false on underflow, leaving the count untouched.
    pub(crate) fn release(&self) -> bool {
        self.refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |refs| {
                ((refs & !RETIRED) > 0).then(|| refs - 1)
            })
            .is_ok()
    }

    /// Claim the slot for freeing if nothing references it
    pub(crate) fn try_retire(&self) -> bool {
        self.refs
            .compare_exchange(0, RETIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Chunk> {
        self.chunk.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Chunk> {
        self.chunk.write()
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, Chunk>> {
        self.chunk.try_write()
    }
}

/// Fixed set of chunk slots shared with worker tasks
pub struct ChunkArena {
    slots: Box<[ChunkSlot]>,
}

impl ChunkArena {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ChunkSlot::new()).collect(),
        }
    }

    pub fn slot(&self, slot: SlotId) -> &ChunkSlot {
        &self.slots[slot.index()]
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub double_frees: u64,
    /// Chunks found modified after being returned to the pool
    pub stale_writes: u64,
}

/// Free list over a [`ChunkArena`]
pub struct ChunkPool {
    arena: Arc<ChunkArena>,
    free: Vec<SlotId>,
    is_free: Vec<bool>,
    double_frees: u64,
    stale_writes: u64,
}

impl ChunkPool {
    pub fn new(capacity: usize) -> Self {
        let arena = Arc::new(ChunkArena::new(capacity));
        // lowest slots are handed out first
        let free = (0..capacity as u32).rev().map(SlotId).collect();
        Self {
            arena,
            free,
            is_free: vec![true; capacity],
            double_frees: 0,
            stale_writes: 0,
        }
    }

    pub fn arena(&self) -> &Arc<ChunkArena> {
        &self.arena
    }

    /// Hand out a slot for `id`, installing `mesh`. Returns the mesh back if
    /// no slot is free.
    pub fn allocate(&mut self, id: ChunkId, mesh: ChunkMesh) -> Result<SlotId, ChunkMesh> {
        let Some(slot_id) = self.free.pop() else {
            return Err(mesh);
        };
        self.is_free[slot_id.index()] = false;

        let slot = self.arena.slot(slot_id);
        {
            let mut chunk = slot.write();
            if chunk.sentinel() != FREED_SENTINEL || chunk.mesh().is_some() {
                self.stale_writes += 1;
                log::error!(
                    "[ChunkPool::allocate] Slot {:?} was modified after being freed (last chunk {})",
                    slot_id,
                    chunk.id()
                );
            }
            chunk.activate(id, mesh);
        }
        slot.id.store(id.raw(), Ordering::Release);
        slot.state.store(ChunkState::Unloaded as u8, Ordering::Release);
        slot.refs.store(0, Ordering::Release);

        log::trace!("[ChunkPool::allocate] {:?} -> chunk {}", slot_id, id);
        Ok(slot_id)
    }

    /// Return a retired slot to the free list, handing back its mesh
    pub fn release(&mut self, slot_id: SlotId) -> Option<ChunkMesh> {
        if self.is_free[slot_id.index()] {
            self.double_frees += 1;
            log::error!("[ChunkPool::release] Double free of slot {:?}", slot_id);
            return None;
        }

        let slot = self.arena.slot(slot_id);
        debug_assert!(slot.is_retired(), "releasing a slot that was not retired");
        debug_assert_eq!(slot.ref_count(), 0);

        let mesh = slot.write().retire();
        slot.state.store(ChunkState::Unloaded as u8, Ordering::Release);
        self.is_free[slot_id.index()] = true;
        self.free.push(slot_id);
        mesh
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            in_use: self.capacity() - self.free.len(),
            double_frees: self.double_frees,
            stale_writes: self.stale_writes,
        }
    }
}

/// Recycled mesh buffers
pub struct MeshPool {
    free: Vec<ChunkMesh>,
    capacity: usize,
    outstanding: usize,
}

impl MeshPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
            outstanding: 0,
        }
    }

    pub fn allocate(&mut self) -> Option<ChunkMesh> {
        let mesh = match self.free.pop() {
            Some(mesh) => mesh,
            None if self.outstanding < self.capacity => ChunkMesh::new(),
            None => return None,
        };
        self.outstanding += 1;
        Some(mesh)
    }

    pub fn release(&mut self, mut mesh: ChunkMesh) {
        mesh.clear();
        debug_assert!(self.outstanding > 0, "mesh released twice");
        self.outstanding = self.outstanding.saturating_sub(1);
        self.free.push(mesh);
    }

    pub fn available(&self) -> usize {
        self.capacity - self.outstanding
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
