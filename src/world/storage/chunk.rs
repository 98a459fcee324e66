use std::time::Instant;

use cgmath::Vector3;

use super::mesh::ChunkMesh;
use super::terrain::Terrain;
use crate::world::core::{ChunkId, Face};

/// Written when a chunk is handed out by the pool
pub(crate) const LIVE_SENTINEL: u64 = 0x5EED_C0DE_5EED_C0DE;
/// Written when a chunk returns to the pool; must still be intact on the next allocation
pub(crate) const FREED_SENTINEL: u64 = 0xDEAD_BEEF_DEAD_BEEF;

/// Terrain and mesh of one column. Lives in a [`super::pool::ChunkSlot`]
/// which carries its lifecycle state and reference count.
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    pub terrain: Terrain,
    mesh: Option<ChunkMesh>,
    load_timestamp: Option<Instant>,
    sentinel: u64,
}

impl Chunk {
    pub(crate) fn vacant() -> Self {
        Self {
            id: ChunkId::new(0, 0),
            terrain: Terrain::new(),
            mesh: None,
            load_timestamp: None,
            sentinel: FREED_SENTINEL,
        }
    }

    pub(crate) fn activate(&mut self, id: ChunkId, mesh: ChunkMesh) {
        self.id = id;
        self.mesh = Some(mesh);
        self.load_timestamp = Some(Instant::now());
        self.sentinel = LIVE_SENTINEL;
    }

    pub(crate) fn retire(&mut self) -> Option<ChunkMesh> {
        self.sentinel = FREED_SENTINEL;
        self.load_timestamp = None;
        self.mesh.take()
    }

    pub(crate) fn sentinel(&self) -> u64 {
        self.sentinel
    }

    /// Allocated to `id` and not yet returned to the pool
    pub fn is_live(&self, id: ChunkId) -> bool {
        self.sentinel == LIVE_SENTINEL && self.id == id
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn load_timestamp(&self) -> Option<Instant> {
        self.load_timestamp
    }

    pub fn neighbours(&self) -> [(Face, ChunkId); 4] {
        self.id.neighbours()
    }

    pub fn world_offset(&self) -> Vector3<f32> {
        self.id.world_offset()
    }

    pub fn mesh(&self) -> Option<&ChunkMesh> {
        self.mesh.as_ref()
    }

    pub fn mesh_mut(&mut self) -> Option<&mut ChunkMesh> {
        self.mesh.as_mut()
    }

    /// Rebuild this chunk's own mesh in place
    pub fn populate_mesh(&mut self) -> usize {
        match self.mesh.as_mut() {
            Some(mesh) => mesh.populate(&self.terrain),
            None => 0,
        }
    }

    /// Install `mesh`, returning the one it replaces
    pub fn swap_mesh(&mut self, mesh: ChunkMesh) -> Option<ChunkMesh> {
        self.mesh.replace(mesh)
    }
}
