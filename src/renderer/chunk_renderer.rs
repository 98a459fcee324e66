//! Boundary between chunk meshes and a graphics backend
//!
//! The engine never talks to a graphics API itself. A backend implements
//! [`ChunkRenderer`]; the engine hands it mesh words to upload, asks it to
//! draw, and returns handles it no longer needs.

use cgmath::Vector3;
use rustc_hash::FxHashSet;

use crate::world::core::ChunkId;

/// Vertex array and buffer of one uploaded mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuHandles {
    pub vao: u32,
    pub vbo: u32,
}

/// Borrowed mesh data for one draw
#[derive(Debug, Clone, Copy)]
pub struct MeshView<'a> {
    pub chunk: ChunkId,
    /// Interleaved `x, y, z, colour, ao` words
    pub words: &'a [u32],
    pub vertex_count: usize,
    /// Translation of the chunk's local origin in world units
    pub world_offset: Vector3<f32>,
}

pub trait ChunkRenderer {
    /// Upload `mesh`, reusing `existing` buffers if given
    fn upload(&mut self, existing: Option<GpuHandles>, mesh: MeshView<'_>) -> GpuHandles;

    fn draw(&mut self, handles: GpuHandles, mesh: MeshView<'_>);

    /// Free buffers of a mesh that was unloaded or replaced
    fn release(&mut self, handles: GpuHandles);
}

/// Backend that only does the bookkeeping, for tools and tests
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    next_handle: u32,
    live: FxHashSet<GpuHandles>,
    pub uploads: u64,
    pub draws: u64,
    pub releases: u64,
    pub vertices_drawn: u64,
    /// Handles released that were never handed out or already released
    pub bad_releases: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers currently held by the backend
    pub fn live_handles(&self) -> usize {
        self.live.len()
    }
}

impl ChunkRenderer for HeadlessRenderer {
    fn upload(&mut self, existing: Option<GpuHandles>, _mesh: MeshView<'_>) -> GpuHandles {
        self.uploads += 1;
        if let Some(handles) = existing.filter(|h| self.live.contains(h)) {
            return handles;
        }
        self.next_handle += 1;
        let handles = GpuHandles {
            vao: self.next_handle,
            vbo: self.next_handle,
        };
        self.live.insert(handles);
        handles
    }

    fn draw(&mut self, _handles: GpuHandles, mesh: MeshView<'_>) {
        self.draws += 1;
        self.vertices_drawn += mesh.vertex_count as u64;
    }

    fn release(&mut self, handles: GpuHandles) {
        self.releases += 1;
        if !self.live.remove(&handles) {
            self.bad_releases += 1;
        }
    }
}
