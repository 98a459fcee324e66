//! Chunk mesh buffers
//!
//! A mesh is rebuilt wholesale from a [`Terrain`]: six vertices per visible
//! face, each vertex five 32-bit words (position, packed colour, occlusion).

use bytemuck::{Pod, Zeroable};

use super::terrain::Terrain;
use crate::constants::core::BLOCK_RADIUS;
use crate::constants::mesh::{MAX_CHUNK_VERTICES, WORDS_PER_VERTEX};
use crate::renderer::GpuHandles;
use crate::world::core::face::FACE_VERTEX_CORNERS;
use crate::world::core::Face;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ChunkVertex {
    pub position: [f32; 3],
    pub colour: u32,
    pub ao: f32,
}

const _: () = assert!(std::mem::size_of::<ChunkVertex>() == WORDS_PER_VERTEX * 4);

#[derive(Debug, Default)]
pub struct ChunkMesh {
    vertices: Vec<ChunkVertex>,
    face_counts: [u32; 6],
    /// GPU copy is out of date
    dirty: bool,
    gpu: Option<GpuHandles>,
}

impl ChunkMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from `terrain`, returning the number of words written
    pub fn populate(&mut self, terrain: &Terrain) -> usize {
        self.vertices.clear();
        self.face_counts = [0; 6];

        for (coord, block) in terrain.blocks().iter_coords() {
            if block.visibility.is_empty() || !block.is_opaque() {
                continue;
            }
            let colour = block.block_type.colour();
            let centre = coord.map(|c| c as f32 * BLOCK_RADIUS * 2.0);

            for face in block.visibility.visible_faces() {
                for (vertex, corner) in FACE_VERTEX_CORNERS[face.index()].iter().enumerate() {
                    self.vertices.push(ChunkVertex {
                        position: [
                            centre[0] + corner[0] as f32 * BLOCK_RADIUS,
                            centre[1] + corner[1] as f32 * BLOCK_RADIUS,
                            centre[2] + corner[2] as f32 * BLOCK_RADIUS,
                        ],
                        colour,
                        ao: block.ao.brightness(face, vertex),
                    });
                }
                self.face_counts[face.index()] += 1;
            }
        }

        assert!(
            self.vertices.len() <= MAX_CHUNK_VERTICES,
            "mesh overflow: {} vertices",
            self.vertices.len()
        );
        self.dirty = true;
        self.word_count()
    }

    pub fn vertices(&self) -> &[ChunkVertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn word_count(&self) -> usize {
        self.vertices.len() * WORDS_PER_VERTEX
    }

    /// Interleaved vertex words as handed to the renderer
    pub fn as_words(&self) -> &[u32] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Visible faces pointing in `face`'s direction
    pub fn face_count(&self, face: Face) -> usize {
        self.face_counts[face.index()] as usize
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_uploaded(&mut self, handles: GpuHandles) {
        self.gpu = Some(handles);
        self.dirty = false;
    }

    pub fn gpu_handles(&self) -> Option<GpuHandles> {
        self.gpu
    }

    pub fn take_gpu_handles(&mut self) -> Option<GpuHandles> {
        self.gpu.take()
    }

    /// Empty the mesh for reuse, keeping its allocation
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.face_counts = [0; 6];
        self.dirty = false;
        debug_assert!(self.gpu.is_none(), "GPU handles must be retired before reuse");
    }
}
