use cgmath::{Point3, Vector3};
use serde::{Deserialize, Serialize};

use super::face::Face;
use crate::constants::core::{
    BLOCK_SCALE, CHUNK_DEPTH, CHUNK_DEPTH_SHIFT, CHUNK_WIDTH, CHUNK_WIDTH_SHIFT,
};

/// Column coordinate of a chunk packed into one 64-bit key.
///
/// `x` occupies the high 32 bits and `z` the low 32 bits, both stored as
/// their two's complement bit patterns so every `i32` pair round-trips.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    pub const fn new(x: i32, z: i32) -> Self {
        Self(((x as u32 as u64) << 32) | (z as u32 as u64))
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn x(self) -> i32 {
        (self.0 >> 32) as u32 as i32
    }

    pub const fn z(self) -> i32 {
        self.0 as u32 as i32
    }

    pub const fn deconstruct(self) -> (i32, i32) {
        (self.x(), self.z())
    }

    /// Chunk containing a global block position
    pub fn owning(block: BlockPos) -> Self {
        Self::new(block.x >> CHUNK_WIDTH_SHIFT, block.z >> CHUNK_DEPTH_SHIFT)
    }

    /// Adjacent chunk across a horizontal face; vertical faces return `self`
    pub fn neighbour(self, side: Face) -> Self {
        let [dx, _, dz] = side.offset();
        Self::new(self.x().wrapping_add(dx), self.z().wrapping_add(dz))
    }

    /// Front (-x), left (-z), right (+z), back (+x)
    pub fn neighbours(self) -> [(Face, ChunkId); 4] {
        Face::HORIZONTAL.map(|side| (side, self.neighbour(side)))
    }

    pub fn distance_squared_to(self, other: ChunkId) -> i64 {
        let dx = self.x() as i64 - other.x() as i64;
        let dz = self.z() as i64 - other.z() as i64;
        dx * dx + dz * dz
    }

    /// Global block position of this chunk's (0, 0, 0) block
    pub fn block_origin(self) -> BlockPos {
        BlockPos::new(
            self.x().wrapping_mul(CHUNK_WIDTH as i32),
            0,
            self.z().wrapping_mul(CHUNK_DEPTH as i32),
        )
    }

    /// World-space translation applied to this chunk's mesh
    pub fn world_offset(self) -> Vector3<f32> {
        Vector3::new(
            self.x() as f32 * CHUNK_WIDTH as f32 / BLOCK_SCALE,
            0.0,
            self.z() as f32 * CHUNK_DEPTH as f32 / BLOCK_SCALE,
        )
    }
}

impl std::fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ChunkId({}, {})", self.x(), self.z())
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x(), self.z())
    }
}

/// Global block coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Block containing a world-space position
    pub fn from_world_pos(pos: Point3<f32>) -> Self {
        Self {
            x: (pos.x * BLOCK_SCALE).floor() as i32,
            y: (pos.y * BLOCK_SCALE).floor() as i32,
            z: (pos.z * BLOCK_SCALE).floor() as i32,
        }
    }

    pub fn chunk(self) -> ChunkId {
        ChunkId::owning(self)
    }

    /// Position inside the owning chunk
    pub fn local(self) -> (usize, i32, usize) {
        (
            self.x.rem_euclid(CHUNK_WIDTH as i32) as usize,
            self.y,
            self.z.rem_euclid(CHUNK_DEPTH as i32) as usize,
        )
    }
}
