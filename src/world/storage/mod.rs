//! Per-chunk storage: terrain, meshes and the pools that recycle them

pub mod chunk;
pub mod mesh;
pub mod pool;
pub mod terrain;

pub use chunk::Chunk;
pub use mesh::{ChunkMesh, ChunkVertex};
pub use pool::{ChunkArena, ChunkPool, ChunkSlot, MeshPool, PoolStats, SlotId};
pub use terrain::{BlockGrid, MergeOutcome, OpacityPlane, Terrain};
