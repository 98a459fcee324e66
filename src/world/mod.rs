//! World module
//!
//! - **Core**: chunk ids, faces, blocks and the dense grid
//! - **Storage**: terrain, meshes and the fixed chunk pools
//! - **Generation**: pluggable terrain sources
//! - **Management**: the chunk lifecycle and the observer-driven loader

pub mod core;
pub mod generation;
pub mod management;
pub mod storage;

pub use core::{Block, BlockPos, BlockType, ChunkId, Face};
pub use generation::{create_generator, GenerationError, TerrainGenerator};
pub use management::{ChunkState, Observer, RequestOutcome, World, WorldLoader};
pub use storage::{Chunk, ChunkMesh, Terrain};
