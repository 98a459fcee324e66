//! Voxels - streaming voxel terrain
//!
//! Chunks of 16x64x16 blocks are generated, merged against their neighbours
//! and meshed on a worker pool while the loaded area follows an observer.
//! Rendering is handed off to a [`ChunkRenderer`] backend.

pub mod config;
pub mod constants;
pub mod error;
pub mod renderer;
pub mod thread_pool;
pub mod world;

pub use config::{ConfigError, GeneratorConfig, WorldConfig};
pub use error::{EngineError, EngineResult};
pub use renderer::{ChunkRenderer, GpuHandles, HeadlessRenderer, MeshView};
pub use world::{
    BlockType, ChunkId, ChunkState, Face, Observer, RequestOutcome, TerrainGenerator, World,
    WorldLoader,
};
