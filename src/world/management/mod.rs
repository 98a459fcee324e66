//! Chunk lifecycle management
//!
//! [`World`] decides which chunks should exist around the observer and
//! [`WorldLoader`] moves each of them through [`ChunkState`].

pub mod centre;
pub mod double_buffered;
pub mod loader;
pub mod registry;
pub mod spiral;
pub mod state;
pub mod stats;
pub mod world;

pub use centre::{Observer, WorldCentre};
pub use double_buffered::{
    DoubleBuffered, EntryCollection, FinalizeEntry, FinalizeQueue, GarbageQueue, UncacheQueue,
    UnloadEntry, UnloadQueue,
};
pub use loader::{RequestOutcome, WorldLoader};
pub use registry::ChunkRegistry;
pub use spiral::SpiralIterator;
pub use state::ChunkState;
pub use stats::{LoaderStats, LoaderStatsSnapshot};
pub use world::World;
