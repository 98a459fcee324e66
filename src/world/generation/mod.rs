//! Terrain generator backends
//!
//! Every backend fills a chunk's [`Terrain`] with block types; visibility and
//! occlusion are computed afterwards by the loader. Generators are shared
//! across worker threads and must be safe to call concurrently.

pub mod flat;
#[cfg(feature = "native")]
pub mod native;
pub mod perlin;
pub mod socket;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::GeneratorConfig;
use crate::world::core::ChunkId;
use crate::world::storage::Terrain;

pub use flat::FlatGenerator;
#[cfg(feature = "native")]
pub use native::NativeGenerator;
pub use perlin::NoiseGenerator;
pub use socket::{GeneratorAddress, SocketGenerator};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generator i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("generator protocol violation: {0}")]
    Protocol(String),

    #[error("unknown block code {code} at cell {index}")]
    UnknownBlockCode { code: i32, index: usize },

    #[error("failed to load generator library {path}: {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("generator returned error code {code}")]
    Native { code: i32 },

    #[error("generator backend unavailable: {0}")]
    Unsupported(String),

    #[error("generator panicked: {0}")]
    Panicked(String),
}

pub type GenerationResult<T> = Result<T, GenerationError>;

/// Source of block data for new chunks
pub trait TerrainGenerator: Send + Sync {
    /// Fill `terrain` (already reset to air) with the blocks of `chunk`
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()>;

    fn name(&self) -> &str;

    /// Drop any loaded state so the next call reloads it
    fn mark_dirty(&self) {}
}

/// Build the backend selected in configuration
pub fn create_generator(config: &GeneratorConfig) -> GenerationResult<Arc<dyn TerrainGenerator>> {
    let generator: Arc<dyn TerrainGenerator> = match config {
        GeneratorConfig::Flat => Arc::new(FlatGenerator),
        GeneratorConfig::Noise { scale } => Arc::new(NoiseGenerator::new(*scale)),
        GeneratorConfig::Socket { address } => {
            Arc::new(SocketGenerator::new(address.parse::<GeneratorAddress>()?))
        }
        #[cfg(feature = "native")]
        GeneratorConfig::Native { library } => Arc::new(NativeGenerator::new(library.clone())),
        #[cfg(not(feature = "native"))]
        GeneratorConfig::Native { library } => {
            return Err(GenerationError::Unsupported(format!(
                "{} requires the `native` feature",
                library.display()
            )))
        }
    };
    log::info!("[generation] Using {} terrain generator", generator.name());
    Ok(generator)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_from_config() {
        let flat = create_generator(&GeneratorConfig::Flat).unwrap();
        assert_eq!(flat.name(), "flat");

        let noise = create_generator(&GeneratorConfig::Noise { scale: 10.0 }).unwrap();
        assert_eq!(noise.name(), "noise");

        let socket = create_generator(&GeneratorConfig::Socket {
            address: "tcp:127.0.0.1:1".to_string(),
        })
        .unwrap();
        assert_eq!(socket.name(), "socket");

        assert!(create_generator(&GeneratorConfig::Socket {
            address: "carrier-pigeon:coop".to_string(),
        })
        .is_err());
    }
}
