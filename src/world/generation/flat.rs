use super::{GenerationResult, TerrainGenerator};
use crate::constants::core::{CHUNK_DEPTH, CHUNK_WIDTH};
use crate::world::core::{BlockType, ChunkId};
use crate::world::storage::Terrain;

pub const FLAT_GROUND_DEPTH: usize = 3;

/// Three layers of ground: grass around the chunk rim, stone inside.
/// Handy for checking chunk seams.
#[derive(Debug, Default, Clone, Copy)]
pub struct FlatGenerator;

impl TerrainGenerator for FlatGenerator {
    fn generate(&self, _chunk: ChunkId, _seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_DEPTH {
                let rim = x == 0 || x == CHUNK_WIDTH - 1 || z == 0 || z == CHUNK_DEPTH - 1;
                let block_type = if rim { BlockType::Grass } else { BlockType::Stone };
                for y in 0..FLAT_GROUND_DEPTH {
                    terrain.set_block_type([x, y, z], block_type);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "flat"
    }
}
