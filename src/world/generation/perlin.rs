use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{GenerationResult, TerrainGenerator};
use crate::constants::core::{CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};
use crate::world::core::{BlockType, ChunkId};
use crate::world::storage::Terrain;

const OCTAVES: usize = 5;
const HEIGHT_BIAS: f64 = 0.7;
const FILL_TYPES: [BlockType; 3] = [BlockType::Grass, BlockType::Stone, BlockType::DarkStone];

/// Perlin heightmap terrain
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    scale: f64,
}

impl NoiseGenerator {
    pub fn new(scale: f64) -> Self {
        Self {
            scale: if scale > 0.0 { scale } else { 1.0 },
        }
    }

    /// Column surface height in blocks, in `1..CHUNK_HEIGHT`
    pub fn surface_height(&self, noise: &Perlin, seed: i32, world_x: i64, world_z: i64) -> usize {
        let mut amplitude = 1.0;
        let mut frequency = 1.0 / self.scale;
        let mut total = 0.0;
        let mut weight = 0.0;
        for _ in 0..OCTAVES {
            total += noise.get([
                world_x as f64 * frequency,
                seed as f64 + 0.5,
                world_z as f64 * frequency,
            ]) * amplitude;
            weight += amplitude;
            amplitude *= 0.5;
            frequency *= 2.0;
        }

        let n = total / weight + HEIGHT_BIAS;
        (n * CHUNK_HEIGHT as f64).clamp(1.0, (CHUNK_HEIGHT - 1) as f64) as usize
    }
}

impl TerrainGenerator for NoiseGenerator {
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        let noise = Perlin::new(seed as u32);
        let mut rng = StdRng::seed_from_u64(chunk.raw() ^ (seed as u32 as u64).rotate_left(17));

        let origin = chunk.block_origin();
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_DEPTH {
                let world_x = origin.x as i64 + x as i64;
                let world_z = origin.z as i64 + z as i64;
                let top = self.surface_height(&noise, seed, world_x, world_z);
                for y in 1..=top {
                    let block_type = FILL_TYPES[rng.gen_range(0..FILL_TYPES.len())];
                    terrain.set_block_type([x, y, z], block_type);
                }
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "noise"
    }
}
