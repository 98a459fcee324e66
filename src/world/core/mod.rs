//! Core world types: coordinates, faces, blocks and the dense grid

pub mod ambient_occlusion;
pub mod block;
pub mod face;
pub mod grid;
pub mod position;

pub use ambient_occlusion::{AmbientOcclusion, AO_CURVE};
pub use block::{rgba, Block, BlockType};
pub use face::{Face, FaceVisibility, SideSet};
pub use grid::{Grid, Grid2, Grid3};
pub use position::{BlockPos, ChunkId};
