use serde::{Deserialize, Serialize};

use super::ambient_occlusion::AmbientOcclusion;
use super::face::FaceVisibility;

/// Pack an RGBA colour with red in the lowest byte
pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((g as u32) << 8) | r as u32
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BlockType {
    #[default]
    Air = 0,
    Grass = 1,
    Stone = 2,
    DarkStone = 3,
    Snow = 4,
    Sand = 5,
    Marker = 6,
}

impl BlockType {
    pub const ALL: [BlockType; 7] = [
        BlockType::Air,
        BlockType::Grass,
        BlockType::Stone,
        BlockType::DarkStone,
        BlockType::Snow,
        BlockType::Sand,
        BlockType::Marker,
    ];

    /// Decode a generator block code
    pub fn from_code(code: i32) -> Option<BlockType> {
        usize::try_from(code)
            .ok()
            .and_then(|index| Self::ALL.get(index).copied())
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn colour(self) -> u32 {
        match self {
            BlockType::Air => rgba(255, 255, 255, 255),
            BlockType::Grass => rgba(113, 170, 52, 255),
            BlockType::Stone => rgba(125, 112, 113, 255),
            BlockType::DarkStone => rgba(90, 83, 83, 255),
            BlockType::Snow => rgba(240, 240, 250, 255),
            BlockType::Sand => rgba(219, 209, 160, 255),
            BlockType::Marker => rgba(230, 72, 46, 255),
        }
    }

    pub fn is_opaque(self) -> bool {
        self != BlockType::Air
    }
}

/// One voxel: type, visible faces and corner occlusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Block {
    pub block_type: BlockType,
    pub visibility: FaceVisibility,
    pub ao: AmbientOcclusion,
}

impl Block {
    pub fn new(block_type: BlockType) -> Self {
        Self {
            block_type,
            ..Self::default()
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.block_type.is_opaque()
    }
}
