//! Per-vertex ambient occlusion packed into 48 bits
//!
//! Each face has four distinct corners; each corner stores a 2-bit level
//! where 3 is unoccluded and 0 is fully occluded.

use super::face::Face;

/// Brightness applied to each occlusion level
pub const AO_CURVE: [f32; 4] = [0.0, 0.6, 0.8, 1.0];

pub const AO_LEVEL_UNOCCLUDED: u8 = 3;

/// Distinct corners per face
pub const AO_VERTEX_SLOTS: usize = 4;

const AO_BIT_COUNT: u32 = 2 * AO_VERTEX_SLOTS as u32 * 6;
const AO_ALL: u64 = (1 << AO_BIT_COUNT) - 1;

/// Mesh vertices 0 and 5, and 2 and 3, share a corner in the face template
pub fn slot_for_vertex(vertex: usize) -> usize {
    match vertex {
        0 | 5 => 0,
        1 => 1,
        2 | 3 => 2,
        4 => 3,
        _ => {
            debug_assert!(false, "face has 6 vertices, got {}", vertex);
            0
        }
    }
}

/// Mesh vertex whose position stands for a corner slot
pub fn vertex_for_slot(slot: usize) -> usize {
    [0, 1, 2, 4][slot]
}

/// Occlusion level from the two edge-adjacent samples and the diagonal
pub fn vertex_level(side1: bool, side2: bool, corner: bool) -> u8 {
    if side1 && side2 {
        0
    } else {
        AO_LEVEL_UNOCCLUDED - (side1 as u8 + side2 as u8 + corner as u8)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct AmbientOcclusion([u8; 6]);

impl Default for AmbientOcclusion {
    fn default() -> Self {
        Self::FULLY_LIT
    }
}

impl AmbientOcclusion {
    pub const FULLY_LIT: AmbientOcclusion = AmbientOcclusion([0xff; 6]);

    fn bits(self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..6].copy_from_slice(&self.0);
        u64::from_le_bytes(bytes)
    }

    fn from_bits(bits: u64) -> Self {
        let bytes = (bits & AO_ALL).to_le_bytes();
        let mut packed = [0u8; 6];
        packed.copy_from_slice(&bytes[..6]);
        Self(packed)
    }

    fn shift(face: Face, slot: usize) -> u32 {
        (face.index() * AO_VERTEX_SLOTS * 2 + slot * 2) as u32
    }

    pub fn level(self, face: Face, slot: usize) -> u8 {
        ((self.bits() >> Self::shift(face, slot)) & 0b11) as u8
    }

    pub fn set_level(&mut self, face: Face, slot: usize, level: u8) {
        let shift = Self::shift(face, slot);
        let bits = (self.bits() & !(0b11 << shift)) | (((level & 0b11) as u64) << shift);
        *self = Self::from_bits(bits);
    }

    /// Mark every corner of `face` unoccluded
    pub fn light_face(&mut self, face: Face) {
        for slot in 0..AO_VERTEX_SLOTS {
            self.set_level(face, slot, AO_LEVEL_UNOCCLUDED);
        }
    }

    pub fn is_fully_lit(self) -> bool {
        self.bits() == AO_ALL
    }

    /// Brightness for one of the six mesh vertices of `face`
    pub fn brightness(self, face: Face, vertex: usize) -> f32 {
        AO_CURVE[self.level(face, slot_for_vertex(vertex)) as usize]
    }
}

impl std::fmt::Debug for AmbientOcclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AmbientOcclusion({:012x})", self.bits())
    }
}
