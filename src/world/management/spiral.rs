use crate::world::core::ChunkId;

/// Chunk ids in an outward square spiral around a centre, nearest rings
/// first. The first `(2r + 1)^2` ids cover exactly the square of radius `r`.
#[derive(Debug, Clone)]
pub struct SpiralIterator {
    centre: ChunkId,
    remaining: usize,
    layer: i32,
    leg: u8,
    dx: i32,
    dz: i32,
}

impl SpiralIterator {
    pub fn new(centre: ChunkId, count: usize) -> Self {
        Self {
            centre,
            remaining: count,
            layer: 1,
            leg: 0,
            dx: 0,
            dz: 0,
        }
    }

    fn advance(&mut self) {
        match self.leg {
            0 => {
                self.dx += 1;
                if self.dx == self.layer {
                    self.leg = 1;
                }
            }
            1 => {
                self.dz += 1;
                if self.dz == self.layer {
                    self.leg = 2;
                }
            }
            2 => {
                self.dx -= 1;
                if -self.dx == self.layer {
                    self.leg = 3;
                }
            }
            _ => {
                self.dz -= 1;
                if -self.dz == self.layer {
                    self.leg = 0;
                    self.layer += 1;
                }
            }
        }
    }
}

impl Iterator for SpiralIterator {
    type Item = ChunkId;

    fn next(&mut self) -> Option<ChunkId> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let id = ChunkId::new(
            self.centre.x().wrapping_sub(self.dx),
            self.centre.z().wrapping_sub(self.dz),
        );
        self.advance();
        Some(id)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for SpiralIterator {}
