//! Cube faces and per-block face bitsets

use serde::{Deserialize, Serialize};

/// One of the six faces of a block. The discriminant doubles as the bit index
/// in [`FaceVisibility`] and the row of the mesh vertex template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Face {
    /// -x
    Front = 0,
    /// -z
    Left = 1,
    /// +z
    Right = 2,
    /// +y
    Top = 3,
    /// -y
    Bottom = 4,
    /// +x
    Back = 5,
}

impl Face {
    pub const ALL: [Face; 6] = [
        Face::Front,
        Face::Left,
        Face::Right,
        Face::Top,
        Face::Bottom,
        Face::Back,
    ];

    /// Faces that border another chunk
    pub const HORIZONTAL: [Face; 4] = [Face::Front, Face::Left, Face::Right, Face::Back];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn opposite(self) -> Face {
        match self {
            Face::Front => Face::Back,
            Face::Back => Face::Front,
            Face::Left => Face::Right,
            Face::Right => Face::Left,
            Face::Top => Face::Bottom,
            Face::Bottom => Face::Top,
        }
    }

    /// Unit step towards the neighbouring cell
    pub fn offset(self) -> [i32; 3] {
        match self {
            Face::Front => [-1, 0, 0],
            Face::Left => [0, 0, -1],
            Face::Right => [0, 0, 1],
            Face::Top => [0, 1, 0],
            Face::Bottom => [0, -1, 0],
            Face::Back => [1, 0, 0],
        }
    }

    pub fn is_horizontal(self) -> bool {
        !matches!(self, Face::Top | Face::Bottom)
    }

    /// Position in [`Face::HORIZONTAL`]
    pub fn horizontal_index(self) -> Option<usize> {
        match self {
            Face::Front => Some(0),
            Face::Left => Some(1),
            Face::Right => Some(2),
            Face::Back => Some(3),
            Face::Top | Face::Bottom => None,
        }
    }
}

/// Corner of each face template vertex relative to the block centre, in
/// units of the block radius. Rows follow [`Face`] order; each row is two
/// triangles sharing vertices 0/5 and 2/3.
pub const FACE_VERTEX_CORNERS: [[[i8; 3]; 6]; 6] = [
    // front
    [[-1, -1, -1], [-1, -1, 1], [-1, 1, 1], [-1, 1, 1], [-1, 1, -1], [-1, -1, -1]],
    // left
    [[1, -1, -1], [-1, -1, -1], [-1, 1, -1], [-1, 1, -1], [1, 1, -1], [1, -1, -1]],
    // right
    [[-1, -1, 1], [1, -1, 1], [1, 1, 1], [1, 1, 1], [-1, 1, 1], [-1, -1, 1]],
    // top
    [[-1, 1, -1], [-1, 1, 1], [1, 1, 1], [1, 1, 1], [1, 1, -1], [-1, 1, -1]],
    // bottom
    [[1, -1, -1], [1, -1, 1], [-1, -1, 1], [-1, -1, 1], [-1, -1, -1], [1, -1, -1]],
    // back
    [[1, 1, -1], [1, 1, 1], [1, -1, 1], [1, -1, 1], [1, -1, -1], [1, 1, -1]],
];

/// 6-bit mask of visible faces
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct FaceVisibility(u8);

impl FaceVisibility {
    pub const NONE: FaceVisibility = FaceVisibility(0);
    pub const ALL: FaceVisibility = FaceVisibility(0b11_1111);

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_visible(self, face: Face) -> bool {
        self.0 & (1 << face.index()) != 0
    }

    pub fn set(&mut self, face: Face, visible: bool) {
        if visible {
            self.0 |= 1 << face.index();
        } else {
            self.0 &= !(1 << face.index());
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn visible_faces(self) -> impl Iterator<Item = Face> {
        Face::ALL.into_iter().filter(move |face| self.is_visible(*face))
    }
}

impl std::fmt::Debug for FaceVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FaceVisibility({:06b})", self.0)
    }
}

/// Set of horizontal sides, used to record which chunk edges were merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SideSet(u8);

impl SideSet {
    pub fn contains(self, side: Face) -> bool {
        side.horizontal_index()
            .map_or(false, |index| self.0 & (1 << index) != 0)
    }

    /// Returns false if the side was already present
    pub fn insert(&mut self, side: Face) -> bool {
        match side.horizontal_index() {
            Some(index) => {
                let had = self.0 & (1 << index) != 0;
                self.0 |= 1 << index;
                !had
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn is_complete(self) -> bool {
        self.0 == 0b1111
    }
}
