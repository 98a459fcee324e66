//! Block storage for one chunk with face visibility and ambient occlusion
//!
//! Visibility is first computed in isolation: faces that look into a
//! neighbouring chunk are provisionally visible and fully lit. Once a
//! neighbour has generated, [`Terrain::merge_faces`] corrects that edge using
//! the neighbour's boundary opacity plane and records the side as merged.

use crate::constants::core::{CHUNK_DEPTH, CHUNK_HEIGHT, CHUNK_WIDTH};
use crate::world::core::ambient_occlusion::{vertex_for_slot, vertex_level, AO_VERTEX_SLOTS};
use crate::world::core::face::FACE_VERTEX_CORNERS;
use crate::world::core::{
    AmbientOcclusion, Block, BlockType, Face, FaceVisibility, Grid2, Grid3, SideSet,
};

pub type BlockGrid = Grid3<Block>;

/// Opacity of one boundary layer, indexed `[along, y]` where `along` is z for
/// the front/back sides and x for the left/right sides
pub type OpacityPlane = Grid2<bool>;

/// Result of [`Terrain::merge_faces`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The side was merged before; nothing was touched
    AlreadyMerged,
    /// Merged without changing any block
    Unchanged,
    /// Merged, and some edge block changed visibility or occlusion
    Changed,
}

impl MergeOutcome {
    pub fn merged(self) -> bool {
        self != MergeOutcome::AlreadyMerged
    }

    pub fn changed(self) -> bool {
        self == MergeOutcome::Changed
    }
}

pub struct Terrain {
    blocks: BlockGrid,
    neighbour_opacity: [OpacityPlane; 4],
    merged: SideSet,
    /// Edges still carry visibility from a previous set of neighbours
    stale_edges: bool,
}

impl std::fmt::Debug for Terrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terrain")
            .field("merged", &self.merged)
            .field("stale_edges", &self.stale_edges)
            .finish_non_exhaustive()
    }
}

impl Default for Terrain {
    fn default() -> Self {
        Self::new()
    }
}

fn edge_length(side: Face) -> usize {
    match side {
        Face::Front | Face::Back => CHUNK_DEPTH,
        _ => CHUNK_WIDTH,
    }
}

/// Block on the `side` boundary layer at `(along, y)`
fn edge_coord(side: Face, along: usize, y: usize) -> [usize; 3] {
    match side {
        Face::Front => [0, y, along],
        Face::Back => [CHUNK_WIDTH - 1, y, along],
        Face::Left => [along, y, 0],
        Face::Right => [along, y, CHUNK_DEPTH - 1],
        Face::Top | Face::Bottom => unreachable!("vertical faces have no chunk neighbour"),
    }
}

fn side_plane(side: Face) -> usize {
    side.horizontal_index().unwrap_or(0)
}

impl Terrain {
    pub fn new() -> Self {
        let plane = |side| OpacityPlane::new([edge_length(side), CHUNK_HEIGHT], false);
        Self {
            blocks: BlockGrid::new([CHUNK_WIDTH, CHUNK_HEIGHT, CHUNK_DEPTH], Block::default()),
            neighbour_opacity: Face::HORIZONTAL.map(plane),
            merged: SideSet::default(),
            stale_edges: false,
        }
    }

    /// Back to all air with nothing merged
    pub fn reset(&mut self) {
        self.blocks.fill(Block::default());
        for plane in &mut self.neighbour_opacity {
            plane.fill(false);
        }
        self.merged.clear();
        self.stale_edges = false;
    }

    pub fn blocks(&self) -> &BlockGrid {
        &self.blocks
    }

    pub fn block(&self, coord: [usize; 3]) -> &Block {
        &self.blocks[coord]
    }

    pub fn set_block_type(&mut self, coord: [usize; 3], block_type: BlockType) {
        self.blocks[coord].block_type = block_type;
    }

    /// Raw opacity of a local cell; anything outside the chunk reads as clear
    pub fn is_opaque(&self, x: i32, y: i32, z: i32) -> bool {
        self.sample_opacity([x, y, z], None)
    }

    fn sample_opacity(&self, pos: [i32; 3], across: Option<(Face, &OpacityPlane)>) -> bool {
        let [x, y, z] = pos;
        if y < 0 || y >= CHUNK_HEIGHT as i32 {
            return false;
        }
        let x_out = x < 0 || x >= CHUNK_WIDTH as i32;
        let z_out = z < 0 || z >= CHUNK_DEPTH as i32;
        match (x_out, z_out) {
            (false, false) => self.blocks[[x as usize, y as usize, z as usize]].is_opaque(),
            (true, true) => false,
            _ => {
                let crossed = if x < 0 {
                    Face::Front
                } else if x_out {
                    Face::Back
                } else if z < 0 {
                    Face::Left
                } else {
                    Face::Right
                };
                match across {
                    Some((side, plane)) if side == crossed => {
                        let along = if x_out { z } else { x };
                        plane[[along as usize, y as usize]]
                    }
                    _ => false,
                }
            }
        }
    }

    /// Visibility and occlusion of one block. Cells across `across` are read
    /// from the neighbour's plane; any other cell outside the chunk is clear.
    fn classify(
        &self,
        coord: [usize; 3],
        across: Option<(Face, &OpacityPlane)>,
    ) -> (FaceVisibility, AmbientOcclusion) {
        if !self.blocks[coord].is_opaque() {
            return (FaceVisibility::ALL, AmbientOcclusion::FULLY_LIT);
        }

        let pos = coord.map(|c| c as i32);
        let mut visibility = FaceVisibility::NONE;
        let mut ao = AmbientOcclusion::FULLY_LIT;

        for face in Face::ALL {
            let [dx, dy, dz] = face.offset();
            let neighbour = [pos[0] + dx, pos[1] + dy, pos[2] + dz];

            if neighbour[1] < 0 || neighbour[1] >= CHUNK_HEIGHT as i32 {
                visibility.set(face, true);
                continue;
            }

            let leaves_chunk = neighbour[0] < 0
                || neighbour[0] >= CHUNK_WIDTH as i32
                || neighbour[2] < 0
                || neighbour[2] >= CHUNK_DEPTH as i32;
            let resolved = !leaves_chunk || matches!(across, Some((side, _)) if side == face);

            if !resolved {
                // provisional until the side is merged
                visibility.set(face, true);
                continue;
            }

            let visible = !self.sample_opacity(neighbour, across);
            visibility.set(face, visible);
            if visible {
                self.occlude_face(pos, face, across, &mut ao);
            }
        }

        (visibility, ao)
    }

    fn occlude_face(
        &self,
        pos: [i32; 3],
        face: Face,
        across: Option<(Face, &OpacityPlane)>,
        ao: &mut AmbientOcclusion,
    ) {
        let normal = face.offset();
        let base = [pos[0] + normal[0], pos[1] + normal[1], pos[2] + normal[2]];
        let mut axes = (0..3).filter(|axis| normal[*axis] == 0);
        let (a, b) = match (axes.next(), axes.next()) {
            (Some(a), Some(b)) => (a, b),
            _ => return,
        };

        for slot in 0..AO_VERTEX_SLOTS {
            let corner = FACE_VERTEX_CORNERS[face.index()][vertex_for_slot(slot)];
            let mut side1 = base;
            side1[a] += corner[a] as i32;
            let mut side2 = base;
            side2[b] += corner[b] as i32;
            let mut diagonal = side1;
            diagonal[b] += corner[b] as i32;

            let level = vertex_level(
                self.sample_opacity(side1, across),
                self.sample_opacity(side2, across),
                self.sample_opacity(diagonal, across),
            );
            ao.set_level(face, slot, level);
        }
    }

    /// Compute visibility and occlusion for every block in isolation
    pub fn update_face_visibility(&mut self) {
        for index in 0..self.blocks.len() {
            let coord = self.blocks.unflatten(index);
            let (visibility, ao) = self.classify(coord, None);
            let block = &mut self.blocks.as_mut_slice()[index];
            block.visibility = visibility;
            block.ao = ao;
        }
        self.stale_edges = false;
    }

    /// Snapshot the opacity of each boundary layer for neighbours to merge against
    pub fn populate_neighbour_opacity(&mut self) {
        for side in Face::HORIZONTAL {
            let plane = &mut self.neighbour_opacity[side_plane(side)];
            for along in 0..edge_length(side) {
                for y in 0..CHUNK_HEIGHT {
                    plane[[along, y]] = self.blocks[edge_coord(side, along, y)].is_opaque();
                }
            }
        }
    }

    /// Opacity of the boundary layer on `side`
    pub fn opacity_plane(&self, side: Face) -> &OpacityPlane {
        &self.neighbour_opacity[side_plane(side)]
    }

    pub fn has_merged_faces(&self, side: Face) -> bool {
        self.merged.contains(side)
    }

    pub fn merged_sides(&self) -> SideSet {
        self.merged
    }

    /// Correct the `side` edge against the neighbour's opposite opacity plane.
    ///
    /// Leaves everything untouched if the side was already merged. The two
    /// corner columns of the edge only receive the visibility bit: their
    /// occlusion keeps the single-chunk estimate.
    pub fn merge_faces(&mut self, side: Face, neighbour_plane: &OpacityPlane) -> MergeOutcome {
        if !side.is_horizontal() || self.merged.contains(side) {
            return MergeOutcome::AlreadyMerged;
        }
        let length = edge_length(side);
        debug_assert_eq!(neighbour_plane.dims(), [length, CHUNK_HEIGHT]);

        let mut changed = false;
        for along in 0..length {
            for y in 0..CHUNK_HEIGHT {
                let coord = edge_coord(side, along, y);
                if !self.blocks[coord].is_opaque() {
                    continue;
                }

                let before = self.blocks[coord];
                if along == 0 || along == length - 1 {
                    let visible = !neighbour_plane[[along, y]];
                    self.blocks[coord].visibility.set(side, visible);
                } else {
                    let (visibility, ao) = self.classify(coord, Some((side, neighbour_plane)));
                    let block = &mut self.blocks[coord];
                    block.visibility = visibility;
                    block.ao = ao;
                }
                changed |= self.blocks[coord] != before;
            }
        }

        self.merged.insert(side);
        if changed {
            MergeOutcome::Changed
        } else {
            MergeOutcome::Unchanged
        }
    }

    /// Forget every merge; used when a chunk is parked in the cache
    pub fn reset_merged_sides(&mut self) {
        if !self.merged.is_empty() {
            self.stale_edges = true;
        }
        self.merged.clear();
    }

    /// Restore the provisional edge state after [`Terrain::reset_merged_sides`].
    /// Returns whether there was anything to restore.
    pub fn restore_provisional_edges(&mut self) -> bool {
        if !self.stale_edges {
            return false;
        }
        for side in Face::HORIZONTAL {
            for along in 0..edge_length(side) {
                for y in 0..CHUNK_HEIGHT {
                    let coord = edge_coord(side, along, y);
                    let (visibility, ao) = self.classify(coord, None);
                    let block = &mut self.blocks[coord];
                    block.visibility = visibility;
                    block.ao = ao;
                }
            }
        }
        self.stale_edges = false;
        true
    }

    /// Opaque blocks on the `side` edge whose face towards the neighbour is visible
    pub fn visible_edge_faces(&self, side: Face) -> usize {
        if !side.is_horizontal() {
            return 0;
        }
        let mut count = 0;
        for along in 0..edge_length(side) {
            for y in 0..CHUNK_HEIGHT {
                let block = &self.blocks[edge_coord(side, along, y)];
                if block.is_opaque() && block.visibility.is_visible(side) {
                    count += 1;
                }
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::core::AO_CURVE;

    fn solid_floor(height: usize) -> Terrain {
        let mut terrain = Terrain::new();
        for x in 0..CHUNK_WIDTH {
            for z in 0..CHUNK_DEPTH {
                for y in 0..height {
                    terrain.set_block_type([x, y, z], BlockType::Stone);
                }
            }
        }
        terrain.update_face_visibility();
        terrain.populate_neighbour_opacity();
        terrain
    }

    #[test]
    fn test_transparent_blocks_are_fully_visible_and_lit() {
        let terrain = solid_floor(3);
        for (coord, block) in terrain.blocks().iter_coords() {
            if !block.is_opaque() {
                assert_eq!(block.visibility, FaceVisibility::ALL, "{:?}", coord);
                assert!(block.ao.is_fully_lit(), "{:?}", coord);
            }
        }
    }

    #[test]
    fn test_interior_faces_are_hidden() {
        let terrain = solid_floor(3);
        let middle = terrain.block([5, 1, 5]);
        assert!(middle.visibility.is_empty());

        let top = terrain.block([5, 2, 5]);
        assert_eq!(top.visibility.visible_faces().collect::<Vec<_>>(), vec![Face::Top]);

        // bottom of the world is open
        assert!(terrain.block([5, 0, 5]).visibility.is_visible(Face::Bottom));
    }

    #[test]
    fn test_chunk_edges_are_provisionally_visible() {
        let terrain = solid_floor(3);
        assert!(terrain.block([0, 1, 5]).visibility.is_visible(Face::Front));
        assert!(terrain.block([CHUNK_WIDTH - 1, 1, 5]).visibility.is_visible(Face::Back));
        assert!(terrain.block([5, 1, 0]).visibility.is_visible(Face::Left));
        assert!(terrain.block([5, 1, CHUNK_DEPTH - 1]).visibility.is_visible(Face::Right));
        assert_eq!(terrain.visible_edge_faces(Face::Back), CHUNK_DEPTH * 3);
        assert!(terrain.merged_sides().is_empty());
    }

    #[test]
    fn test_ambient_occlusion_next_to_wall() {
        let mut terrain = Terrain::new();
        terrain.set_block_type([5, 0, 5], BlockType::Stone);
        terrain.set_block_type([6, 1, 5], BlockType::Stone);
        terrain.update_face_visibility();

        let block = terrain.block([5, 0, 5]);
        assert!(block.visibility.is_visible(Face::Top));
        // corners of the top face on the +x side touch the wall
        let mut darkened = 0;
        for vertex in 0..6 {
            if block.ao.brightness(Face::Top, vertex) < AO_CURVE[3] {
                darkened += 1;
            }
        }
        // two distinct corners, vertices 2/3 alias one of them
        assert!(darkened >= 2, "expected occluded top corners, got {}", darkened);
        assert_eq!(block.ao.brightness(Face::Top, 0), AO_CURVE[3]);
    }

    #[test]
    fn test_merge_against_solid_neighbour_hides_edge() {
        let mut a = solid_floor(3);
        let b = solid_floor(3);

        assert_eq!(
            a.merge_faces(Face::Back, b.opacity_plane(Face::Front)),
            MergeOutcome::Changed
        );
        assert!(a.has_merged_faces(Face::Back));
        assert_eq!(a.visible_edge_faces(Face::Back), 0);
        // other edges untouched
        assert_eq!(a.visible_edge_faces(Face::Front), CHUNK_DEPTH * 3);
    }

    #[test]
    fn test_merge_against_air_keeps_edge_visible() {
        let mut a = solid_floor(3);
        let b = Terrain::new();

        // open air on the other side leaves the provisional edge as it was
        assert_eq!(
            a.merge_faces(Face::Right, b.opacity_plane(Face::Left)),
            MergeOutcome::Unchanged
        );
        assert!(a.has_merged_faces(Face::Right));
        assert_eq!(a.visible_edge_faces(Face::Right), CHUNK_WIDTH * 3);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut a = solid_floor(2);
        let mut b = solid_floor(4);
        b.set_block_type([0, 3, 4], BlockType::Air);
        b.populate_neighbour_opacity();

        assert!(a.merge_faces(Face::Back, b.opacity_plane(Face::Front)).merged());
        let snapshot: Vec<Block> = a.blocks().as_slice().to_vec();

        assert_eq!(
            a.merge_faces(Face::Back, b.opacity_plane(Face::Front)),
            MergeOutcome::AlreadyMerged
        );
        assert_eq!(a.blocks().as_slice(), snapshot.as_slice());
    }

    #[test]
    fn test_merge_reaches_into_neighbour_for_occlusion() {
        let mut a = solid_floor(2);
        let mut b = solid_floor(2);
        // a step up on the neighbour's side of the boundary
        for z in 0..CHUNK_DEPTH {
            b.set_block_type([0, 2, z], BlockType::Stone);
        }
        b.update_face_visibility();
        b.populate_neighbour_opacity();

        let before = a.block([CHUNK_WIDTH - 1, 1, 5]).ao;
        assert!(before.is_fully_lit());

        a.merge_faces(Face::Back, b.opacity_plane(Face::Front));
        let after = a.block([CHUNK_WIDTH - 1, 1, 5]).ao;
        assert!(!after.is_fully_lit());
        assert!(!a.block([CHUNK_WIDTH - 1, 1, 5]).visibility.is_visible(Face::Back));
    }

    #[test]
    fn test_merge_leaves_corner_column_occlusion_alone() {
        let mut a = solid_floor(2);
        let mut b = solid_floor(2);
        for z in 0..CHUNK_DEPTH {
            b.set_block_type([0, 2, z], BlockType::Stone);
        }
        b.update_face_visibility();
        b.populate_neighbour_opacity();

        a.merge_faces(Face::Back, b.opacity_plane(Face::Front));
        for z in [0, CHUNK_DEPTH - 1] {
            let corner = a.block([CHUNK_WIDTH - 1, 1, z]);
            assert!(!corner.visibility.is_visible(Face::Back));
            assert!(corner.ao.is_fully_lit(), "corner z {}", z);
        }
    }

    #[test]
    fn test_reset_merged_sides_restores_provisional_edges() {
        let mut a = solid_floor(3);
        let b = solid_floor(3);
        a.merge_faces(Face::Back, b.opacity_plane(Face::Front));
        assert_eq!(a.visible_edge_faces(Face::Back), 0);

        a.reset_merged_sides();
        assert!(!a.has_merged_faces(Face::Back));
        assert!(a.restore_provisional_edges());
        assert!(!a.restore_provisional_edges());
        assert_eq!(a.visible_edge_faces(Face::Back), CHUNK_DEPTH * 3);
    }
}
