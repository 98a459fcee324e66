// Voxels Constants - SINGLE SOURCE OF TRUTH
//
// Chunk geometry, meshing layout and pipeline defaults.
// Chunk dimensions are powers of two so block-to-chunk mapping is a shift.

/// Chunk geometry
pub mod core {
    /// Chunk dimensions as bit shifts
    pub const CHUNK_WIDTH_SHIFT: u32 = 4;
    pub const CHUNK_HEIGHT_SHIFT: u32 = 6;
    pub const CHUNK_DEPTH_SHIFT: u32 = 4;

    pub const CHUNK_WIDTH: usize = 1 << CHUNK_WIDTH_SHIFT;
    pub const CHUNK_HEIGHT: usize = 1 << CHUNK_HEIGHT_SHIFT;
    pub const CHUNK_DEPTH: usize = 1 << CHUNK_DEPTH_SHIFT;
    pub const BLOCKS_PER_CHUNK: usize = CHUNK_WIDTH * CHUNK_HEIGHT * CHUNK_DEPTH;

    /// Blocks per world unit along each axis
    pub const BLOCK_SCALE: f32 = 2.0;
    /// Half the edge length of a block in world units
    pub const BLOCK_RADIUS: f32 = 0.25;
}

/// Mesh layout
pub mod mesh {
    use super::core::BLOCKS_PER_CHUNK;

    pub const FACE_COUNT: usize = 6;
    pub const VERTICES_PER_FACE: usize = 6;
    /// x, y, z, colour, ambient occlusion
    pub const WORDS_PER_VERTEX: usize = 5;

    /// Upper bound on vertices a single chunk can emit
    pub const MAX_CHUNK_VERTICES: usize = BLOCKS_PER_CHUNK * FACE_COUNT * VERTICES_PER_FACE;
    pub const MAX_CHUNK_WORDS: usize = MAX_CHUNK_VERTICES * WORDS_PER_VERTEX;
}

/// Pipeline defaults
pub mod loader {
    pub const DEFAULT_LOAD_RADIUS: u32 = 5;
    pub const DEFAULT_CACHE_CAPACITY: usize = 128;
    pub const DEFAULT_CACHE_FLUSH_DISTANCE: u32 = 12;
    pub const FALLBACK_THREAD_COUNT: usize = 2;

    /// A finalization that keeps waiting on neighbours is reported every this many retries
    pub const STALE_RETRY_REPORT_INTERVAL: u32 = 256;

    /// Wire version of the generator socket protocol
    pub const GENERATOR_PROTOCOL_VERSION: i32 = 1;
}
