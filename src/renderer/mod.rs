//! Rendering hand-off
//!
//! The engine produces meshes; drawing them is up to a [`ChunkRenderer`]
//! backend driven through [`RenderShared::render`].

pub mod chunk_renderer;
pub mod render_list;

pub use chunk_renderer::{ChunkRenderer, GpuHandles, HeadlessRenderer, MeshView};
pub use render_list::RenderShared;
