//! Renderable chunk list shared between the tick thread and the render thread

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::chunk_renderer::{ChunkRenderer, GpuHandles, MeshView};
use crate::world::core::ChunkId;
use crate::world::management::ChunkState;
use crate::world::storage::{ChunkArena, SlotId};

pub struct RenderShared {
    arena: Arc<ChunkArena>,
    /// Set for the duration of [`RenderShared::render`]
    rendering: AtomicBool,
    snapshot: Mutex<Vec<(ChunkId, SlotId)>>,
    dirty: AtomicBool,
    /// Chunks left undrawn for a frame because their lock was busy
    busy_skips: AtomicU64,
    /// Buffers of freed or replaced meshes, released on the render thread
    gpu_garbage: Mutex<Vec<GpuHandles>>,
}

impl RenderShared {
    pub fn new(arena: Arc<ChunkArena>) -> Self {
        Self {
            arena,
            rendering: AtomicBool::new(false),
            snapshot: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
            busy_skips: AtomicU64::new(0),
            gpu_garbage: Mutex::new(Vec::new()),
        }
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering.load(Ordering::Acquire)
    }

    /// The set of renderable chunks changed
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn replace_snapshot(&self, chunks: Vec<(ChunkId, SlotId)>) {
        *self.snapshot.lock() = chunks;
    }

    pub fn snapshot_len(&self) -> usize {
        self.snapshot.lock().len()
    }

    pub(crate) fn discard(&self, handles: GpuHandles) {
        self.gpu_garbage.lock().push(handles);
    }

    pub fn busy_skips(&self) -> u64 {
        self.busy_skips.load(Ordering::Relaxed)
    }

    pub fn pending_garbage(&self) -> usize {
        self.gpu_garbage.lock().len()
    }

    /// Upload dirty meshes and draw every renderable chunk, then release
    /// buffers of meshes retired since the last frame. Returns the number of
    /// chunks drawn.
    pub fn render(&self, renderer: &mut dyn ChunkRenderer) -> usize {
        self.rendering.store(true, Ordering::SeqCst);
        let chunks = self.snapshot.lock().clone();

        let mut drawn = 0;
        for (id, slot_id) in chunks {
            let slot = self.arena.slot(slot_id);
            if !slot.try_retain(id) {
                continue;
            }
            if slot.state() != ChunkState::Renderable {
                slot.release();
                continue;
            }
            // a worker rebuilding this mesh holds the lock; draw it next frame
            let Some(mut chunk) = slot.try_write() else {
                self.busy_skips.fetch_add(1, Ordering::Relaxed);
                slot.release();
                continue;
            };
            let world_offset = chunk.world_offset();
            if let Some(mesh) = chunk.mesh_mut().filter(|m| m.vertex_count() > 0) {
                if mesh.is_dirty() || mesh.gpu_handles().is_none() {
                    let view = MeshView {
                        chunk: id,
                        words: mesh.as_words(),
                        vertex_count: mesh.vertex_count(),
                        world_offset,
                    };
                    let handles = renderer.upload(mesh.gpu_handles(), view);
                    mesh.mark_uploaded(handles);
                }
                if let Some(handles) = mesh.gpu_handles() {
                    renderer.draw(
                        handles,
                        MeshView {
                            chunk: id,
                            words: mesh.as_words(),
                            vertex_count: mesh.vertex_count(),
                            world_offset,
                        },
                    );
                    drawn += 1;
                }
            }
            drop(chunk);
            slot.release();
        }

        self.rendering.store(false, Ordering::SeqCst);

        let garbage = std::mem::take(&mut *self.gpu_garbage.lock());
        for handles in garbage {
            renderer.release(handles);
        }
        drawn
    }
}
