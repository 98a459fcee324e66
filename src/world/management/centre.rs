use std::sync::Arc;

use cgmath::Point3;

use crate::world::core::{BlockPos, ChunkId};

/// Something whose position the loaded area follows, usually the camera
pub trait Observer: Send + Sync {
    fn current_position(&self) -> Point3<f32>;

    /// Move to the spawn point when first registered
    fn teleport(&self, _position: Point3<f32>) {}
}

/// Tracks the chunk the observer stands in
pub struct WorldCentre {
    observer: Option<Arc<dyn Observer>>,
    position: Point3<f32>,
    last: Option<ChunkId>,
}

impl Default for WorldCentre {
    fn default() -> Self {
        Self {
            observer: None,
            position: Point3::new(0.0, 0.0, 0.0),
            last: None,
        }
    }
}

impl std::fmt::Debug for WorldCentre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldCentre")
            .field("following", &self.observer.is_some())
            .field("position", &self.position)
            .field("last", &self.last)
            .finish()
    }
}

impl WorldCentre {
    pub fn follow(&mut self, observer: Arc<dyn Observer>) {
        self.observer = Some(observer);
    }

    /// Freeze the centre where it is
    pub fn stop_following(&mut self) {
        self.observer = None;
    }

    pub fn is_following(&self) -> bool {
        self.observer.is_some()
    }

    /// Sample the observer's position
    pub fn tick(&mut self) {
        if let Some(observer) = &self.observer {
            self.position = observer.current_position();
        }
    }

    /// Chunk containing the centre, and whether it moved since the last call
    pub fn chunk(&mut self) -> (ChunkId, bool) {
        let current = BlockPos::from_world_pos(self.position).chunk();
        let changed = self.last != Some(current);
        self.last = Some(current);
        (current, changed)
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    /// Make the next [`WorldCentre::chunk`] report a change
    pub fn reset(&mut self) {
        self.last = None;
    }
}
