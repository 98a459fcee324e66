use std::sync::Arc;

use cgmath::Point3;
use rustc_hash::FxHashSet;

use super::centre::{Observer, WorldCentre};
use super::loader::WorldLoader;
use super::spiral::SpiralIterator;
use super::state::ChunkState;
use crate::config::{radius_chunk_count, WorldConfig};
use crate::error::{EngineError, EngineResult};
use crate::renderer::ChunkRenderer;
use crate::world::core::ChunkId;
use crate::world::generation::TerrainGenerator;

/// Keeps the chunks around an observer loaded.
///
/// Each tick the observer's chunk is recomputed. When it changes, or the
/// area around it has not finished loading, the load square is walked in a
/// spiral requesting anything missing, and renderable chunks outside the
/// square are unloaded into the cache.
pub struct World {
    loader: WorldLoader,
    centre: WorldCentre,
    spawn: Point3<f32>,
    load_radius: u32,
    in_range: FxHashSet<ChunkId>,
    scan_order: Vec<ChunkId>,
    settled: bool,
    /// Everything is being unloaded; nothing is requested until the registry empties
    purging: bool,
}

impl World {
    pub fn new(config: WorldConfig) -> EngineResult<Self> {
        Self::from_loader(WorldLoader::new(config)?)
    }

    pub fn with_generator(
        config: WorldConfig,
        generator: Arc<dyn TerrainGenerator>,
    ) -> EngineResult<Self> {
        Self::from_loader(WorldLoader::with_generator(config, generator)?)
    }

    fn from_loader(loader: WorldLoader) -> EngineResult<Self> {
        let load_radius = loader.config().terrain.load_radius.max(1);
        Ok(Self {
            loader,
            centre: WorldCentre::default(),
            spawn: Point3::new(0.0, 0.0, 0.0),
            load_radius,
            in_range: FxHashSet::default(),
            scan_order: Vec::new(),
            settled: false,
            purging: false,
        })
    }

    pub fn set_spawn(&mut self, spawn: Point3<f32>) {
        self.spawn = spawn;
    }

    /// Move `observer` to the spawn point and keep the loaded area around it
    pub fn register_observer(&mut self, observer: Arc<dyn Observer>) {
        observer.teleport(self.spawn);
        self.centre.follow(observer);
        self.centre.reset();
    }

    /// Stop following the observer; the loaded area stays where it is
    pub fn stop_chunk_loading(&mut self) {
        self.centre.stop_following();
    }

    pub fn tick(&mut self) {
        self.centre.tick();
        let (centre, moved) = self.centre.chunk();

        if self.purging {
            self.loader.unload_all_chunks();
            if self.loader.chunk_states().is_empty() {
                log::info!("[World::tick] All chunks cleared, reloading around {}", centre);
                self.purging = false;
                self.settled = false;
            }
        } else if moved || !self.settled {
            if let Err(e) = self.update_active_chunks(centre) {
                log::debug!("[World::tick] Load area incomplete: {}", e);
            }
        }

        self.loader.tick(centre);
    }

    /// Request missing chunks around `centre` and unload those out of range
    fn update_active_chunks(&mut self, centre: ChunkId) -> EngineResult<()> {
        self.in_range.clear();
        self.scan_order.clear();
        for id in SpiralIterator::new(centre, radius_chunk_count(self.load_radius)) {
            self.in_range.insert(id);
            self.scan_order.push(id);
        }

        let mut settled = true;

        // free slots before claiming new ones
        for (id, state) in self.loader.chunk_states() {
            if self.in_range.contains(&id) {
                continue;
            }
            match state {
                ChunkState::Renderable => {
                    self.loader.unload_chunk(id, true);
                }
                ChunkState::LoadingTerrain | ChunkState::LoadedTerrain => settled = false,
                _ => {}
            }
        }

        let mut result = Ok(());
        for &id in &self.scan_order {
            match self.loader.state_of(id) {
                ChunkState::Renderable => {}
                ChunkState::Unloaded | ChunkState::Cached => {
                    settled = false;
                    if result.is_err() {
                        continue;
                    }
                    if let Err(e) = self.loader.request_chunk(id) {
                        // later ids are retried next tick
                        result = Err(e);
                    }
                }
                ChunkState::LoadingTerrain | ChunkState::LoadedTerrain | ChunkState::Unloading => {
                    settled = false
                }
            }
        }

        self.settled = settled;
        result
    }

    /// Change the load radius by `delta` chunks, never below 1
    pub fn tweak_loaded_chunk_radius(&mut self, delta: i32) {
        let requested = (self.load_radius as i64 + delta as i64).max(1);
        let limit = self.loader.max_load_radius() as i64;
        if requested > limit {
            log::warn!(
                "[World::tweak_loaded_chunk_radius] Radius {} exceeds what the chunk pool holds ({}), clamping",
                requested,
                limit
            );
        }
        let radius = requested.min(limit).max(1) as u32;
        if radius != self.load_radius {
            log::info!(
                "[World::tweak_loaded_chunk_radius] {} loaded chunk radius to {}",
                if radius > self.load_radius { "Bumped" } else { "Reduced" },
                radius
            );
        }
        self.load_radius = radius;
        self.settled = false;
        self.centre.reset();
    }

    /// Unload everything and reload it from a freshly reloaded generator
    pub fn clear_all_chunks(&mut self) {
        log::info!("[World::clear_all_chunks] Clearing all chunks");
        self.loader.unload_all_chunks();
        self.loader.generator().mark_dirty();
        self.in_range.clear();
        self.purging = true;
        self.centre.reset();
    }

    /// Draw every renderable chunk. Returns the number drawn.
    pub fn render(&self, renderer: &mut dyn ChunkRenderer) -> usize {
        self.loader.render_shared().render(renderer)
    }

    /// All chunks of the load area are renderable
    pub fn is_settled(&self) -> bool {
        self.settled && !self.purging
    }

    pub fn is_purging(&self) -> bool {
        self.purging
    }

    pub fn load_radius(&self) -> u32 {
        self.load_radius
    }

    pub fn in_range(&self, id: ChunkId) -> bool {
        self.in_range.contains(&id)
    }

    pub fn centre(&self) -> &WorldCentre {
        &self.centre
    }

    pub fn loader(&self) -> &WorldLoader {
        &self.loader
    }

    pub fn loader_mut(&mut self) -> &mut WorldLoader {
        &mut self.loader
    }

    /// Tick until the load area is settled and the pipeline idle, or
    /// `timeout` passes
    pub fn run_until_settled(&mut self, timeout: std::time::Duration) -> EngineResult<()> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let was_idle = self.loader.is_quiescent();
            self.tick();
            if was_idle && self.is_settled() && self.loader.is_quiescent() {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(EngineError::ThreadPool(format!(
                    "world did not settle within {:?}",
                    timeout
                )));
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }
}
