//! Chunk loading pipeline
//!
//! [`WorldLoader`] lives on the tick thread. It owns the chunk and mesh pools
//! and performs every allocation, free and cache decision. Terrain generation
//! and finalization (neighbour merge plus meshing) run on the worker pool and
//! report back through double-buffered queues drained at the start of each
//! tick.
//!
//! Every queued entry and every running task holds a reference on its chunk
//! slot. A slot is only returned to the pool after it has been retired with
//! no references outstanding; otherwise the free is retried on a later tick.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHashSet};

use super::double_buffered::{
    FinalizeEntry, FinalizeQueue, GarbageQueue, UncacheQueue, UnloadEntry, UnloadQueue,
};
use super::registry::ChunkRegistry;
use super::state::ChunkState;
use super::stats::{LoaderStats, LoaderStatsSnapshot};
use crate::config::{radius_chunk_count, WorldConfig};
use crate::constants::loader::STALE_RETRY_REPORT_INTERVAL;
use crate::error::{pool_exhausted, EngineError, EngineResult};
use crate::renderer::RenderShared;
use crate::thread_pool::{TaskKind, WorkerPool, WorkerPoolConfig};
use crate::world::core::{ChunkId, Face, SideSet};
use crate::world::generation::{
    create_generator, GenerationError, GenerationResult, TerrainGenerator,
};
use crate::world::storage::{
    Chunk, ChunkArena, ChunkMesh, ChunkPool, ChunkSlot, MeshPool, OpacityPlane, PoolStats, SlotId,
};

/// What [`WorldLoader::request_chunk`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Terrain generation was scheduled
    Requested,
    /// Revived from the cache without regenerating
    Reused,
    /// Already in the pipeline
    Ignored(ChunkState),
}

#[derive(Default)]
struct WorkQueues {
    finalize: FinalizeQueue,
    unload: UnloadQueue,
    uncache: UncacheQueue,
    mesh_garbage: GarbageQueue<ChunkMesh>,
}

impl WorkQueues {
    fn pending(&self) -> usize {
        self.finalize.pending()
            + self.unload.pending()
            + self.uncache.pending()
            + self.mesh_garbage.pending()
    }
}

/// A reference a task holds on a chunk. Released when dropped, so panics
/// and early returns give it back too.
struct HeldRef<'a> {
    shared: &'a PipelineShared,
    id: ChunkId,
    slot: &'a ChunkSlot,
}

impl<'a> HeldRef<'a> {
    /// Adopt a reference the caller already took on `slot`
    fn adopt(shared: &'a PipelineShared, id: ChunkId, slot: &'a ChunkSlot) -> Self {
        Self { shared, id, slot }
    }

    /// The reference now belongs to a queued entry
    fn hand_over(self) {
        std::mem::forget(self);
    }
}

impl Drop for HeldRef<'_> {
    fn drop(&mut self) {
        self.shared.release(self.id, self.slot);
    }
}

/// Neighbour held for the duration of a merge
struct PinnedNeighbour<'a> {
    side: Face,
    held: HeldRef<'a>,
    /// Copy of the neighbour's boundary layer facing us
    plane: OpacityPlane,
    /// Neighbour is drawn and has not merged against us yet
    propagate: bool,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// State reachable from worker tasks
struct PipelineShared {
    registry: ChunkRegistry,
    queues: WorkQueues,
    generator: Arc<dyn TerrainGenerator>,
    seed: i32,
    stats: LoaderStats,
    render: Arc<RenderShared>,
}

impl PipelineShared {
    fn arena(&self) -> &ChunkArena {
        self.registry.arena()
    }

    /// Move a chunk along a lifecycle edge, recording it
    fn transition(&self, id: ChunkId, slot: &ChunkSlot, from: ChunkState, to: ChunkState) -> bool {
        if !from.can_transition_to(to) {
            LoaderStats::bump(&self.stats.illegal_transitions);
            log::error!(
                "[WorldLoader] Refusing transition of chunk {} from {} to {}",
                id,
                from,
                to
            );
            return false;
        }
        match slot.compare_state(from, to) {
            Ok(()) => {
                self.stats.record_transition(from, to);
                log::trace!("[WorldLoader] Chunk {}: {} -> {}", id, from, to);
                true
            }
            Err(actual) => {
                log::debug!(
                    "[WorldLoader] Chunk {} is {} rather than {}, not moving to {}",
                    id,
                    actual,
                    from,
                    to
                );
                false
            }
        }
    }

    fn release(&self, id: ChunkId, slot: &ChunkSlot) {
        if !slot.release() {
            LoaderStats::bump(&self.stats.ref_violations);
            log::error!(
                "[WorldLoader] Chunk {} released more often than it was retained",
                id
            );
        }
    }

    /// Release a reference held on a chunk known only by id
    fn release_by_id(&self, id: ChunkId) {
        match self.registry.slot_of(id) {
            Some(slot_id) => self.release(id, self.arena().slot(slot_id)),
            None => {
                LoaderStats::bump(&self.stats.ref_violations);
                log::error!(
                    "[WorldLoader] Chunk {} left the registry while still referenced",
                    id
                );
            }
        }
    }

    fn enqueue_finalize(&self, id: ChunkId, slot: &ChunkSlot, merely_update: bool, retries: u32) {
        slot.retain();
        let entry = FinalizeEntry {
            id,
            merely_update,
            retries,
        };
        if !self.queues.finalize.add(entry) {
            self.release(id, slot);
        }
    }

    fn enqueue_unload(&self, id: ChunkId, slot: &ChunkSlot, allow_cache: bool, generation_failed: bool) {
        slot.retain();
        let entry = UnloadEntry {
            id,
            allow_cache,
            generation_failed,
        };
        if !self.queues.unload.add(entry) {
            self.release(id, slot);
        }
    }

    fn discard_mesh(&self, mesh: ChunkMesh) {
        self.queues.mesh_garbage.add(mesh);
    }

    fn report_stale(&self, id: ChunkId, slot: SlotId, task: &str) {
        LoaderStats::bump(&self.stats.stale_accesses);
        log::error!(
            "[WorldLoader::{}] {:?} no longer holds chunk {} despite a held reference",
            task,
            slot,
            id
        );
    }

    /// Worker: fill the chunk's terrain and compute its isolated visibility
    fn generate(&self, id: ChunkId, slot_id: SlotId) {
        let slot = self.arena().slot(slot_id);
        let _held = HeldRef::adopt(self, id, slot);

        let result = {
            let mut chunk = slot.write();
            if !chunk.is_live(id) {
                drop(chunk);
                self.report_stale(id, slot_id, "generate");
                return;
            }

            chunk.terrain.reset();
            let terrain = &mut chunk.terrain;
            let result = panic::catch_unwind(AssertUnwindSafe(|| -> GenerationResult<()> {
                self.generator.generate(id, self.seed, terrain)?;
                terrain.update_face_visibility();
                terrain.populate_neighbour_opacity();
                Ok(())
            }))
            .unwrap_or_else(|payload| {
                LoaderStats::bump(&self.stats.task_panics);
                Err(GenerationError::Panicked(panic_message(payload.as_ref())))
            });
            result
        };

        match result {
            Ok(()) => {
                if self.transition(id, slot, ChunkState::LoadingTerrain, ChunkState::LoadedTerrain) {
                    LoaderStats::bump(&self.stats.generated);
                    self.enqueue_finalize(id, slot, false, 0);
                }
            }
            Err(e) => {
                LoaderStats::bump(&self.stats.generation_failures);
                log::warn!(
                    "[WorldLoader::generate] {} failed to generate chunk {} (seed {}): {}",
                    self.generator.name(),
                    id,
                    self.seed,
                    e
                );
                self.enqueue_unload(id, slot, false, true);
            }
        }
    }

    /// Pin every mergeable neighbour on a side not yet merged. Returns true
    /// if some neighbour is still generating.
    fn pin_neighbours<'a>(
        &'a self,
        id: ChunkId,
        merged: SideSet,
        pinned: &mut Vec<PinnedNeighbour<'a>>,
    ) -> bool {
        let mut waiting = false;

        for (side, neighbour) in id.neighbours() {
            if merged.contains(side) {
                continue;
            }
            let (Some(neighbour_slot_id), state) = self.registry.entry(neighbour) else {
                continue;
            };
            if state == ChunkState::LoadingTerrain {
                waiting = true;
                continue;
            }
            if !state.is_mergeable() {
                continue;
            }

            let neighbour_slot = self.arena().slot(neighbour_slot_id);
            if !neighbour_slot.try_retain(neighbour) {
                continue;
            }
            let held = HeldRef::adopt(self, neighbour, neighbour_slot);
            let copied = {
                let chunk = neighbour_slot.read();
                chunk.is_live(neighbour).then(|| {
                    (
                        chunk.terrain.opacity_plane(side.opposite()).clone(),
                        neighbour_slot.state() == ChunkState::Renderable
                            && !chunk.terrain.has_merged_faces(side.opposite()),
                    )
                })
            };
            if let Some((plane, propagate)) = copied {
                pinned.push(PinnedNeighbour {
                    side,
                    held,
                    plane,
                    propagate,
                });
            }
        }

        waiting
    }

    /// Worker: merge against ready neighbours, then mesh unless some
    /// neighbour is still generating
    fn finalize(&self, entry: FinalizeEntry, slot_id: SlotId, spare: Option<ChunkMesh>) {
        let id = entry.id;
        let slot = self.arena().slot(slot_id);
        let held = HeldRef::adopt(self, id, slot);
        let mut spare = spare;

        let merged_before = {
            let chunk = slot.read();
            chunk.is_live(id).then(|| chunk.terrain.merged_sides())
        };
        let Some(merged_before) = merged_before else {
            self.report_stale(id, slot_id, "finalize");
            if let Some(spare) = spare {
                self.discard_mesh(spare);
            }
            return;
        };

        let mut pinned = Vec::with_capacity(Face::HORIZONTAL.len());
        let waiting = self.pin_neighbours(id, merged_before, &mut pinned);

        let mut merged_now = SideSet::default();
        let mut replaced = None;
        let mut meshed = false;
        let mut abandoned = false;
        {
            let mut chunk = slot.write();
            let state = slot.state();
            if !chunk.is_live(id) || !state.is_finalizable() {
                if !chunk.is_live(id) {
                    self.report_stale(id, slot_id, "finalize");
                } else {
                    log::debug!(
                        "[WorldLoader::finalize] Chunk {} became {} before finalizing",
                        id,
                        state
                    );
                }
                abandoned = true;
            } else {
                let chunk = &mut *chunk;
                let built = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut changed = chunk.terrain.restore_provisional_edges();
                    for pin in &pinned {
                        let outcome = chunk.terrain.merge_faces(pin.side, &pin.plane);
                        if outcome.merged() {
                            merged_now.insert(pin.side);
                        }
                        changed |= outcome.changed();
                    }

                    // an update that corrected nothing keeps the current mesh
                    let remesh = !waiting && (state != ChunkState::Renderable || changed);
                    if remesh {
                        match spare.as_mut() {
                            Some(mesh) => {
                                mesh.populate(&chunk.terrain);
                            }
                            None => {
                                chunk.populate_mesh();
                            }
                        }
                    }
                    remesh
                }));

                match built {
                    Ok(remesh) => {
                        meshed = remesh;
                        if remesh {
                            if let Some(mesh) = spare.take() {
                                replaced = chunk.swap_mesh(mesh);
                            }
                        }
                    }
                    Err(payload) => {
                        LoaderStats::bump(&self.stats.task_panics);
                        log::error!(
                            "[WorldLoader::finalize] Finalizing chunk {} panicked, keeping it {}: {}",
                            id,
                            state,
                            panic_message(payload.as_ref())
                        );
                        abandoned = true;
                    }
                }
            }
        }

        for pin in pinned {
            if !abandoned && pin.propagate && merged_now.contains(pin.side) {
                self.enqueue_finalize(pin.held.id, pin.held.slot, true, 0);
            }
        }
        if let Some(mesh) = spare {
            self.discard_mesh(mesh);
        }
        if let Some(mesh) = replaced {
            self.discard_mesh(mesh);
        }

        if abandoned {
            return;
        }

        if waiting {
            LoaderStats::bump(&self.stats.finalize_retries);
            let retries = entry.retries.saturating_add(1);
            if retries % STALE_RETRY_REPORT_INTERVAL == 0 {
                log::warn!(
                    "[WorldLoader::finalize] Chunk {} has waited on generating neighbours {} times",
                    id,
                    retries
                );
            }
            let requeued = FinalizeEntry { retries, ..entry };
            if self.queues.finalize.add(requeued) {
                held.hand_over();
            }
            return;
        }

        if !meshed {
            LoaderStats::bump(&self.stats.unchanged_updates);
            log::trace!("[WorldLoader::finalize] Update of chunk {} changed nothing", id);
            return;
        }

        LoaderStats::bump(&self.stats.finalized);
        if slot.state() == ChunkState::LoadedTerrain
            && self.transition(id, slot, ChunkState::LoadedTerrain, ChunkState::Renderable)
        {
            self.render.mark_dirty();
        }
    }
}

/// Owner of the chunk lifecycle; driven from a single thread via [`WorldLoader::tick`]
pub struct WorldLoader {
    config: WorldConfig,
    shared: Arc<PipelineShared>,
    workers: WorkerPool,
    chunk_pool: ChunkPool,
    mesh_pool: MeshPool,
    cache: FxHashMap<ChunkId, SlotId>,
    last_centre: Option<ChunkId>,
    flush_requested: bool,
    exhaustion_reported: bool,
    /// Unloads requested while a frame was being rendered
    deferred_unloads: Vec<UnloadEntry>,

    // drained back buffers, kept for their allocations
    uncache_batch: FxHashSet<ChunkId>,
    finalize_batch: FxHashSet<FinalizeEntry>,
    unload_batch: FxHashSet<UnloadEntry>,
    garbage_batch: Vec<ChunkMesh>,
}

impl WorldLoader {
    /// Build the loader with the generator named in `config`
    pub fn new(config: WorldConfig) -> EngineResult<Self> {
        let generator = create_generator(&config.terrain.generator)?;
        Self::with_generator(config, generator)
    }

    pub fn with_generator(
        config: WorldConfig,
        generator: Arc<dyn TerrainGenerator>,
    ) -> EngineResult<Self> {
        let workers = WorkerPool::new(WorkerPoolConfig {
            num_threads: config.thread_count(),
            ..Default::default()
        })?;
        let chunk_pool = ChunkPool::new(config.chunk_pool_capacity());
        let mesh_pool = MeshPool::new(config.mesh_pool_capacity());
        let arena = Arc::clone(chunk_pool.arena());

        log::info!(
            "[WorldLoader::new] {} chunk slots, {} meshes, {} generator, seed {}",
            chunk_pool.capacity(),
            mesh_pool.capacity(),
            generator.name(),
            config.seed
        );

        let shared = Arc::new(PipelineShared {
            registry: ChunkRegistry::new(Arc::clone(&arena)),
            queues: WorkQueues::default(),
            generator,
            seed: config.seed,
            stats: LoaderStats::default(),
            render: Arc::new(RenderShared::new(arena)),
        });

        Ok(Self {
            config,
            shared,
            workers,
            chunk_pool,
            mesh_pool,
            cache: FxHashMap::default(),
            last_centre: None,
            flush_requested: false,
            exhaustion_reported: false,
            deferred_unloads: Vec::new(),
            uncache_batch: FxHashSet::default(),
            finalize_batch: FxHashSet::default(),
            unload_batch: FxHashSet::default(),
            garbage_batch: Vec::new(),
        })
    }

    /// Start loading `id`, or revive it from the cache
    pub fn request_chunk(&mut self, id: ChunkId) -> EngineResult<RequestOutcome> {
        if let Some(&slot_id) = self.cache.get(&id) {
            let slot = self.shared.arena().slot(slot_id);
            slot.retain();
            if !self.shared.queues.uncache.add(id) {
                self.shared.release(id, slot);
            }
            log::debug!("[WorldLoader::request_chunk] Reusing cached chunk {}", id);
            return Ok(RequestOutcome::Reused);
        }

        let state = self.shared.registry.state(id);
        if state != ChunkState::Unloaded {
            log::debug!(
                "[WorldLoader::request_chunk] Ignoring request for chunk {} which is {}",
                id,
                state
            );
            return Ok(RequestOutcome::Ignored(state));
        }

        let Some(mesh) = self.mesh_pool.allocate() else {
            return Err(self.exhausted(id, "mesh"));
        };
        let slot_id = match self.chunk_pool.allocate(id, mesh) {
            Ok(slot_id) => slot_id,
            Err(mesh) => {
                self.mesh_pool.release(mesh);
                return Err(self.exhausted(id, "chunk"));
            }
        };
        self.exhaustion_reported = false;

        let slot = self.shared.arena().slot(slot_id);
        self.shared
            .transition(id, slot, ChunkState::Unloaded, ChunkState::LoadingTerrain);
        self.shared.registry.insert(id, slot_id);
        log::debug!("[WorldLoader::request_chunk] Allocated chunk {} in {:?}", id, slot_id);

        slot.retain();
        let shared = Arc::clone(&self.shared);
        self.workers
            .spawn(TaskKind::Generation, move || shared.generate(id, slot_id));
        Ok(RequestOutcome::Requested)
    }

    fn exhausted(&mut self, id: ChunkId, pool: &'static str) -> EngineError {
        LoaderStats::bump(&self.shared.stats.pool_exhaustions);
        if self.exhaustion_reported {
            log::debug!("[WorldLoader::request_chunk] {} pool still exhausted ({})", pool, id);
        } else {
            self.exhaustion_reported = true;
            log::error!(
                "[WorldLoader::request_chunk] {} pool exhausted, dropping request for chunk {}",
                pool,
                id
            );
        }
        pool_exhausted(pool)
    }

    /// Begin unloading a renderable chunk. Returns false if the chunk is in
    /// any other state.
    pub fn unload_chunk(&mut self, id: ChunkId, allow_cache: bool) -> bool {
        let (Some(slot_id), state) = self.shared.registry.entry(id) else {
            return false;
        };
        if state != ChunkState::Renderable {
            log::debug!(
                "[WorldLoader::unload_chunk] Chunk {} is {}, not unloading",
                id,
                state
            );
            return false;
        }

        let slot = self.shared.arena().slot(slot_id);
        if !self
            .shared
            .transition(id, slot, ChunkState::Renderable, ChunkState::Unloading)
        {
            return false;
        }
        self.shared.render.mark_dirty();

        slot.retain();
        let entry = UnloadEntry {
            id,
            allow_cache,
            generation_failed: false,
        };
        if self.shared.render.is_rendering() {
            self.deferred_unloads.push(entry);
        } else if !self.shared.queues.unload.add(entry) {
            self.shared.release(id, slot);
        }
        true
    }

    /// Unload every renderable chunk and evict the whole cache, without caching
    pub fn unload_all_chunks(&mut self) {
        let mut unloaded = 0;
        for (id, _, state) in self.shared.registry.snapshot() {
            if state == ChunkState::Renderable && self.unload_chunk(id, false) {
                unloaded += 1;
            }
        }
        let evicted = self.evict_cached(|_| true);
        if unloaded + evicted > 0 {
            log::info!(
                "[WorldLoader::unload_all_chunks] Unloading {} chunks, evicting {} cached",
                unloaded,
                evicted
            );
        }
    }

    /// Advance the pipeline by one step
    pub fn tick(&mut self, centre: ChunkId) {
        self.process_uncache();
        self.process_finalize();
        self.process_unload();
        self.flush_cache(centre);
        self.collect_mesh_garbage();
        self.refresh_render_list();
    }

    fn process_uncache(&mut self) {
        let mut batch = std::mem::take(&mut self.uncache_batch);
        self.shared.queues.uncache.swap(&mut batch);

        for id in batch.drain() {
            let Some(slot_id) = self.shared.registry.slot_of(id) else {
                self.shared.release_by_id(id);
                continue;
            };
            let slot = self.shared.arena().slot(slot_id);

            if self.cache.contains_key(&id)
                && self
                    .shared
                    .transition(id, slot, ChunkState::Cached, ChunkState::LoadedTerrain)
            {
                self.cache.remove(&id);
                LoaderStats::bump(&self.shared.stats.uncached);
                self.shared.enqueue_finalize(id, slot, true, 0);
            } else {
                log::debug!(
                    "[WorldLoader::tick] Chunk {} left the cache before it could be reused",
                    id
                );
            }
            self.shared.release(id, slot);
        }

        self.uncache_batch = batch;
    }

    fn process_finalize(&mut self) {
        let mut batch = std::mem::take(&mut self.finalize_batch);
        self.shared.queues.finalize.swap(&mut batch);

        for entry in batch.drain() {
            let Some(slot_id) = self.shared.registry.slot_of(entry.id) else {
                self.shared.release_by_id(entry.id);
                continue;
            };
            let slot = self.shared.arena().slot(slot_id);
            let state = slot.state();
            if !state.is_finalizable() {
                log::debug!(
                    "[WorldLoader::tick] Dropping finalization of chunk {} which is {}",
                    entry.id,
                    state
                );
                self.shared.release(entry.id, slot);
                continue;
            }

            let spare = if entry.merely_update {
                match self.mesh_pool.allocate() {
                    Some(mesh) => Some(mesh),
                    None => {
                        log::debug!(
                            "[WorldLoader::tick] No spare mesh for chunk {}, retrying",
                            entry.id
                        );
                        if !self.shared.queues.finalize.add(entry) {
                            self.shared.release(entry.id, slot);
                        }
                        continue;
                    }
                }
            } else {
                None
            };

            let shared = Arc::clone(&self.shared);
            self.workers.spawn(TaskKind::Finalization, move || {
                shared.finalize(entry, slot_id, spare)
            });
        }

        self.finalize_batch = batch;
    }

    fn process_unload(&mut self) {
        if !self.deferred_unloads.is_empty() && !self.shared.render.is_rendering() {
            for entry in std::mem::take(&mut self.deferred_unloads) {
                if !self.shared.queues.unload.add(entry) {
                    self.shared.release_by_id(entry.id);
                }
            }
        }

        let mut batch = std::mem::take(&mut self.unload_batch);
        self.shared.queues.unload.swap(&mut batch);
        for entry in batch.drain() {
            self.unload_one(entry);
        }
        self.unload_batch = batch;
    }

    fn unload_one(&mut self, entry: UnloadEntry) {
        let id = entry.id;
        let Some(slot_id) = self.shared.registry.slot_of(id) else {
            self.shared.release_by_id(id);
            return;
        };
        let arena = Arc::clone(self.chunk_pool.arena());
        let slot = arena.slot(slot_id);
        let state = slot.state();

        let valid = state == ChunkState::Unloading
            || (entry.generation_failed && state == ChunkState::LoadingTerrain);
        if !valid {
            log::warn!(
                "[WorldLoader::tick] Ignoring unload of chunk {} which is {}",
                id,
                state
            );
            self.shared.release(id, slot);
            return;
        }
        self.shared.release(id, slot);

        if entry.allow_cache && self.config.cache.enabled && state == ChunkState::Unloading {
            if self.cache.len() < self.config.cache.capacity {
                slot.write().terrain.reset_merged_sides();
                if self
                    .shared
                    .transition(id, slot, ChunkState::Unloading, ChunkState::Cached)
                {
                    self.cache.insert(id, slot_id);
                    LoaderStats::bump(&self.shared.stats.cached);
                    log::debug!("[WorldLoader::tick] Cached chunk {}", id);
                }
                return;
            }
            self.flush_requested = true;
        }

        self.free_chunk(id, slot_id, state, entry.generation_failed);
    }

    /// Return a chunk to the pools once nothing references it
    fn free_chunk(&mut self, id: ChunkId, slot_id: SlotId, state: ChunkState, generation_failed: bool) {
        let arena = Arc::clone(self.chunk_pool.arena());
        let slot = arena.slot(slot_id);

        if !slot.try_retire() {
            LoaderStats::bump(&self.shared.stats.deferred_frees);
            log::debug!(
                "[WorldLoader::tick] Chunk {} still has {} references, retrying free",
                id,
                slot.ref_count()
            );
            self.shared.enqueue_unload(id, slot, false, generation_failed);
            return;
        }

        self.shared.transition(id, slot, state, ChunkState::Unloaded);
        self.shared.registry.remove(id);
        self.cache.remove(&id);
        if let Some(mut mesh) = self.chunk_pool.release(slot_id) {
            if let Some(handles) = mesh.take_gpu_handles() {
                self.shared.render.discard(handles);
            }
            self.mesh_pool.release(mesh);
        }

        LoaderStats::bump(&self.shared.stats.freed);
        log::debug!("[WorldLoader::tick] Freed chunk {} from {:?}", id, slot_id);
    }

    /// Start freeing cached chunks matching `evict`
    fn evict_cached(&mut self, evict: impl Fn(ChunkId) -> bool) -> usize {
        let victims: Vec<(ChunkId, SlotId)> = self
            .cache
            .iter()
            .filter(|(id, _)| evict(**id))
            .map(|(id, slot)| (*id, *slot))
            .collect();

        let mut evicted = 0;
        for (id, slot_id) in victims {
            let slot = self.shared.arena().slot(slot_id);
            if self
                .shared
                .transition(id, slot, ChunkState::Cached, ChunkState::Unloading)
            {
                self.cache.remove(&id);
                LoaderStats::bump(&self.shared.stats.evicted);
                self.shared.enqueue_unload(id, slot, false, false);
                evicted += 1;
            }
        }
        evicted
    }

    fn flush_cache(&mut self, centre: ChunkId) {
        let moved = self.last_centre != Some(centre);
        self.last_centre = Some(centre);
        if !(moved || self.flush_requested) {
            return;
        }
        self.flush_requested = false;

        let limit = (self.config.cache.flush_distance as i64).pow(2);
        let evicted = self.evict_cached(|id| id.distance_squared_to(centre) > limit);
        if evicted > 0 {
            log::debug!(
                "[WorldLoader::tick] Evicted {} cached chunks further than {} from {}",
                evicted,
                self.config.cache.flush_distance,
                centre
            );
        }
    }

    fn collect_mesh_garbage(&mut self) {
        self.shared.queues.mesh_garbage.swap(&mut self.garbage_batch);
        for mut mesh in self.garbage_batch.drain(..) {
            if let Some(handles) = mesh.take_gpu_handles() {
                self.shared.render.discard(handles);
            }
            self.mesh_pool.release(mesh);
        }
    }

    fn refresh_render_list(&mut self) {
        if !self.shared.render.take_dirty() {
            return;
        }
        let renderable = self
            .shared
            .registry
            .snapshot()
            .into_iter()
            .filter(|(_, _, state)| *state == ChunkState::Renderable)
            .map(|(id, slot, _)| (id, slot))
            .collect();
        self.shared.render.replace_snapshot(renderable);
    }

    pub fn state_of(&self, id: ChunkId) -> ChunkState {
        self.shared.registry.state(id)
    }

    /// Every registered chunk with its state
    pub fn chunk_states(&self) -> Vec<(ChunkId, ChunkState)> {
        self.shared
            .registry
            .snapshot()
            .into_iter()
            .map(|(id, _, state)| (id, state))
            .collect()
    }

    /// Inspect a chunk's contents while holding a reference to it. Returns
    /// `None` while its terrain is still generating, since the generator
    /// holds the chunk for the whole call.
    pub fn with_chunk<R>(&self, id: ChunkId, f: impl FnOnce(&Chunk) -> R) -> Option<R> {
        let (Some(slot_id), state) = self.shared.registry.entry(id) else {
            return None;
        };
        if state == ChunkState::LoadingTerrain {
            return None;
        }
        let slot = self.shared.arena().slot(slot_id);
        if !slot.try_retain(id) {
            return None;
        }
        let result = {
            let chunk = slot.read();
            chunk.is_live(id).then(|| f(&chunk))
        };
        self.shared.release(id, slot);
        result
    }

    /// Chunks in the pipeline, excluding the cache
    pub fn loaded_chunk_count(&self) -> usize {
        self.shared.registry.len() - self.cache.len()
    }

    pub fn cached_chunk_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, id: ChunkId) -> bool {
        self.cache.contains_key(&id)
    }

    /// No task running and nothing queued
    pub fn is_quiescent(&self) -> bool {
        self.workers.active_tasks() == 0
            && self.shared.queues.pending() == 0
            && self.deferred_unloads.is_empty()
    }

    /// Tick until quiescent or until `timeout` passes. Returns whether the
    /// pipeline drained.
    pub fn run_until_idle(&mut self, centre: ChunkId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // a final tick after the workers go idle picks up their results
            let was_idle = self.is_quiescent();
            self.tick(centre);
            if was_idle && self.is_quiescent() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    pub fn stats(&self) -> LoaderStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.chunk_pool.stats()
    }

    /// Meshes handed out by the mesh pool
    pub fn meshes_in_use(&self) -> usize {
        self.mesh_pool.outstanding()
    }

    pub fn render_shared(&self) -> &Arc<RenderShared> {
        &self.shared.render
    }

    pub fn generator(&self) -> &Arc<dyn TerrainGenerator> {
        &self.shared.generator
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Largest load radius the chunk pool can hold alongside a full cache
    pub fn max_load_radius(&self) -> u32 {
        let cache = if self.config.cache.enabled {
            self.config.cache.capacity
        } else {
            0
        };
        let mut radius = 1;
        while radius_chunk_count(radius + 1) + cache <= self.chunk_pool.capacity() {
            radius += 1;
        }
        radius
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }
}
