//! End-to-end behaviour of the chunk pipeline through the public API

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cgmath::Point3;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use voxels::world::generation::{FlatGenerator, GenerationError, GenerationResult};
use voxels::world::storage::Terrain;
use voxels::{
    ChunkId, ChunkState, Face, GeneratorConfig, HeadlessRenderer, Observer, RequestOutcome,
    TerrainGenerator, World, WorldConfig, WorldLoader,
};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(20);

/// Flat terrain that counts how often it ran and was marked dirty
#[derive(Default)]
struct CountingGenerator {
    generated: AtomicUsize,
    dirtied: AtomicUsize,
}

impl CountingGenerator {
    fn generated(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }
}

impl TerrainGenerator for CountingGenerator {
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        FlatGenerator.generate(chunk, seed, terrain)
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn mark_dirty(&self) {
        self.dirtied.fetch_add(1, Ordering::SeqCst);
    }
}

struct Marker(Mutex<Point3<f32>>);

impl Marker {
    fn at(x: f32, z: f32) -> Arc<Self> {
        Arc::new(Self(Mutex::new(Point3::new(x, 0.0, z))))
    }

    fn move_to(&self, x: f32, z: f32) {
        *self.0.lock() = Point3::new(x, 0.0, z);
    }
}

impl Observer for Marker {
    fn current_position(&self) -> Point3<f32> {
        *self.0.lock()
    }
}

fn config(radius: u32, cache_capacity: usize) -> WorldConfig {
    let mut config = WorldConfig::default();
    config.terrain.generator = GeneratorConfig::Flat;
    config.terrain.threads = 3.0;
    config.terrain.load_radius = radius;
    config.cache.capacity = cache_capacity;
    config
}

/// World-space position in the middle of a chunk
fn chunk_centre(x: i32, z: i32) -> (f32, f32) {
    // 16 blocks per chunk, 2 blocks per world unit
    (x as f32 * 8.0 + 4.0, z as f32 * 8.0 + 4.0)
}

fn assert_pipeline_clean(loader: &WorldLoader) {
    let stats = loader.stats();
    assert_eq!(stats.ref_violations, 0, "reference count violations");
    assert_eq!(stats.stale_accesses, 0, "stale chunk accesses");
    assert_eq!(stats.illegal_transitions, 0, "illegal transitions");
    assert_eq!(stats.off_graph_transitions(), 0, "transitions off the lifecycle graph");

    // every slot in use belongs to a registered chunk and owns exactly one mesh
    let pools = loader.pool_stats();
    assert_eq!(
        pools.in_use,
        loader.loaded_chunk_count() + loader.cached_chunk_count()
    );
    assert_eq!(loader.meshes_in_use(), pools.in_use);
    assert_eq!(pools.double_frees, 0);
    assert_eq!(pools.stale_writes, 0);
}

#[test]
fn three_by_three_area_hides_faces_between_chunks() {
    let mut world = World::new(config(1, 8)).unwrap();
    world.register_observer(Marker::at(4.0, 4.0));
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();

    let centre = ChunkId::new(0, 0);
    for (_, id) in centre.neighbours() {
        assert_eq!(world.loader().state_of(id), ChunkState::Renderable);
    }

    // the centre is surrounded by solid ground on all four sides
    let hidden = world
        .loader()
        .with_chunk(centre, |chunk| {
            Face::HORIZONTAL
                .iter()
                .map(|&side| chunk.terrain.visible_edge_faces(side))
                .sum::<usize>()
        })
        .unwrap();
    assert_eq!(hidden, 0);

    let side_faces = world
        .loader()
        .with_chunk(centre, |chunk| {
            let mesh = chunk.mesh().unwrap();
            Face::HORIZONTAL
                .iter()
                .map(|&side| mesh.face_count(side))
                .sum::<usize>()
        })
        .unwrap();
    assert_eq!(side_faces, 0);

    // the outer edge of the area still faces unloaded chunks
    let outer = world
        .loader()
        .with_chunk(ChunkId::new(1, 0), |chunk| {
            (
                chunk.terrain.visible_edge_faces(Face::Back),
                chunk.terrain.visible_edge_faces(Face::Front),
            )
        })
        .unwrap();
    assert!(outer.0 > 0);
    assert_eq!(outer.1, 0);

    let mut renderer = HeadlessRenderer::new();
    assert_eq!(world.render(&mut renderer), 9);
    assert_eq!(renderer.uploads, 9);
    assert_eq!(renderer.live_handles(), 9);

    // nothing changed, so the next frame uploads nothing
    assert_eq!(world.render(&mut renderer), 9);
    assert_eq!(renderer.uploads, 9);

    assert_pipeline_clean(world.loader());
}

#[test]
fn cached_chunks_are_reused_without_regenerating() {
    let generator = Arc::new(CountingGenerator::default());
    let mut loader = WorldLoader::with_generator(config(1, 8), generator.clone()).unwrap();
    let id = ChunkId::new(5, -3);

    assert_eq!(loader.request_chunk(id).unwrap(), RequestOutcome::Requested);
    assert!(loader.run_until_idle(id, SETTLE_TIMEOUT));
    assert!(loader.unload_chunk(id, true));
    assert!(loader.run_until_idle(id, SETTLE_TIMEOUT));
    assert_eq!(loader.state_of(id), ChunkState::Cached);
    assert_eq!(loader.cached_chunk_count(), 1);
    assert_eq!(loader.loaded_chunk_count(), 0);

    assert_eq!(loader.request_chunk(id).unwrap(), RequestOutcome::Reused);
    assert!(loader.run_until_idle(id, SETTLE_TIMEOUT));
    assert_eq!(loader.state_of(id), ChunkState::Renderable);
    assert_eq!(generator.generated(), 1);

    let stats = loader.stats();
    assert_eq!(stats.cached, 1);
    assert_eq!(stats.uncached, 1);
    assert_eq!(
        stats.transition_count(ChunkState::Cached, ChunkState::LoadedTerrain),
        1
    );
    assert_pipeline_clean(&loader);
}

#[test]
fn disabled_cache_frees_unloaded_chunks() {
    let mut config = config(1, 8);
    config.cache.enabled = false;
    let mut loader = WorldLoader::new(config).unwrap();
    let id = ChunkId::new(0, 0);

    loader.request_chunk(id).unwrap();
    assert!(loader.run_until_idle(id, SETTLE_TIMEOUT));
    assert!(loader.unload_chunk(id, true));
    assert!(loader.run_until_idle(id, SETTLE_TIMEOUT));

    assert_eq!(loader.state_of(id), ChunkState::Unloaded);
    assert_eq!(loader.stats().freed, 1);
    assert_eq!(loader.pool_stats().in_use, 0);
}

#[test]
fn distant_cached_chunks_are_flushed() {
    let mut config = config(1, 8);
    config.cache.flush_distance = 2;
    let mut loader = WorldLoader::new(config).unwrap();
    let near = ChunkId::new(1, 0);
    let far = ChunkId::new(6, 0);

    for id in [near, far] {
        loader.request_chunk(id).unwrap();
    }
    let origin = ChunkId::new(0, 0);
    assert!(loader.run_until_idle(origin, SETTLE_TIMEOUT));
    for id in [near, far] {
        assert!(loader.unload_chunk(id, true));
    }
    // the centre has to move before the cache is flushed
    assert!(loader.run_until_idle(origin, SETTLE_TIMEOUT));
    assert_eq!(loader.cached_chunk_count(), 2);

    assert!(loader.run_until_idle(ChunkId::new(0, 1), SETTLE_TIMEOUT));
    assert!(loader.is_cached(near));
    assert!(!loader.is_cached(far));
    assert_eq!(loader.state_of(far), ChunkState::Unloaded);
    assert_eq!(loader.stats().evicted, 1);
    assert_pipeline_clean(&loader);
}

#[test]
fn walking_back_and_forth_keeps_references_balanced() {
    let mut world = World::new(config(2, 6)).unwrap();
    let marker = Marker::at(4.0, 4.0);
    world.register_observer(marker.clone());
    let mut renderer = HeadlessRenderer::new();

    // quick moves so work is constantly in flight when the centre changes
    for step in 0..400 {
        let x = (step / 20) % 6 - 3;
        let z = (step / 35) % 4 - 2;
        let (wx, wz) = chunk_centre(x, z);
        marker.move_to(wx, wz);
        world.tick();
        world.render(&mut renderer);
    }

    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    world.render(&mut renderer);

    assert_eq!(world.loader().loaded_chunk_count(), 25);
    assert_pipeline_clean(world.loader());
    assert_eq!(renderer.bad_releases, 0);
    // buffers of freed meshes were all handed back
    let drawn = world.loader().render_shared().snapshot_len();
    assert_eq!(renderer.live_handles(), drawn + cached_with_buffers(&world));
}

/// Cached chunks keep their uploaded buffers until freed
fn cached_with_buffers(world: &World) -> usize {
    world
        .loader()
        .chunk_states()
        .into_iter()
        .filter(|(_, state)| *state == ChunkState::Cached)
        .filter_map(|(id, _)| {
            world
                .loader()
                .with_chunk(id, |chunk| chunk.mesh().and_then(|m| m.gpu_handles()))
                .flatten()
        })
        .count()
}

#[test]
fn random_requests_and_unloads_stay_on_the_lifecycle_graph() {
    let mut loader = WorldLoader::new(config(1, 4)).unwrap();
    let capacity = loader.pool_stats().capacity as i32;
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let centre = ChunkId::new(0, 0);

    for _ in 0..600 {
        let id = ChunkId::new(rng.gen_range(-2..=2), rng.gen_range(-2..=2));
        match rng.gen_range(0..3) {
            0 => {
                // exhaustion is an expected outcome here
                let _ = loader.request_chunk(id);
            }
            1 => {
                loader.unload_chunk(id, rng.gen_bool(0.5));
            }
            _ => loader.tick(centre),
        }
    }
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));

    let stats = loader.stats();
    assert!(stats.generated > 0);
    assert!(loader.pool_stats().in_use as i32 <= capacity);
    for (id, state) in loader.chunk_states() {
        assert!(
            matches!(state, ChunkState::Renderable | ChunkState::Cached),
            "chunk {} left {} after draining",
            id,
            state
        );
    }
    assert_pipeline_clean(&loader);

    loader.unload_all_chunks();
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert!(loader.chunk_states().is_empty());
    assert_eq!(loader.meshes_in_use(), 0);
}

#[test]
fn clearing_reloads_every_chunk_from_a_dirty_generator() {
    let generator = Arc::new(CountingGenerator::default());
    let mut world = World::with_generator(config(1, 8), generator.clone()).unwrap();
    world.register_observer(Marker::at(4.0, 4.0));
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    assert_eq!(generator.generated(), 9);

    let mut renderer = HeadlessRenderer::new();
    world.render(&mut renderer);

    world.clear_all_chunks();
    assert!(world.is_purging());
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    world.render(&mut renderer);

    assert_eq!(generator.generated(), 18);
    assert_eq!(generator.dirtied.load(Ordering::SeqCst), 1);
    assert_eq!(world.loader().loaded_chunk_count(), 9);
    assert_eq!(world.loader().cached_chunk_count(), 0);
    assert_eq!(renderer.releases, 9);
    assert_eq!(renderer.live_handles(), 9);
    assert_pipeline_clean(world.loader());
}

#[test]
fn growing_the_radius_loads_the_next_ring() {
    let mut config = config(1, 0);
    config.pools.extra_chunks = 16;
    let mut world = World::new(config).unwrap();
    world.register_observer(Marker::at(4.0, 4.0));
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    assert_eq!(world.loader().loaded_chunk_count(), 9);

    world.tweak_loaded_chunk_radius(1);
    assert_eq!(world.load_radius(), 2);
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    assert_eq!(world.loader().loaded_chunk_count(), 25);

    world.tweak_loaded_chunk_radius(-1);
    world.run_until_settled(SETTLE_TIMEOUT).unwrap();
    assert_eq!(world.loader().loaded_chunk_count(), 9);
    assert_pipeline_clean(world.loader());
}

#[test]
fn generation_failures_leave_the_area_unsettled_but_consistent() {
    struct HoleyGenerator;

    impl TerrainGenerator for HoleyGenerator {
        fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
            if chunk == ChunkId::new(1, 1) {
                return Err(GenerationError::Protocol("no terrain here".into()));
            }
            FlatGenerator.generate(chunk, seed, terrain)
        }

        fn name(&self) -> &str {
            "holey"
        }
    }

    let mut world = World::with_generator(config(1, 8), Arc::new(HoleyGenerator)).unwrap();
    world.register_observer(Marker::at(4.0, 4.0));
    assert!(world.run_until_settled(Duration::from_millis(500)).is_err());

    let loader = world.loader();
    assert!(loader.stats().generation_failures >= 1);
    assert_eq!(loader.state_of(ChunkId::new(0, 0)), ChunkState::Renderable);
    assert_ne!(loader.state_of(ChunkId::new(1, 1)), ChunkState::Renderable);
    assert_eq!(loader.stats().ref_violations, 0);
    assert_eq!(loader.stats().off_graph_transitions(), 0);
}

/// Flat terrain, except that one chunk waits until released and another
/// can never be generated
struct StagedGenerator {
    held: ChunkId,
    released: AtomicBool,
    broken: ChunkId,
}

impl TerrainGenerator for StagedGenerator {
    fn generate(&self, chunk: ChunkId, seed: i32, terrain: &mut Terrain) -> GenerationResult<()> {
        if chunk == self.broken {
            return Err(GenerationError::Protocol("broken chunk".into()));
        }
        if chunk == self.held {
            while !self.released.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        FlatGenerator.generate(chunk, seed, terrain)
    }

    fn name(&self) -> &str {
        "staged"
    }
}

#[test]
fn every_lifecycle_edge_is_taken() {
    let centre = ChunkId::new(0, 0);
    let held = ChunkId::new(1, 0);
    let broken = ChunkId::new(5, 5);
    let generator = Arc::new(StagedGenerator {
        held,
        released: AtomicBool::new(false),
        broken,
    });
    let mut loader = WorldLoader::with_generator(config(1, 4), generator.clone()).unwrap();

    loader.request_chunk(centre).unwrap();
    loader.request_chunk(held).unwrap();

    // the centre cannot mesh while its neighbour is still generating
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while loader.stats().finalize_retries == 0 && Instant::now() < deadline {
        loader.tick(centre);
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(loader.stats().finalize_retries > 0);
    assert_eq!(loader.state_of(centre), ChunkState::LoadedTerrain);
    assert_eq!(loader.state_of(held), ChunkState::LoadingTerrain);

    generator.released.store(true, Ordering::SeqCst);
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert_eq!(loader.state_of(centre), ChunkState::Renderable);
    assert_eq!(loader.state_of(held), ChunkState::Renderable);

    // park in the cache and come back
    assert!(loader.unload_chunk(held, true));
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert!(loader.is_cached(held));
    assert_eq!(loader.request_chunk(held).unwrap(), RequestOutcome::Reused);
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert_eq!(loader.state_of(held), ChunkState::Renderable);

    loader.request_chunk(broken).unwrap();
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert_eq!(loader.state_of(broken), ChunkState::Unloaded);

    // park again, then free everything including the cache
    assert!(loader.unload_chunk(held, true));
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert!(loader.is_cached(held));
    loader.unload_all_chunks();
    assert!(loader.run_until_idle(centre, SETTLE_TIMEOUT));
    assert!(loader.chunk_states().is_empty());

    let stats = loader.stats();
    for (from, to) in ChunkState::TRANSITIONS {
        assert!(
            stats.transition_count(from, to) > 0,
            "{} -> {} was never taken",
            from,
            to
        );
    }
    assert_eq!(stats.generation_failures, 1);
    assert_pipeline_clean(&loader);
}
