//! Headless driver: follows a wandering observer through the world and
//! reports what the loader did.
//!
//! Usage: `voxels [ticks]`. Configuration comes from `$VOXELS_PATH/config.toml`
//! and `VOX_*` overrides.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cgmath::Point3;
use parking_lot::Mutex;

use voxels::{HeadlessRenderer, Observer, World, WorldConfig};

const DEFAULT_TICKS: u64 = 2_000;
const TICK_INTERVAL: Duration = Duration::from_millis(4);
/// World units per tick
const WALK_SPEED: f32 = 0.6;

/// Walks a slow spiral outward from wherever it is teleported to
#[derive(Default)]
struct Wanderer(Mutex<Walk>);

struct Walk {
    origin: Point3<f32>,
    position: Point3<f32>,
    step: u64,
}

impl Default for Walk {
    fn default() -> Self {
        let origin = Point3::new(0.0, 0.0, 0.0);
        Self {
            origin,
            position: origin,
            step: 0,
        }
    }
}

impl Wanderer {
    fn walk(&self) {
        let mut walk = self.0.lock();
        walk.step += 1;
        let step = walk.step as f32;
        let radius = step * WALK_SPEED * 0.05;
        let angle = step * WALK_SPEED / radius.max(1.0);
        walk.position = Point3::new(
            walk.origin.x + radius * angle.cos(),
            walk.origin.y,
            walk.origin.z + radius * angle.sin(),
        );
    }
}

impl Observer for Wanderer {
    fn current_position(&self) -> Point3<f32> {
        self.0.lock().position
    }

    fn teleport(&self, position: Point3<f32>) {
        *self.0.lock() = Walk {
            origin: position,
            position,
            step: 0,
        };
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let ticks = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse::<u64>()
            .with_context(|| format!("tick count must be a number, got '{}'", arg))?,
        None => DEFAULT_TICKS,
    };

    let config = WorldConfig::load().context("failed to load configuration")?;
    log::info!(
        "Starting with load radius {}, {} generator, {} ticks",
        config.terrain.load_radius,
        match &config.terrain.generator {
            voxels::GeneratorConfig::Flat => "flat",
            voxels::GeneratorConfig::Noise { .. } => "noise",
            voxels::GeneratorConfig::Socket { .. } => "socket",
            voxels::GeneratorConfig::Native { .. } => "native",
        },
        ticks
    );

    let mut world = World::new(config).context("failed to create world")?;
    let wanderer = Arc::new(Wanderer::default());
    world.register_observer(wanderer.clone());

    let mut renderer = HeadlessRenderer::new();
    let started = Instant::now();
    for tick in 0..ticks {
        wanderer.walk();
        world.tick();
        world.render(&mut renderer);

        if tick > 0 && tick % 500 == 0 {
            let stats = world.loader().stats();
            log::info!(
                "tick {}: {} loaded, {} cached, {} generated, {} freed",
                tick,
                world.loader().loaded_chunk_count(),
                world.loader().cached_chunk_count(),
                stats.generated,
                stats.freed
            );
        }
        std::thread::sleep(TICK_INTERVAL);
    }

    world.stop_chunk_loading();
    if let Err(e) = world.run_until_settled(Duration::from_secs(30)) {
        log::warn!("World did not settle after the walk: {}", e);
    }
    world.render(&mut renderer);

    let stats = world.loader().stats();
    let pools = world.loader().pool_stats();
    log::info!("Finished {} ticks in {:.2?}", ticks, started.elapsed());
    log::info!(
        "Chunks: {} generated, {} failed, {} finalized ({} retries), {} freed ({} deferred)",
        stats.generated,
        stats.generation_failures,
        stats.finalized,
        stats.finalize_retries,
        stats.freed,
        stats.deferred_frees
    );
    log::info!(
        "Cache: {} cached, {} reused, {} evicted; pool {}/{} slots in use, {} exhaustions",
        stats.cached,
        stats.uncached,
        stats.evicted,
        pools.in_use,
        pools.capacity,
        stats.pool_exhaustions
    );
    log::info!(
        "Renderer: {} uploads, {} draws, {} vertices, {} buffers live",
        renderer.uploads,
        renderer.draws,
        renderer.vertices_drawn,
        renderer.live_handles()
    );

    if stats.ref_violations > 0
        || stats.stale_accesses > 0
        || stats.illegal_transitions > 0
        || stats.task_panics > 0
    {
        anyhow::bail!(
            "pipeline reported {} reference violations, {} stale accesses, {} illegal transitions, {} task panics",
            stats.ref_violations,
            stats.stale_accesses,
            stats.illegal_transitions,
            stats.task_panics
        );
    }
    Ok(())
}
