//! # Falling Bodies
//!
//! Drives a threaded physics proxy the way a game main loop does: a logic
//! thread runs `sync → flush_queries → end_sync → step` every frame while
//! a render thread reads body transforms concurrently.
//!
//! ```bash
//! # Defaults: threaded, 60 pooled handles per category, 120 frames
//! falling_bodies
//!
//! # Custom config and frame count
//! RUST_LOG=marshal_core=debug falling_bodies marshal.toml 600
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use marshal_core::{MarshalConfig, MarshalError, MarshalResult, Rid};
use marshal_physics::{
    AreaParam, BasicPhysicsServer, BodyMode, BodyState, BodyStateKind, PhysicsServerProxy,
    ShapeData, ShapeKind, Transform2D, Vec2,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_FRAMES: u32 = 120;
const FRAME_DELTA: f32 = 1.0 / 60.0;
const BODY_COUNT: usize = 50;

type Physics = PhysicsServerProxy<BasicPhysicsServer>;

fn main() -> MarshalResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => MarshalConfig::from_file(path)?,
        None => MarshalConfig::default(),
    };
    let frames = match args.next() {
        Some(raw) => raw
            .parse()
            .map_err(|_| MarshalError::InvalidConfig(format!("frame count `{raw}` is not a number")))?,
        None => DEFAULT_FRAMES,
    };

    tracing::info!(threaded = config.threaded, pool = config.pool_max_size, frames, "starting");

    let physics = Arc::new(PhysicsServerProxy::new(BasicPhysicsServer::new(), &config));
    physics.init()?;

    let (space, bodies) = build_scene(&physics);

    let running = Arc::new(AtomicBool::new(true));
    let reads = Arc::new(AtomicU64::new(0));
    let render = {
        let physics = Arc::clone(&physics);
        let running = Arc::clone(&running);
        let reads = Arc::clone(&reads);
        let bodies = bodies.clone();
        thread::Builder::new()
            .name("render".to_string())
            .spawn(move || render_loop(&physics, &bodies, &running, &reads))?
    };

    let started = Instant::now();
    for _ in 0..frames {
        physics.sync();
        physics.flush_queries();
        physics.end_sync();
        physics.step(FRAME_DELTA);
    }
    physics.sync();
    let elapsed = started.elapsed();

    running.store(false, Ordering::Release);
    if render.join().is_err() {
        tracing::error!("render thread panicked");
    }

    let lowest = bodies
        .iter()
        .filter_map(|body| match physics.body_get_state(*body, BodyStateKind::Transform) {
            Some(BodyState::Transform(xf)) => Some(xf.origin.y),
            _ => None,
        })
        .fold(f32::MIN, f32::max);
    let under_cursor = physics.space_intersect_point(space, Vec2::new(320.0, lowest));

    tracing::info!(
        frames,
        elapsed_ms = elapsed.as_millis() as u64,
        render_reads = reads.load(Ordering::Relaxed),
        lowest,
        under_cursor = under_cursor.len(),
        "simulation done"
    );

    let queue = physics.queue_stats();
    let cache = physics.cache_stats();
    tracing::info!(
        pushed = queue.pushed(),
        sync_calls = queue.sync_calls(),
        pool_hits = cache.hits(),
        pool_misses = cache.misses(),
        "dispatch stats"
    );

    let Ok(physics) = Arc::try_unwrap(physics) else {
        tracing::error!("physics proxy still shared at shutdown");
        return Err(MarshalError::NotRunning);
    };
    match physics.into_server() {
        Some(server) => {
            let stats = server.stats();
            tracing::info!(
                steps = stats.steps,
                created = stats.created,
                freed = stats.freed,
                live_at_finish = stats.live_at_finish,
                server_threads = server.threads().len(),
                "server reclaimed"
            );
            Ok(())
        }
        None => Err(MarshalError::WorkerPanicked),
    }
}

/// A floor, a column of mixed shapes and a gravity well pointing down.
fn build_scene(physics: &Physics) -> (Rid, Vec<Rid>) {
    let space = physics.space_create();
    physics.space_set_active(space, true);
    physics.area_set_param(space, AreaParam::GravityVector(Vec2::DOWN));
    physics.area_set_param(space, AreaParam::Gravity(98.0));

    let floor_shape = physics.shape_create(ShapeKind::Line);
    physics.shape_set_data(floor_shape, ShapeData::Line { normal: Vec2::new(0.0, -1.0), distance: -400.0 });
    let floor = physics.body_create();
    physics.body_set_mode(floor, BodyMode::Static);
    physics.body_set_space(floor, space);
    physics.body_add_shape(floor, floor_shape, Transform2D::IDENTITY);

    let circle = physics.shape_create(ShapeKind::Circle);
    physics.shape_set_data(circle, ShapeData::Circle { radius: 16.0 });
    let rectangle = physics.shape_create(ShapeKind::Rectangle);
    physics.shape_set_data(rectangle, ShapeData::Rectangle { half_extents: Vec2::new(16.0, 16.0) });
    let capsule = physics.shape_create(ShapeKind::Capsule);
    physics.shape_set_data(capsule, ShapeData::Capsule { radius: 16.0, height: 32.0 });
    let shapes = [circle, rectangle, capsule];

    let bodies = (0..BODY_COUNT)
        .map(|i| {
            let body = physics.body_create();
            physics.body_add_shape(body, shapes[i % shapes.len()], Transform2D::IDENTITY);
            physics.body_set_space(body, space);
            let column = (i % 10) as f32;
            let row = (i / 10) as f32;
            let origin = Vec2::new(160.0 + column * 40.0, -row * 40.0);
            physics.body_set_state(body, BodyState::Transform(Transform2D::from_origin(origin)));
            physics.body_set_state(body, BodyState::AngularVelocity(0.5 * column));
            body
        })
        .collect();

    (space, bodies)
}

fn render_loop(physics: &Physics, bodies: &[Rid], running: &AtomicBool, reads: &AtomicU64) {
    while running.load(Ordering::Acquire) {
        for body in bodies {
            if physics.body_get_state(*body, BodyStateKind::Transform).is_some() {
                reads.fetch_add(1, Ordering::Relaxed);
            }
        }
        thread::sleep(Duration::from_millis(4));
    }
}
