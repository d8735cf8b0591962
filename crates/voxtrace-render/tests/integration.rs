//! Integration tests for voxtrace-render
//!
//! Every test runs on the host backend with tiny grids and images.

// Tests are allowed to use expect/unwrap for cleaner error messages
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use std::path::PathBuf;
use voxtrace_core::prelude::*;
use voxtrace_core::scene;
use voxtrace_render::session::{MOVE_STEP, TURN_STEP};
use voxtrace_render::{
    BackendKind, Camera, Control, CpuBackend, InputEvent, RenderConfig, RenderMode, Renderer,
    Session, TraceSettings,
};

fn red_shell() -> Grid {
    scene::shell(UVec3::splat(3), Voxel::wall(Rgba8::RED)).unwrap()
}

fn renderer(grid: &Grid, camera: Camera, settings: TraceSettings, seed: u64) -> Renderer {
    Renderer::new(camera, grid, settings, Box::new(CpuBackend::new()), seed).unwrap()
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("voxtrace-it-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Grey walls and floor under a glowing ceiling
fn lit_room() -> Grid {
    let d = UVec3::splat(5);
    Grid::from_fn(d, |index| {
        if index.z == d.z - 1 {
            Voxel::global_light(Rgba8::WHITE)
        } else if index.cmpeq(UVec3::ZERO).any() || (index + 1).cmpeq(d).any() {
            Voxel::wall(Rgba8::GREY)
        } else {
            Voxel::EMPTY
        }
    })
    .unwrap()
}

fn bouncing() -> TraceSettings {
    TraceSettings {
        bounces: 1,
        use_surface_cache: false,
        ..TraceSettings::default()
    }
}

#[test]
fn test_lidar_inside_shell() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 4, 3), TraceSettings::unlit(), 1);

    let image = r.render(&grid, RenderMode::Lidar).unwrap();
    for d in r.distances().unwrap() {
        assert!((d - 1.0).abs() < 1e-6, "distance {d}");
    }
    for b in r.blurred().unwrap() {
        assert!((b - 127.5).abs() < 1e-3, "blurred {b}");
    }
    assert!(image.pixels().all(|p| p.0 == [128, 128, 128]));
}

#[test]
fn test_unlit_trace_shows_wall_color() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 4, 3), TraceSettings::unlit(), 1);

    let image = r.render(&grid, RenderMode::Trace).unwrap();
    assert_eq!(image.dimensions(), (4, 3));
    assert!(image.pixels().all(|p| p.0 == [255, 0, 0]));
    assert!(r.intensity().unwrap().iter().all(|&packed| packed == 0xFF));
}

#[test]
fn test_all_projections_render() {
    let grid = red_shell();
    for projection in [
        voxtrace_render::Projection::FishEye,
        voxtrace_render::Projection::Flat,
        voxtrace_render::Projection::Infinite,
    ] {
        let mut camera = Camera::new(Vec3::splat(1.5), 4, 4);
        camera.projection = projection;
        let mut r = renderer(&grid, camera, TraceSettings::unlit(), 1);
        let image = r.render(&grid, RenderMode::Trace).unwrap();
        assert!(image.pixels().all(|p| p.0 == [255, 0, 0]), "{projection:?}");
    }
}

#[test]
fn test_same_seed_same_frame() {
    let grid = lit_room();
    let camera = Camera::new(Vec3::new(1.5, 2.5, 2.5), 6, 4);
    let mut a = renderer(&grid, camera.clone(), bouncing(), 42);
    let mut b = renderer(&grid, camera.clone(), bouncing(), 42);

    a.dispatch(&grid, RenderMode::Trace).unwrap();
    b.dispatch(&grid, RenderMode::Trace).unwrap();
    assert_eq!(a.intensity().unwrap(), b.intensity().unwrap());
    assert_eq!(a.seeds().unwrap(), b.seeds().unwrap());

    let mut fresh = renderer(&grid, camera.clone(), bouncing(), 42);
    let mut other = renderer(&grid, camera, bouncing(), 43);
    assert_ne!(fresh.seeds().unwrap(), other.seeds().unwrap());
}

#[test]
fn test_seeds_never_zero() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 16, 16), TraceSettings::unlit(), 7);
    assert!(r.seeds().unwrap().iter().all(|&seed| seed != 0));
}

/// Mean over pixels of the red-channel variance across `repetitions`
/// independent accumulations of `samples` each
fn accumulation_spread(r: &mut Renderer, grid: &Grid, samples: u32, repetitions: usize) -> f32 {
    let runs: Vec<Vec<Vec3>> = (0..repetitions)
        .map(|_| r.accumulate(grid, samples).unwrap())
        .collect();
    let pixels = runs[0].len();

    let mut total = 0.0;
    for p in 0..pixels {
        let mean = runs.iter().map(|run| run[p].x).sum::<f32>() / repetitions as f32;
        let variance = runs
            .iter()
            .map(|run| (run[p].x - mean).powi(2))
            .sum::<f32>()
            / repetitions as f32;
        total += variance;
    }
    total / pixels as f32
}

#[test]
fn test_accumulation_reduces_noise() {
    let grid = lit_room();
    let mut r = renderer(&grid, Camera::new(Vec3::new(1.5, 2.5, 2.5), 4, 4), bouncing(), 9);

    let one = accumulation_spread(&mut r, &grid, 1, 8);
    let ten = accumulation_spread(&mut r, &grid, 10, 8);
    let hundred = accumulation_spread(&mut r, &grid, 100, 8);

    assert!(one > 0.0);
    assert!(ten < one, "10 samples {ten} vs 1 sample {one}");
    assert!(hundred < ten, "100 samples {hundred} vs 10 samples {ten}");
}

#[test]
fn test_accumulate_rejects_zero_samples() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 2, 2), TraceSettings::unlit(), 1);
    assert!(r.accumulate(&grid, 0).is_err());
}

#[test]
fn test_stale_grid_is_reuploaded() {
    let mut grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 3, 3), TraceSettings::unlit(), 1);
    let before = r.render(&grid, RenderMode::Trace).unwrap();
    assert!(r.is_grid_synced(&grid));
    assert_eq!(before.get_pixel(1, 1).0, [255, 0, 0]);

    grid.set(UVec3::new(2, 1, 1), Voxel::wall(Rgba8::GREEN)).unwrap();
    assert!(!r.is_grid_synced(&grid));

    let image = r.render(&grid, RenderMode::Trace).unwrap();
    assert!(r.is_grid_synced(&grid));
    assert_eq!(image.get_pixel(1, 1).0, [0, 255, 0]);
}

#[test]
fn test_grid_of_other_size_rejected() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 2, 2), TraceSettings::unlit(), 1);
    let bigger = Grid::new(UVec3::splat(4)).unwrap();
    assert!(r.update_grid_buffer(&bigger).is_err());
}

#[test]
fn test_bake_sees_the_void() {
    let mut grid = Grid::new(UVec3::splat(3)).unwrap();
    grid.set(UVec3::new(1, 1, 0), Voxel::wall(Rgba8::RED)).unwrap();

    let settings = TraceSettings {
        void_color: [0.0, 0.0, 1.0],
        bake_samples: 4,
        direction_pool_size: 64,
        use_surface_cache: true,
        ..TraceSettings::unlit()
    };
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 2, 2), settings, 3);
    assert!(!r.is_bake_current(&grid));
    assert_eq!(r.direction_cursor(), 0);

    r.bake_surfaces(&grid).unwrap();
    assert!(r.is_bake_current(&grid));
    assert_eq!(r.direction_cursor(), 3 * 3 * 3 * 6 * 4);

    let cache = r.surface_cache().unwrap();
    assert_eq!(cache.len(), 27 * 6);
    // Cell (1, 1, 0)
    let wall = 4;
    for face in Face::ALL {
        assert_eq!(cache[wall * 6 + face.index()], 0x00FF_0000, "{face:?}");
    }
    let baked = cache.iter().filter(|&&c| c != 0).count();
    assert_eq!(baked, 6);

    r.bake_surfaces(&grid).unwrap();
    assert_eq!(r.direction_cursor(), 2 * 3 * 3 * 3 * 6 * 4);
}

#[test]
fn test_trace_rebakes_stale_cache() {
    let mut grid = red_shell();
    let settings = TraceSettings {
        bake_samples: 2,
        direction_pool_size: 32,
        use_surface_cache: true,
        ..TraceSettings::unlit()
    };
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 2, 2), settings, 5);

    r.dispatch(&grid, RenderMode::Trace).unwrap();
    assert!(r.is_bake_current(&grid));

    grid.set(UVec3::ZERO, Voxel::wall(Rgba8::BLUE)).unwrap();
    assert!(!r.is_bake_current(&grid));
    r.dispatch(&grid, RenderMode::Trace).unwrap();
    assert!(r.is_bake_current(&grid));
}

#[test]
fn test_snapshot_writes_png() {
    let grid = red_shell();
    let mut r = renderer(&grid, Camera::new(Vec3::splat(1.5), 4, 3), TraceSettings::unlit(), 1);
    let dir = temp_dir("snapshot");

    let path = r.snapshot(&grid, 3, &dir).unwrap();
    assert_eq!(path, dir.join(voxtrace_render::SNAPSHOT_FILE_NAME));

    let image = image::open(&path).unwrap().to_rgb8();
    assert_eq!(image.dimensions(), (4, 3));
    assert!(image.pixels().all(|p| p.0 == [255, 0, 0]));
    let _ = std::fs::remove_dir_all(&dir);
}

fn room_session(position: Vec3, name: &str) -> Session {
    let grid = Grid::new(UVec3::splat(5)).unwrap();
    let r = renderer(&grid, Camera::new(position, 3, 3), TraceSettings::unlit(), 1);
    Session::new(grid, r, temp_dir(name)).unwrap()
}

#[test]
fn test_build_then_walk_into_it() {
    let mut session = room_session(Vec3::splat(2.5), "build");

    session.handle(InputEvent::PointerPressed).unwrap();
    assert_eq!(
        session.grid().get(UVec3::splat(2)),
        Ok(Grid::DEFAULT_EDIT_VOXEL)
    );
    assert!(session.renderer().is_grid_synced(session.grid()));

    let events = InputEvent::parse_script("down up").unwrap();
    assert_eq!(session.replay(&events).unwrap(), Control::Continue);
    // Backing out succeeds, walking back into the new wall does not
    assert_eq!(
        session.renderer().camera().position,
        Vec3::new(2.5 - MOVE_STEP, 2.5, 2.5)
    );

    let image = session.frame().unwrap();
    assert_eq!(image.get_pixel(1, 1).0, [63, 63, 63]);
}

#[test]
fn test_build_outside_grid_is_ignored() {
    let mut session = room_session(Vec3::new(-1.0, 2.5, 2.5), "outside");
    let revision = session.grid().revision();
    assert_eq!(
        session.handle(InputEvent::PointerPressed).unwrap(),
        Control::Continue
    );
    assert_eq!(session.grid().revision(), revision);
}

#[test]
fn test_replay_stops_at_quit() {
    let mut session = room_session(Vec3::splat(2.5), "replay");
    let events = InputEvent::parse_script("space left q up").unwrap();

    assert_eq!(session.replay(&events).unwrap(), Control::Quit);
    assert_eq!(session.mode(), RenderMode::Lidar);
    let camera = session.renderer().camera();
    assert!((camera.walk_offset + TURN_STEP).abs() < 1e-6);
    assert_eq!(camera.position, Vec3::splat(2.5));
}

#[test]
fn test_pointer_sets_view() {
    let mut session = room_session(Vec3::splat(2.5), "pointer");
    session
        .handle(InputEvent::PointerMoved { x: 1.5, y: 1.5 })
        .unwrap();
    let camera = session.renderer().camera();
    assert!(camera.azimuth.abs() < 1e-6);
    assert!(camera.elevation.abs() < 1e-6);
    assert!(session.renderer().origins_dirty());

    session.frame().unwrap();
    assert!(!session.renderer().origins_dirty());
}

#[test]
fn test_session_snapshot_key() {
    let mut session = room_session(Vec3::splat(2.5), "key");
    session
        .handle(InputEvent::KeyPressed(voxtrace_render::Key::Snapshot))
        .unwrap();
    let path = session.snapshot_dir().join(voxtrace_render::SNAPSHOT_FILE_NAME);
    assert!(path.exists());
    let _ = std::fs::remove_dir_all(session.snapshot_dir());
}

#[test]
fn test_session_from_config() {
    let mut config = RenderConfig {
        width: 8,
        height: 6,
        backend: BackendKind::Cpu,
        ..RenderConfig::default()
    };
    config.scene.kind = SceneKind::Shell;
    config.scene.dimensions = [4, 4, 4];
    config.camera.position = Some([2.0, 2.0, 2.0]);
    config.trace.bake_samples = 2;
    config.trace.direction_pool_size = 128;
    config.snapshot_dir = temp_dir("config");

    let mut session = config.create_session().unwrap();
    assert!(session.renderer().is_bake_current(session.grid()));
    assert_eq!(session.frame().unwrap().dimensions(), (8, 6));

    session.renderer_mut().switch_mode();
    assert_eq!(session.frame().unwrap().dimensions(), (8, 6));
}
