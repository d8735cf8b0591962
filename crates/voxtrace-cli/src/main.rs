//! voxtrace CLI - headless driver for the voxel ray renderer

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use voxtrace_core::prelude::Vec3;
use voxtrace_core::scene::SceneKind;
use voxtrace_render::kernels::unpack_rgb;
use voxtrace_render::{BackendKind, Control, InputEvent, RenderConfig, RenderMode, Session};

#[derive(Parser)]
#[command(name = "voxtrace")]
#[command(about = "Ray-marched light transport through a voxel grid", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides applied on top of the loaded config
#[derive(Args)]
struct GlobalArgs {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scene layout: prison, street, shell or empty
    #[arg(long, global = true)]
    scene: Option<SceneKind>,

    /// Grid size, either N for a cube or XxYxZ
    #[arg(long, global = true, value_parser = parse_dimensions)]
    size: Option<[u32; 3]>,

    /// Image width
    #[arg(long, global = true)]
    width: Option<u32>,

    /// Image height
    #[arg(long, global = true)]
    height: Option<u32>,

    /// Compute backend: cpu or gpu
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Seed for the per-pixel random state and the direction pool
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one frame to an image file
    Render {
        /// Output image file (.png)
        #[arg(short, long, default_value = "render.png")]
        output: PathBuf,

        /// trace or lidar
        #[arg(short, long, default_value = "trace")]
        mode: RenderMode,

        /// Trace dispatches to average (defaults to the configured samples)
        #[arg(short, long)]
        samples: Option<u32>,
    },

    /// Write an accumulated snapshot.png
    Snapshot {
        /// Directory receiving the snapshot
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Trace dispatches to average (defaults to the configured snapshot samples)
        #[arg(short, long)]
        samples: Option<u32>,
    },

    /// Bake the surface cache and print face statistics
    Bake {
        /// Additional bake passes after the startup bake
        #[arg(long, default_value = "0")]
        passes: u32,
    },

    /// Apply scripted input events, then write the final frame
    Replay {
        /// Whitespace separated events: up, down, left, right, space, click, s, q, look:X,Y
        #[arg(short, long, conflicts_with = "file")]
        events: Option<String>,

        /// File containing the events
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output image file (.png)
        #[arg(short, long, default_value = "replay.png")]
        output: PathBuf,
    },

    /// Print the effective config, or save it
    Config {
        /// Write the config to --config, or to the default location
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let config = load_config(&cli.global)?;

    match cli.command {
        Commands::Render {
            output,
            mode,
            samples,
        } => {
            run_render(&config, &output, mode, samples)?;
        }
        Commands::Snapshot { dir, samples } => {
            run_snapshot(config, dir, samples)?;
        }
        Commands::Bake { passes } => {
            run_bake(config, passes)?;
        }
        Commands::Replay {
            events,
            file,
            output,
        } => {
            run_replay(&config, events, file.as_deref(), &output)?;
        }
        Commands::Config { save } => {
            run_config(&config, cli.global.config.as_deref(), save)?;
        }
    }

    Ok(())
}

/// `RUST_LOG` wins unless `-v` asks for debug output
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_dimensions(value: &str) -> std::result::Result<[u32; 3], String> {
    let parts = value
        .split(['x', 'X'])
        .map(|part| part.trim().parse::<u32>().map_err(|e| format!("'{part}': {e}")))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match parts.as_slice() {
        [n] => Ok([*n; 3]),
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(format!("expected N or XxYxZ, got '{value}'")),
    }
}

fn load_config(args: &GlobalArgs) -> Result<RenderConfig> {
    let mut config = RenderConfig::load(args.config.as_deref()).context("failed to load config")?;

    if let Some(scene) = args.scene {
        config.scene.kind = scene;
    }
    if let Some(size) = args.size {
        config.scene.dimensions = size;
    }
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    config.validate().context("invalid configuration")?;
    tracing::debug!("effective config: {:?}", config);
    Ok(config)
}

fn create_session(config: &RenderConfig) -> Result<Session> {
    let session = config
        .create_session()
        .with_context(|| format!("failed to start the {} backend", config.backend))?;
    println!(
        "{} scene {:?}, {}x{} image on {}",
        config.scene.kind,
        config.scene.dimensions,
        config.width,
        config.height,
        session.renderer().backend_name()
    );
    Ok(session)
}

fn run_render(
    config: &RenderConfig,
    output: &Path,
    mode: RenderMode,
    samples: Option<u32>,
) -> Result<()> {
    let mut session = create_session(config)?;
    let start = Instant::now();

    let image = match mode {
        RenderMode::Trace => {
            let samples = samples.unwrap_or(config.trace.samples);
            println!("Tracing {} samples...", samples);
            session.accumulated_frame(samples)?
        }
        RenderMode::Lidar => {
            session.renderer_mut().update_camera(|camera| camera.mode = RenderMode::Lidar);
            session.frame()?
        }
    };

    image
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Saved to: {} ({:.2?})", output.display(), start.elapsed());
    Ok(())
}

fn run_snapshot(
    mut config: RenderConfig,
    dir: Option<PathBuf>,
    samples: Option<u32>,
) -> Result<()> {
    if let Some(dir) = dir {
        config.snapshot_dir = dir;
    }
    if let Some(samples) = samples {
        config.trace.snapshot_samples = samples;
    }

    let mut session = create_session(&config)?;
    let path = session.snapshot()?;
    println!("Saved to: {}", path.display());
    Ok(())
}

fn run_bake(mut config: RenderConfig, passes: u32) -> Result<()> {
    config.trace.use_surface_cache = true;
    let mut session = create_session(&config)?;

    for pass in 0..passes {
        let start = Instant::now();
        session.bake()?;
        println!("Pass {}: {:.2?}", pass + 1, start.elapsed());
    }

    let cache = session.renderer_mut().surface_cache()?;
    let baked: Vec<_> = cache
        .iter()
        .filter(|&&packed| packed != 0)
        .map(|&packed| unpack_rgb(packed))
        .collect();

    println!("Faces:     {}", cache.len());
    println!("Lit faces: {}", baked.len());
    if !baked.is_empty() {
        let mean = baked.iter().copied().sum::<Vec3>() / baked.len() as f32;
        let brightest = baked
            .iter()
            .map(|color| color.max_element())
            .fold(0.0_f32, f32::max);
        println!("Mean:      {:.3} {:.3} {:.3}", mean.x, mean.y, mean.z);
        println!("Brightest: {:.3}", brightest);
    }
    println!(
        "Direction cursor: {}",
        session.renderer().direction_cursor()
    );
    Ok(())
}

fn run_replay(
    config: &RenderConfig,
    events: Option<String>,
    file: Option<&Path>,
    output: &Path,
) -> Result<()> {
    let script = match (events, file) {
        (Some(events), _) => events,
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("failed to read {}", file.display()))?,
        (None, None) => anyhow::bail!("either --events or --file is required"),
    };
    let events = InputEvent::parse_script(&script)?;

    let mut session = create_session(config)?;
    println!("Replaying {} events...", events.len());
    if session.replay(&events)? == Control::Quit {
        println!("Stopped at quit");
    }

    let camera = session.renderer().camera();
    println!(
        "Camera at {:.2}, {:.2}, {:.2} in {} mode",
        camera.position.x,
        camera.position.y,
        camera.position.z,
        camera.mode
    );

    session
        .frame()?
        .save(output)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Saved to: {}", output.display());
    Ok(())
}

fn run_config(config: &RenderConfig, path: Option<&Path>, save: bool) -> Result<()> {
    if !save {
        println!("{}", config.to_json()?);
        return Ok(());
    }

    let path = match path {
        Some(path) => path.to_path_buf(),
        None => RenderConfig::default_path().context("no config directory on this platform")?,
    };
    config.save(&path)?;
    println!("Saved to: {}", path.display());
    Ok(())
}
