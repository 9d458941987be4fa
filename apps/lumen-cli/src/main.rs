mod demo;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use lumen_render::RenderConfig;
use tracing_subscriber::EnvFilter;

use crate::demo::{Backend, Demo};

#[derive(Parser)]
#[command(name = "lumen-cli", about = "Headless frame driver for the lumen render core")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Tick and draw the demo scene, printing per-frame statistics
    Run {
        /// Number of frames to draw
        #[arg(short, long, default_value = "60")]
        frames: u64,
        /// Emitter RNG seed (overrides the config file)
        #[arg(short, long)]
        seed: Option<u64>,
        /// YAML render configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated frame time in milliseconds
        #[arg(long, default_value = "16")]
        frame_ms: u64,
        /// Draw through wgpu instead of the command recorder
        #[arg(long)]
        gpu: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("lumen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("render: {}", lumen_render::crate_info());
            println!("render-wgpu: {}", lumen_render_wgpu::crate_info());
            println!("input: {}", lumen_input::crate_info());
        }
        Commands::Run {
            frames,
            seed,
            config,
            frame_ms,
            gpu,
        } => {
            let mut config = match config {
                Some(path) => RenderConfig::load(&path)?,
                None => RenderConfig::default(),
            };
            if let Some(seed) = seed {
                config.emitter.seed = seed;
            }
            let backend = if gpu { Backend::wgpu()? } else { Backend::recording() };
            println!(
                "Running {frames} frames on {} backend, seed={}",
                backend.name(),
                config.emitter.seed
            );

            let mut demo = Demo::new(backend, config)?;
            let dt = Duration::from_millis(frame_ms);
            let start = Instant::now();
            for frame in 0..frames {
                let r = demo.frame(frame, dt)?;
                println!(
                    "frame {:>4}: {} | submitted={} particles={} camera=({:.2}, {:.2}, {:.2})",
                    r.frame, r.stats, r.submitted, r.particles, r.camera.x, r.camera.y, r.camera.z
                );
            }
            let elapsed = start.elapsed();
            demo.shutdown();
            tracing::info!(frames, ?elapsed, "run finished");
        }
    }

    Ok(())
}
