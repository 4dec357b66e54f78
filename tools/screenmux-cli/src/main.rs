//! Screenmux CLI: drive the capture pipeline from the command line.
//!
//! Usage:
//!   screenmux record [OPTIONS]       Record a synthetic screen and tone
//!   screenmux convert-bench [OPTIONS] Time RGBA to I420 conversion
//!   screenmux inspect <FILE>         Summarize a packet file

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use screenmux_common::config::{AppConfig, Rotation};

mod commands;
mod synthetic;

#[derive(Parser)]
#[command(
    name = "screenmux",
    about = "Real-time screen and audio capture into a muxed packet stream",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Rotation applied while converting.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RotationArg {
    None,
    Ccw90,
    Cw90,
}

impl From<RotationArg> for Rotation {
    fn from(arg: RotationArg) -> Self {
        match arg {
            RotationArg::None => Rotation::None,
            RotationArg::Ccw90 => Rotation::CounterClockwise90,
            RotationArg::Cw90 => Rotation::Clockwise90,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Record a synthetic test pattern and tone into a packet file
    Record {
        /// Output packet file
        #[arg(short, long, default_value = "recording.smux")]
        output: PathBuf,

        /// Stop after this many seconds (default: wait for Ctrl+C)
        #[arg(short, long)]
        duration: Option<f64>,

        /// Capture ticks per second
        #[arg(long)]
        fps: Option<u32>,

        /// Output frame width
        #[arg(long)]
        width: Option<u32>,

        /// Output frame height
        #[arg(long)]
        height: Option<u32>,

        /// Left/right border excluded from conversion
        #[arg(long)]
        padding_width: Option<u32>,

        /// Top/bottom border excluded from conversion
        #[arg(long)]
        padding_height: Option<u32>,

        /// Rotation applied during conversion
        #[arg(long, value_enum)]
        rotation: Option<RotationArg>,

        /// Treat captured pixels as BGRA
        #[arg(long)]
        bgra: bool,

        /// Audio sample rate
        #[arg(long)]
        sample_rate: Option<u32>,

        /// Samples per encoded audio frame
        #[arg(long)]
        frame_size: Option<usize>,

        /// Tone frequency in Hz
        #[arg(long, default_value = "440")]
        tone: f64,

        /// Also write the pipeline report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Benchmark frame conversion
    ConvertBench {
        /// Output frame width
        #[arg(long, default_value = "1920")]
        width: usize,

        /// Output frame height
        #[arg(long, default_value = "1080")]
        height: usize,

        /// Rotation applied during conversion
        #[arg(long, value_enum, default_value = "none")]
        rotation: RotationArg,

        /// Number of conversions to time
        #[arg(short = 'n', long, default_value = "100")]
        iterations: u32,
    },

    /// Summarize a packet file
    Inspect {
        /// Path to the packet file
        path: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load();

    let mut logging = app_config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    logging.json |= cli.json_logs;
    screenmux_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Record {
            output,
            duration,
            fps,
            width,
            height,
            padding_width,
            padding_height,
            rotation,
            bgra,
            sample_rate,
            frame_size,
            tone,
            report,
        } => {
            let mut capture = app_config.capture.clone();
            capture.fps = fps.unwrap_or(capture.fps);
            capture.width = width.unwrap_or(capture.width);
            capture.height = height.unwrap_or(capture.height);
            capture.padding_width = padding_width.unwrap_or(capture.padding_width);
            capture.padding_height = padding_height.unwrap_or(capture.padding_height);
            if let Some(rotation) = rotation {
                capture.rotation = rotation.into();
            }
            if bgra {
                capture.color_order = screenmux_common::config::ColorOrder::Bgra;
            }
            capture.audio_sample_rate = sample_rate.unwrap_or(capture.audio_sample_rate);
            capture.audio_frame_size = frame_size.unwrap_or(capture.audio_frame_size);

            commands::record::run(commands::record::RecordOptions {
                output,
                duration,
                capture,
                tone_hz: tone,
                report,
            })
            .await
        }
        Commands::ConvertBench {
            width,
            height,
            rotation,
            iterations,
        } => commands::bench::run(width, height, rotation.into(), iterations),
        Commands::Inspect { path, json } => commands::inspect::run(path, json),
    }
}
