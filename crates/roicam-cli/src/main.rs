use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use roicam::{CameraConfig, CameraSession};
use roicam_hw::discover;
use roicam_hw::protocol::{MODE_CENTERED, MODE_DISABLED, MODE_MANUAL};

#[derive(Parser)]
#[command(name = "roicam", about = "See3CAM CU20 ROI auto-exposure control")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the hidraw control node for a video device
    Probe {
        /// V4L2 device path (e.g. /dev/video2)
        device: String,
    },
    /// Query the camera's current auto-exposure mode and window size
    Query {
        /// Camera TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Set the auto-exposure mode
    SetMode {
        /// Camera TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Mode name: centered, roi, lower_center, or disabled
        mode: String,
        /// ROI anchor x in pixels (roi mode only)
        #[arg(long)]
        x: Option<i32>,
        /// ROI anchor y in pixels (roi mode only)
        #[arg(long)]
        y: Option<i32>,
        /// Averaging window size
        #[arg(long, default_value_t = 4)]
        window: u8,
    },
    /// Capture a frame and save it as a grayscale PNG
    Capture {
        /// Camera TOML configuration file
        #[arg(short, long)]
        config: PathBuf,
        /// Output image path
        #[arg(short, long)]
        output: PathBuf,
        /// Apply fisheye undistortion before saving
        #[arg(long)]
        undistort: bool,
        /// Warmup frames to discard before the saved capture
        #[arg(long, default_value_t = 4)]
        warmup: u32,
    },
}

fn mode_name(code: u8) -> &'static str {
    match code {
        MODE_CENTERED => "centered",
        MODE_MANUAL => "manual",
        MODE_DISABLED => "disabled",
        _ => "unknown",
    }
}

fn open_session(config: &PathBuf) -> Result<CameraSession<roicam_hw::V4lCapture, roicam_hw::HidChannel>> {
    let config = CameraConfig::from_toml_file(config)
        .with_context(|| format!("loading {}", config.display()))?;
    CameraSession::open(&config).context("opening camera session")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe { device } => {
            let hidraw = discover::hidraw_for_video_device(&device)?;
            println!("{hidraw}");
        }
        Commands::Query { config } => {
            let mut session = open_session(&config)?;
            let (mode, window) = session.auto_exposure_setting()?;
            println!("mode: {} ({mode:#04x})", mode_name(mode));
            println!("window size: {window}");
        }
        Commands::SetMode {
            config,
            mode,
            x,
            y,
            window,
        } => {
            let mut session = open_session(&config)?;
            match (mode.as_str(), x, y) {
                ("roi", Some(x), Some(y)) => session.set_roi_properties(x, y, window)?,
                ("roi", _, _) => bail!("roi mode requires --x and --y"),
                (name, _, _) => session.set_auto_exposure_mode(name)?,
            }
            println!("mode set to {mode}");
        }
        Commands::Capture {
            config,
            output,
            undistort,
            warmup,
        } => {
            let mut session = open_session(&config)?;

            // Let AGC/AE settle before keeping a frame.
            for _ in 0..=warmup {
                if !session.update() {
                    tracing::warn!("capture attempt failed");
                }
            }

            let frame = if undistort {
                session.remap_image()
            } else {
                session.image()
            };
            let Some(frame) = frame else {
                bail!("no frame captured after {warmup} warmup attempts");
            };

            let brightness = frame.avg_brightness();
            let img = image::GrayImage::from_raw(frame.width, frame.height, frame.data)
                .context("frame buffer does not match its dimensions")?;
            img.save(&output)
                .with_context(|| format!("saving {}", output.display()))?;
            println!(
                "saved {}x{} frame to {} (brightness {brightness:.1})",
                img.width(),
                img.height(),
                output.display(),
            );
        }
    }

    Ok(())
}
