use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use fbviz_core::{FbVizError, FramebufferGeometry, FramebufferSurface, Pipeline};
use tracing_subscriber::EnvFilter;

mod capture;
mod settings;

use capture::AudioCapture;
use settings::{RunArgs, Settings};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

const SHUTDOWN_GRACE_POLLS: usize = 25;

fn main() -> fbviz_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Devices => {
            init_tracing(false);
            capture::list_devices()
        }
        Commands::ShowConfig(args) => show_config(&args),
    }
}

fn run(args: &RunArgs) -> fbviz_core::Result<()> {
    let settings = Settings::load(args)?;
    init_tracing(settings.debug);
    tracing::info!(files = ?settings.config_files, "settings loaded");
    tracing::debug!(?settings, "effective settings");

    let geometry = resolve_geometry(&settings)?;
    let config = settings.pipeline_config(geometry.width, geometry.height);
    let surface = FramebufferSurface::open(settings.fb_device(), geometry)?;
    let pipeline = Pipeline::new(config, surface)?;

    install_signal_handlers();
    let capture = AudioCapture::start(settings.input_device, pipeline, &SHUTDOWN)?;
    tracing::info!(sample_rate = capture.sample_rate(), "rendering, press Ctrl+C to stop");

    while !SHUTDOWN.load(Ordering::SeqCst) && !capture.is_stopped() {
        thread::sleep(Duration::from_millis(100));
    }

    if !SHUTDOWN.load(Ordering::SeqCst) {
        drop(capture);
        return Err(FbVizError::surface("pipeline stopped after a display fault"));
    }

    tracing::info!("shutting down");
    // The next audio callback stops the pipeline; dropping the stream covers
    // a device that has gone quiet.
    for _ in 0..SHUTDOWN_GRACE_POLLS {
        if capture.is_stopped() {
            break;
        }
        thread::sleep(Duration::from_millis(20));
    }
    if !capture.is_stopped() {
        tracing::warn!("audio callback did not acknowledge shutdown");
    }
    drop(capture);
    Ok(())
}

fn show_config(args: &RunArgs) -> fbviz_core::Result<()> {
    let settings = Settings::load(args)?;
    let json = serde_json::to_string_pretty(&settings)
        .map_err(|e| FbVizError::msg(format!("failed to serialise settings: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Sysfs geometry, with `--width/--height` taking precedence. Without sysfs
/// both overrides are required and 16 bits per pixel is assumed.
fn resolve_geometry(settings: &Settings) -> fbviz_core::Result<FramebufferGeometry> {
    let detected = FramebufferGeometry::from_sysfs(settings.fb);
    let geometry = match (detected, settings.width, settings.height) {
        (Ok(geometry), width, height) => FramebufferGeometry {
            width: width.unwrap_or(geometry.width),
            height: height.unwrap_or(geometry.height),
            ..geometry
        },
        (Err(err), Some(width), Some(height)) => {
            tracing::warn!(%err, "could not read framebuffer geometry, using overrides");
            FramebufferGeometry {
                width,
                height,
                bits_per_pixel: 16,
            }
        }
        (Err(err), _, _) => {
            return Err(FbVizError::config(format!(
                "could not detect framebuffer resolution ({err}), pass --width and --height"
            )));
        }
    };

    tracing::info!(
        width = geometry.width,
        height = geometry.height,
        bpp = geometry.bits_per_pixel,
        "framebuffer geometry"
    );
    geometry.validate()?;
    Ok(geometry)
}

extern "C" fn handle_signal(_: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = handle_signal as libc::sighandler_t;
        libc::sigemptyset(&mut action.sa_mask);
        for signal in [libc::SIGINT, libc::SIGTERM] {
            if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                tracing::warn!(signal, "failed to install signal handler");
            }
        }
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Render live audio onto a Linux framebuffer", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture audio and draw it on the framebuffer until interrupted.
    Run(RunArgs),
    /// List audio input devices and their indices.
    Devices,
    /// Print the merged settings as JSON and exit.
    ShowConfig(RunArgs),
}
