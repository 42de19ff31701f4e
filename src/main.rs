//! csd-xrandr - XRandR output-configuration daemon
//!
//! Entry point for the daemon binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use csd_xrandr::backend::touch::{NameHeuristicTablets, TouchscreenRotator};
use csd_xrandr::backend::x11::{XScreen, XTouchscreens};
use csd_xrandr::config::DaemonConfig;
use csd_xrandr::dbus::{self, notifications::NotificationUi, upower::LidMonitor};
use csd_xrandr::manager::confirm::{ConfirmationUi, UnattendedUi};
use csd_xrandr::manager::persist::ConfigPaths;
use csd_xrandr::manager::{Event, XrandrManager};

/// Command-line arguments for csd-xrandr
#[derive(Parser, Debug)]
#[command(name = "csd-xrandr")]
#[command(version, about = "XRandR output-configuration daemon", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/csd-xrandr/config.toml")]
    pub config: String,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    pub log_format: String,

    /// Write logs to file (in addition to stdout)
    #[arg(long, env = "CSD_XRANDR_LOG_FILE")]
    pub log_file: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("csd-xrandr v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = DaemonConfig::load(&args.config).unwrap_or_else(|e| {
        warn!("Failed to load config: {e:#}, using defaults");
        DaemonConfig::default()
    });

    let paths = ConfigPaths::from_user_config_dir()
        .context("could not determine the user configuration directory")?;

    let (events_tx, events_rx) = mpsc::channel(32);

    // RR-screen provider plus the event pump feeding hotplug notifications
    // into the manager.
    let screen = XScreen::connect().context("could not initialize the RANDR screen")?;
    XScreen::spawn_event_pump(events_tx.clone())
        .context("could not subscribe to RANDR events")?;

    let touch: Arc<dyn TouchscreenRotator> = Arc::new(XTouchscreens::new(
        screen.connection(),
        Box::new(NameHeuristicTablets),
    ));

    // Own the bus name early: a second instance fails here instead of
    // fighting over the hardware.
    let session = dbus::serve(events_tx.clone())
        .await
        .context("could not register on the session bus")?;

    let ui: Arc<dyn ConfirmationUi> = match NotificationUi::new(&session).await {
        Ok(ui) => Arc::new(ui),
        Err(e) => {
            warn!("notification service unavailable ({e:#}); confirmations will auto-revert");
            Arc::new(UnattendedUi)
        }
    };

    let mut manager = XrandrManager::new(
        screen,
        config,
        paths,
        ui,
        Some(touch),
        events_tx.clone(),
    );

    match LidMonitor::connect().await {
        Ok(lid) => {
            match lid.lid_is_closed().await {
                Ok(closed) => manager.set_lid_closed(closed),
                Err(e) => warn!("could not read the initial lid state: {e:#}"),
            }
            tokio::spawn(lid.watch(events_tx.clone()));
        }
        Err(e) => warn!("UPower unavailable ({e:#}); lid events will be ignored"),
    }

    manager.startup();

    spawn_signal_handler(events_tx);

    manager.run(events_rx).await;

    info!("csd-xrandr shut down");
    Ok(())
}

fn spawn_signal_handler(events: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("could not install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }

        info!("received termination signal");
        let _ = events.send(Event::Shutdown).await;
    });
}

fn init_logging(args: &Args) -> Result<()> {
    use std::fs::File;

    let log_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Our own crate at the requested level; zbus chatter stays at warn.
        tracing_subscriber::EnvFilter::new(format!(
            "csd_xrandr={level},zbus=warn,warn",
            level = log_level
        ))
    });

    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path)?;

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(std::io::stdout),
                    )
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(file)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path);
    } else {
        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().pretty())
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(tracing_subscriber::fmt::layer().compact())
                    .init();
            }
        }
    }

    Ok(())
}
