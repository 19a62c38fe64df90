//! Biosignal booth engine - Main entry point
//!
//! Acquires cardiac and cortical signals from the configured sources,
//! runs the timed session state machine, and publishes values for the
//! visualization over the Spacebrew pub/sub connection. Tag-in and
//! tag-out arrive as lines on stdin from the booth's badge reader shim.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use biobooth_common::config::{BoothConfig, EcgSource, EegSource, TimingConfig};
use biobooth_engine::app::BoothContext;
use biobooth_engine::clock::SystemClock;
use biobooth_engine::publish::SpacebrewClient;
use biobooth_engine::session::SessionEngine;
use biobooth_engine::Shutdown;

/// Command-line arguments for the booth engine
#[derive(Parser, Debug)]
#[command(name = "biobooth-engine")]
#[command(about = "Biosignal acquisition and session engine for the booth exhibit")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "BIOBOOTH_CONFIG")]
    config: Option<PathBuf>,

    /// Pub/sub server host
    #[arg(long, env = "BIOBOOTH_SERVER")]
    server: Option<String>,

    /// Pub/sub server port
    #[arg(long, env = "BIOBOOTH_PORT")]
    port: Option<u16>,

    /// Client name announced to the pub/sub server
    #[arg(long, env = "BIOBOOTH_CLIENT_NAME")]
    client_name: Option<String>,

    /// Cardiac source: sim or serial
    #[arg(long, env = "BIOBOOTH_ECG")]
    ecg: Option<EcgSource>,

    /// Serial device for the cardiac source
    #[arg(long, env = "BIOBOOTH_SERIAL_PORT")]
    serial_port: Option<String>,

    /// Cortical source: sim or udp
    #[arg(long, env = "BIOBOOTH_EEG")]
    eeg: Option<EegSource>,

    /// UDP bind address for the cortical OSC listener
    #[arg(long, env = "BIOBOOTH_OSC_BIND")]
    osc_bind: Option<String>,

    /// Timing preset: live or debug
    #[arg(long, env = "BIOBOOTH_TIMING")]
    timing: Option<String>,
}

impl Args {
    /// Layer CLI/env values over the file/default configuration
    fn apply(&self, mut config: BoothConfig) -> Result<BoothConfig> {
        if let Some(server) = &self.server {
            config.server = server.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(name) = &self.client_name {
            config.client_name = name.clone();
        }
        if let Some(ecg) = self.ecg {
            config.ecg_source = ecg;
        }
        if let Some(serial_port) = &self.serial_port {
            config.serial_port = serial_port.clone();
        }
        if let Some(eeg) = self.eeg {
            config.eeg_source = eeg;
        }
        if let Some(osc_bind) = &self.osc_bind {
            config.osc_bind = osc_bind.clone();
        }
        if let Some(preset) = &self.timing {
            config.timing = TimingConfig::preset(preset).context("invalid timing preset")?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "biobooth_engine=debug,biobooth_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.apply(
        BoothConfig::load(args.config.as_deref()).context("Failed to load configuration")?,
    )?;

    info!(
        "Starting booth engine as '{}' against {}:{}",
        config.client_name, config.server, config.port
    );

    let sink = Arc::new(
        SpacebrewClient::connect(&config.server, config.port, &config.client_name)
            .await
            .context("Failed to connect to the pub/sub server")?,
    );

    let shutdown = Shutdown::new();
    let context = BoothContext::build(&config, sink, Arc::new(SystemClock), shutdown.clone())
        .context("Failed to build the booth engine")?;

    let engine_task = tokio::spawn(Arc::clone(&context.engine).run(shutdown.clone()));
    tokio::spawn(badge_reader_loop(Arc::clone(&context.engine)));

    shutdown_signal().await;
    shutdown.signal();
    let _ = engine_task.await;
    context.stop();

    info!("Booth engine shutdown complete");
    Ok(())
}

/// Translate stdin lines from the badge reader shim into session events.
/// Any non-empty line other than "out" counts as a tag-in.
async fn badge_reader_loop(engine: Arc<SessionEngine>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match line.trim() {
                "" => {}
                "out" => engine.tag_out(),
                _ => engine.tag_in(),
            },
            Ok(None) => {
                info!("stdin closed, badge reader loop exiting");
                break;
            }
            Err(e) => {
                warn!("badge reader read failed: {e}");
                break;
            }
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
