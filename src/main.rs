//! Wi-Fi Sniffer - 802.11 monitor-mode capture service
//!
//! Puts a radio into monitor mode, classifies and buffers received frames,
//! hops or pins the channel, and serves start/stop/drain over HTTP.

mod api;
mod capture;
mod config;
mod error;
mod frame;
mod radio;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::AppState;
use capture::{CaptureController, SchedulerTiming};
use config::{Backend, Config};
use radio::{MonitorInterface, RadioDriver, SimulatedRadio};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wifi_sniffer=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("===========================================");
    info!("   Wi-Fi Sniffer - monitor mode capture");
    info!("===========================================");

    let config = Config::from_env();

    info!("Configuration:");
    info!("  Backend: {:?}", config.backend);
    if config.backend == Backend::Monitor {
        info!("  Interface: {}", config.interface);
        info!("  tcpdump: {}", config.tcpdump_path);
    }
    info!("  HTTP port: {}", config.http_port);
    info!("  Drain batch: {}", config.drain_batch);
    info!("  Hop interval: {} ms", config.hop_interval_ms);

    let mut traffic = None;
    let driver: Arc<dyn RadioDriver> = match config.backend {
        Backend::Simulated => {
            let radio = Arc::new(SimulatedRadio::new());
            if config.sim_channel_faults != Default::default() {
                info!("  Simulated channel faults: {:?}", config.sim_channel_faults);
                radio.set_channel_faults(config.sim_channel_faults.clone());
            }
            traffic = Some(radio.clone().spawn_traffic(config.sim_traffic_interval()));
            radio
        }
        Backend::Monitor => Arc::new(MonitorInterface::new(
            &config.interface,
            &config.tcpdump_path,
        )),
    };

    let controller = Arc::new(CaptureController::new(
        driver,
        SchedulerTiming::with_dwell(config.hop_interval()),
    ));

    let app = api::router(Arc::new(AppState {
        controller: controller.clone(),
        drain_batch: config.drain_batch,
    }));

    let http_addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", http_addr))?;

    info!("===========================================");
    info!("  HTTP API listening on {}", http_addr);
    info!("  Press Ctrl+C to stop.");
    info!("===========================================");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Leave monitor mode before exiting
    match controller.stop().await {
        Ok(stopped) => info!(
            "Capture session {} stopped on shutdown. {}",
            stopped.session_id, stopped.stats
        ),
        Err(_) => info!("No capture running at shutdown"),
    }

    if let Some(traffic) = traffic {
        traffic.abort();
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}
