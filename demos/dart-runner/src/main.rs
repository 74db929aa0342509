//! Demo: open a real serial line, run the poll scheduler, print events.
//!
//! Not part of the protocol library — this plays the role the teacher's own
//! `examples/*.rs` binaries play: a small runnable main exercising a real
//! transport end to end.

use std::sync::Arc;

use dart_core::config::SerialConfig;
use dart_core::serial::RealSerialEndpoint;
use dart_protocol::config::MasterConfig;
use dart_protocol::master::PumpMaster;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let port = std::env::args().nth(1).unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let config = MasterConfig {
        serial: SerialConfig {
            port,
            ..SerialConfig::default()
        },
        ..MasterConfig::default()
    };

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "invalid configuration");
        std::process::exit(1);
    }

    let endpoint = match RealSerialEndpoint::open(&config.serial) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::error!(error = %e, "failed to open serial port");
            std::process::exit(1);
        }
    };

    let (master, subscriber) = PumpMaster::new(config, Box::new(endpoint));
    let master = Arc::new(master);

    tracing::info!("running startup sequence");
    if let Err(e) = master.startup().await {
        tracing::error!(error = %e, "startup failed");
        std::process::exit(1);
    }

    let shutdown = Arc::new(tokio::sync::Notify::new());

    let poll_task = tokio::spawn({
        let master = master.clone();
        let shutdown = shutdown.clone();
        async move { master.run(shutdown).await }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        shutdown.notify_waiters();
    });

    while let Ok(event) = subscriber.recv_async().await {
        println!("{event:?}");
    }

    let _ = poll_task.await;
}
