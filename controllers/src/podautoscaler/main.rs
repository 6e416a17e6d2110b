#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, Environment, File};
use reqwest::Url;
use tokio::sync::watch;

mod clock;
mod control;
mod error;
mod evaluator;
mod factors;
mod histogram;
mod introspection;
mod quantization;
#[path = "config.rs"]
mod settings;
mod smoothing;
mod state;
mod target;

use clock::WallClock;
use control::{Controller, ControllerOptions};
use target::KubernetesTarget;

lazy_static! {
    static ref FILE_CONFIG: settings::AutoScalerConfig = Config::builder()
        .add_source(File::with_name("/etc/rminik8s/autoscaler.yaml").required(false))
        .add_source(Environment::default())
        .build()
        .unwrap_or_default()
        .try_deserialize::<settings::AutoScalerConfig>()
        .context("failed to parse autoscaler config")
        .unwrap_or_default();
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = settings::Cli::parse();
    let cfg = FILE_CONFIG.clone().merge_cli(&cli);

    let api_server_url = Url::parse(&cfg.api_server_url).context("invalid apiServerUrl")?;
    let target: Arc<dyn target::Target> = Arc::new(KubernetesTarget::new(api_server_url)?);
    let clock = Arc::new(WallClock::new());

    let controller = Arc::new(Controller::new(
        target,
        clock,
        ControllerOptions {
            poll_period: cfg.poll_period(),
            update_period: cfg.update_period(),
            dry_run: cfg.dry_run,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let http_server = if let Some(addr) = cfg.listen_api.clone() {
        let app = introspection::router(controller.clone());
        let addr: std::net::SocketAddr = addr.parse().context("invalid listenApi address")?;
        let mut shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            axum::Server::bind(&addr)
                .serve(app.into_make_service())
                .with_graceful_shutdown(async move {
                    let _ = shutdown.changed().await;
                })
                .await
        }))
    } else {
        None
    };

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    controller.run(shutdown_rx).await;
    if let Some(server) = http_server {
        let _ = server.await;
    }
    Ok(())
}
