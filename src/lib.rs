pub mod analyzers;
pub mod api;
pub mod artifact;
pub mod config;
pub mod controller;
pub mod error;
pub mod firmware;
pub mod host;
pub mod identity;
pub mod lockmap;
pub mod metrics;
pub mod pcr0;
pub mod report;

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::analyzers::registry::Registry;
use crate::api::router::api_router;
use crate::config::Cli;
use crate::controller::{Controller, ControllerConfig};
use crate::firmware::object_store::ObjectStore;
use crate::firmware::{
    FirmwareStorageFacade, FsObjectStore, FvhScanningParser, InMemoryMetadataStore,
    InMemoryObjectStore, InMemoryOriginalFirmwareDb, ParseCache, ParserConfig,
};
use crate::host::{HostInfoResolver, InMemoryDeviceDirectory};
use crate::metrics::router::metrics_router;
use crate::report::InMemoryReportStore;

/// Runs the coordination engine with the provided CLI configuration.
///
/// Builds every collaborator named in §4.13 (in-memory or filesystem
/// external-collaborator stubs, per `cli.object_store_root`), constructs
/// the controller, and serves the `/v1/...` API and `/metrics` on their
/// own listeners until a `Ctrl+C` signal or a server error, then tears the
/// controller down (`Controller::close`, C8/C9).
///
/// # Errors
///
/// Returns an error if binding either listen address fails, or if either
/// server exits with an error.
///
/// # Panics
///
/// Panics if the `Ctrl+C` signal handler fails to register.
pub async fn run(cli: Cli) -> Result<()> {
    tracing_subscriber::registry()
        .with(cli.log_level)
        .with(fmt::layer())
        .init();

    let cancel_token = CancellationToken::new();

    let ctrl_c_listener_task = tokio::spawn({
        let cancel_token_clone = cancel_token.clone();
        async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for Ctrl+C signal");
            info!("Ctrl+C received, proceeding with graceful shutdown...");
            cancel_token_clone.cancel();
        }
    });

    let controller = build_controller(&cli);

    let main_server_cancel_token = cancel_token.clone();
    let metrics_server_cancel_token = cancel_token.clone();

    tokio::try_join!(
        start_main_server(
            &cli.listen_addr,
            Arc::clone(&controller),
            main_server_cancel_token
        ),
        start_metrics_server(&cli.metrics_listen_addr, metrics_server_cancel_token),
    )?;

    controller.close().await;
    ctrl_c_listener_task.await?;

    info!("All services shut down gracefully.");

    Ok(())
}

fn build_controller(cli: &Cli) -> Arc<Controller> {
    let object_store: Arc<dyn ObjectStore> = match &cli.object_store_root {
        Some(root) => {
            info!(root, "backing object store with filesystem directory");
            Arc::new(FsObjectStore::new(root.clone()))
        }
        None => Arc::new(InMemoryObjectStore::new()),
    };

    let parser = Arc::new(FvhScanningParser::new(ParserConfig::default()));
    let storage = Arc::new(FirmwareStorageFacade::with_cache_size(
        object_store,
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(InMemoryOriginalFirmwareDb::new()),
        Arc::new(ParseCache::new(parser)),
        cli.firmware_cache_size,
    ));

    let directory = Arc::new(InMemoryDeviceDirectory::new());
    let host_resolver = Arc::new(HostInfoResolver::new(directory));

    Controller::new(
        storage,
        Arc::new(Registry::with_known_analyzers()),
        host_resolver,
        Arc::new(InMemoryReportStore::new()),
        ControllerConfig {
            max_concurrent_analyzers: cli.max_concurrent_analyzers,
            per_analyzer_timeout: cli.per_analyzer_timeout(),
            api_cache_purge_timeout: cli.api_cache_purge_timeout(),
            caching_policy: cli.caching_policy.into(),
        },
    )
}

async fn start_main_server(
    listen_address: &str,
    controller: Arc<Controller>,
    cancel_token: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(listen_address).await?;
    info!("afas-core listening on {}", listener.local_addr()?);

    let shutdown_future = async move {
        cancel_token.cancelled().await;
    };

    axum::serve(listener, api_router(controller))
        .with_graceful_shutdown(shutdown_future)
        .await?;
    info!("Main server shut down gracefully");
    Ok(())
}

async fn start_metrics_server(listen_address: &str, cancel_token: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(listen_address).await?;
    info!("Metrics server listening on {}", listener.local_addr()?);

    let shutdown_future = async move {
        cancel_token.cancelled().await;
    };

    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(shutdown_future)
        .await?;
    info!("Metrics server shut down gracefully");
    Ok(())
}
