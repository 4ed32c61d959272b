//! Shared test utilities for `afas-core` integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use afas_core::analyzers::registry::Registry;
use afas_core::api::router::api_router;
use afas_core::controller::{Controller, ControllerConfig};
use afas_core::firmware::{
    FirmwareStorageFacade, FvhScanningParser, InMemoryMetadataStore, InMemoryObjectStore,
    InMemoryOriginalFirmwareDb, ObjectStore, OriginalFirmwareRecord, ParseCache, ParserConfig,
};
use afas_core::host::{Device, HostInfoResolver, InMemoryDeviceDirectory};
use afas_core::identity::Identity;
use afas_core::report::InMemoryReportStore;
use axum::body::Body;
use http_body_util::BodyExt;

/// Builds a fully in-memory `Controller` with no registered devices.
pub fn build_controller() -> Arc<Controller> {
    let object_store = Arc::new(InMemoryObjectStore::new());
    let parser = Arc::new(FvhScanningParser::new(ParserConfig::default()));
    let storage = Arc::new(FirmwareStorageFacade::new(
        object_store,
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(InMemoryOriginalFirmwareDb::new()),
        Arc::new(ParseCache::new(parser)),
    ));

    let directory = Arc::new(InMemoryDeviceDirectory::new());
    let host_resolver = Arc::new(HostInfoResolver::new(directory));

    Controller::new(
        storage,
        Arc::new(Registry::with_known_analyzers()),
        host_resolver,
        Arc::new(InMemoryReportStore::new()),
        ControllerConfig {
            api_cache_purge_timeout: Duration::from_secs(3600),
            ..Default::default()
        },
    )
}

/// Builds a `Controller` with a single device pre-registered in the directory.
pub fn build_controller_with_device(device: Device) -> Arc<Controller> {
    let object_store = Arc::new(InMemoryObjectStore::new());
    let parser = Arc::new(FvhScanningParser::new(ParserConfig::default()));
    let storage = Arc::new(FirmwareStorageFacade::new(
        object_store,
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(InMemoryOriginalFirmwareDb::new()),
        Arc::new(ParseCache::new(parser)),
    ));

    let directory = InMemoryDeviceDirectory::new();
    directory.insert(device);
    let host_resolver = Arc::new(HostInfoResolver::new(Arc::new(directory)));

    Controller::new(
        storage,
        Arc::new(Registry::with_known_analyzers()),
        host_resolver,
        Arc::new(InMemoryReportStore::new()),
        ControllerConfig {
            api_cache_purge_timeout: Duration::from_secs(3600),
            ..Default::default()
        },
    )
}

/// Builds a `Controller` with `device` registered and a matching original
/// firmware record (`model_id`, `version` "1.0.0") backing `blob` in the
/// object store, so analyzers that require `OriginalFirmware` can resolve it.
pub async fn build_controller_with_golden_firmware(device: Device, blob: Vec<u8>) -> Arc<Controller> {
    let object_store = Arc::new(InMemoryObjectStore::new());
    let identity = Identity::of(&blob);
    object_store
        .store(&identity.to_hex(), &blob)
        .await
        .expect("seed golden firmware blob");

    let db = InMemoryOriginalFirmwareDb::new();
    db.insert(OriginalFirmwareRecord {
        model_id: device.model_id,
        version: semver::Version::parse("1.0.0").unwrap(),
        date_unix: 0,
        identity,
        source_uri: "mem://golden".to_string(),
    });

    let parser = Arc::new(FvhScanningParser::new(ParserConfig::default()));
    let storage = Arc::new(FirmwareStorageFacade::new(
        object_store,
        Arc::new(InMemoryMetadataStore::new()),
        Arc::new(db),
        Arc::new(ParseCache::new(parser)),
    ));

    let directory = InMemoryDeviceDirectory::new();
    directory.insert(device);
    let host_resolver = Arc::new(HostInfoResolver::new(Arc::new(directory)));

    Controller::new(
        storage,
        Arc::new(Registry::with_known_analyzers()),
        host_resolver,
        Arc::new(InMemoryReportStore::new()),
        ControllerConfig {
            api_cache_purge_timeout: Duration::from_secs(3600),
            ..Default::default()
        },
    )
}

/// Creates a test app router backed by a fresh in-memory controller.
pub fn create_app() -> axum::Router {
    api_router(build_controller())
}

/// Creates a test app router backed by a controller pre-seeded with `device`.
pub fn create_app_with_device(device: Device) -> axum::Router {
    api_router(build_controller_with_device(device))
}

/// Creates a test app router backed by a controller pre-seeded with `device`
/// and a golden firmware record/blob (see
/// `build_controller_with_golden_firmware`).
pub async fn create_app_with_golden_firmware(device: Device, blob: Vec<u8>) -> axum::Router {
    api_router(build_controller_with_golden_firmware(device, blob).await)
}

pub async fn body_to_bytes(body: Body) -> Vec<u8> {
    body.collect().await.expect("collect body").to_bytes().to_vec()
}

pub async fn body_to_string(body: Body) -> String {
    String::from_utf8(body_to_bytes(body).await).expect("body to string")
}

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string()))
        .with_test_writer()
        .try_init();
}
