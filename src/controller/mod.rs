//! Controller / orchestrator (C8): composes every collaborator and exposes
//! the five public operations, each mapped to one RPC entry over HTTP+JSON
//! by the wire layer.

pub mod lifecycle;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use semver::Version;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::analyzers::calculator::{DataCalculator, DerivationCache, Materialized};
use crate::analyzers::registry::Registry;
use crate::artifact::Artifact;
use crate::controller::lifecycle::Lifecycle;
use crate::error::{AfasError, Result};
use crate::firmware::models::{CachingPolicy, FirmwareFilter, ImageMetadata, OriginalFirmwareRecord};
use crate::firmware::storage::FirmwareStorageFacade;
use crate::host::models::HostInfo;
use crate::host::resolver::HostInfoResolver;
use crate::report::{AnalysisReport, AnalyzeResult, JobId, ReportFilter, ReportStore};

const DEFAULT_PER_ANALYZER_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_MAX_CONCURRENT_ANALYZERS: usize = 16;
const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct ControllerConfig {
    pub max_concurrent_analyzers: usize,
    pub per_analyzer_timeout: Duration,
    pub api_cache_purge_timeout: Duration,
    pub caching_policy: CachingPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_analyzers: DEFAULT_MAX_CONCURRENT_ANALYZERS,
            per_analyzer_timeout: DEFAULT_PER_ANALYZER_TIMEOUT,
            api_cache_purge_timeout: DEFAULT_PURGE_INTERVAL,
            caching_policy: CachingPolicy::default(),
        }
    }
}

pub struct Controller {
    storage: Arc<FirmwareStorageFacade>,
    calculator: Arc<DataCalculator>,
    registry: Arc<Registry>,
    host_resolver: Arc<HostInfoResolver>,
    report_store: Arc<dyn ReportStore>,
    analyzer_semaphore: Arc<Semaphore>,
    per_analyzer_timeout: Duration,
    caching_policy: CachingPolicy,
    lifecycle: Lifecycle,
}

impl Controller {
    pub fn new(
        storage: Arc<FirmwareStorageFacade>,
        registry: Arc<Registry>,
        host_resolver: Arc<HostInfoResolver>,
        report_store: Arc<dyn ReportStore>,
        config: ControllerConfig,
    ) -> Arc<Self> {
        let calculator = Arc::new(DataCalculator::new(Arc::clone(&storage)));
        let controller = Arc::new(Self {
            storage,
            calculator,
            registry,
            host_resolver,
            report_store,
            analyzer_semaphore: Arc::new(Semaphore::new(config.max_concurrent_analyzers)),
            per_analyzer_timeout: config.per_analyzer_timeout,
            caching_policy: config.caching_policy,
            lifecycle: Lifecycle::new(),
        });
        controller.spawn_purge_loop(config.api_cache_purge_timeout);
        controller
    }

    fn spawn_purge_loop(self: &Arc<Self>, interval: Duration) {
        let controller = Arc::clone(self);
        // launch_async is infallible here: this call happens at
        // construction, before close() can possibly have been invoked.
        let _ = self.lifecycle.launch_async(move |token| async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        info!("cache purge loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        controller.purge_caches().await;
                    }
                }
            }
        });
    }

    #[instrument(skip(self))]
    async fn purge_caches(&self) {
        // Reserved: the internal result caches have no expiry policy yet.
        // Matches the original's own `purgeAPICache` TODO.
        metrics::counter!("cache_purge_ticks_total").increment(1);
        tracing::debug!("cache purge tick (no-op)");
    }

    #[instrument(skip(self, artifacts, requested_analyzers))]
    pub async fn analyze(
        &self,
        host_info: Option<HostInfo>,
        trusted_hostname: Option<&str>,
        artifacts: Vec<Artifact>,
        requested_analyzers: Vec<String>,
    ) -> Result<AnalyzeResult> {
        let (resolved_host_info, device) =
            self.host_resolver.resolve(host_info, trusted_hostname).await;

        // Any firmware-image artifact is routed through the storage facade
        // (dedup + single-flight parse, C3/C4) before analyzer dispatch, so
        // concurrent Analyze calls for the same image coalesce into one
        // stored blob and one parse regardless of analyzer selection.
        for artifact in &artifacts {
            if let Artifact::FirmwareImage(bytes) = artifact {
                self.storage.store(bytes, self.caching_policy).await?;
            }
        }

        let requested_refs: Vec<&str> = requested_analyzers.iter().map(String::as_str).collect();
        let cache = DerivationCache::new();
        let materialized = self
            .calculator
            .materialize_all(
                device.as_ref(),
                &artifacts,
                &requested_refs,
                &self.registry,
                &cache,
            )
            .await?;

        let mut reports = Vec::with_capacity(materialized.len());
        let mut handles = Vec::with_capacity(materialized.len());

        for item in materialized {
            match item {
                Materialized::Failed(id, error) => {
                    reports.push(AnalysisReport {
                        analyzer_id: id.to_string(),
                        output: None,
                        error: Some(error.to_string()),
                        duration_ms: 0,
                    });
                }
                Materialized::Ready(id, input) => {
                    let registry = Arc::clone(&self.registry);
                    let semaphore = Arc::clone(&self.analyzer_semaphore);
                    let timeout = self.per_analyzer_timeout;
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore
                            .acquire_owned()
                            .await
                            .expect("analyzer semaphore is never closed");
                        let analyzer = match registry.get(&id) {
                            Ok(a) => a,
                            Err(e) => return (id, None, Some(e.to_string()), Duration::ZERO),
                        };
                        let start = std::time::Instant::now();
                        let outcome = tokio::time::timeout(timeout, analyzer.run(&input)).await;
                        let elapsed = start.elapsed();
                        match outcome {
                            Ok(Ok(output)) => (id, Some(output), None, elapsed),
                            Ok(Err(e)) => (id, None, Some(e.to_string()), elapsed),
                            Err(_) => {
                                let elapsed_ms = elapsed.as_millis() as u64;
                                let timeout_err = AfasError::Timeout {
                                    id: id.clone(),
                                    elapsed_ms,
                                }
                                .to_string();
                                (id, None, Some(timeout_err), elapsed)
                            }
                        }
                    }));
                }
            }
        }

        let launched = handles.len();
        let mut succeeded = 0usize;
        for handle in handles {
            match handle.await {
                Ok((id, output, error, elapsed)) => {
                    if output.is_some() {
                        succeeded += 1;
                    }
                    reports.push(AnalysisReport {
                        analyzer_id: id.to_string(),
                        output,
                        error,
                        duration_ms: elapsed.as_millis() as u64,
                    });
                }
                Err(join_error) => {
                    warn!(error = %join_error, "analyzer task panicked");
                }
            }
        }

        if launched > 0 && succeeded == 0 {
            return Err(AfasError::Internal(
                "no requested analyzer could run".to_string(),
            ));
        }

        let result = AnalyzeResult {
            job_id: JobId::new(),
            host_info: resolved_host_info,
            device,
            reports,
            created_at_unix: now_unix(),
        };

        self.report_store.persist(result.clone()).await?;
        Ok(result)
    }

    #[instrument(skip(self))]
    pub async fn search_firmware(
        &self,
        filter: &FirmwareFilter,
        fetch_content: bool,
    ) -> Result<Vec<(OriginalFirmwareRecord, Option<Vec<u8>>)>> {
        let records = self.storage.search(filter).await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let blob = if fetch_content {
                Some(self.storage.get_blob(&record.identity).await?)
            } else {
                None
            };
            out.push((record, blob));
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    pub async fn search_report(
        &self,
        filter: &ReportFilter,
        limit: usize,
    ) -> Result<Vec<AnalyzeResult>> {
        self.report_store.search(filter, limit).await
    }

    #[instrument(skip(self, measurements))]
    pub async fn report_host_configuration(
        &self,
        measurements: &[Vec<u8>],
    ) -> Result<crate::pcr0::Pcr0Digests> {
        Ok(crate::pcr0::compute_pcr0(measurements))
    }

    #[instrument(skip(self))]
    pub async fn check_firmware_version(
        &self,
        model_id: i64,
        versions: &[Version],
    ) -> Result<Vec<(Version, bool)>> {
        let mut out = Vec::with_capacity(versions.len());
        for version in versions {
            let exists = self
                .storage
                .find_by_version_model(model_id, version)
                .await
                .is_ok();
            out.push((version.clone(), exists));
        }
        Ok(out)
    }

    pub async fn store_firmware(&self, bytes: &[u8], policy: CachingPolicy) -> Result<ImageMetadata> {
        self.storage.store(bytes, policy).await
    }

    /// Waits for all background tasks (currently just the purge loop) to
    /// finish, then releases local collaborator state.
    pub async fn close(&self) {
        self.lifecycle.close().await;
        self.storage.close();
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::db::{InMemoryMetadataStore, InMemoryOriginalFirmwareDb};
    use crate::firmware::object_store::{InMemoryObjectStore, ObjectStore};
    use crate::firmware::parser::{FvhScanningParser, ParseCache, ParserConfig};
    use crate::host::directory::InMemoryDeviceDirectory;
    use crate::host::models::Device;
    use crate::identity::Identity;
    use crate::report::InMemoryReportStore;

    async fn test_controller() -> (Arc<Controller>, Device) {
        let object_store = Arc::new(InMemoryObjectStore::new());
        let blob = vec![0x55u8; 512];
        object_store
            .store(&Identity::of(&blob).to_hex(), &blob)
            .await
            .unwrap();

        let db = InMemoryOriginalFirmwareDb::new();
        db.insert(OriginalFirmwareRecord {
            model_id: 3,
            version: Version::parse("2.0.0").unwrap(),
            date_unix: 0,
            identity: Identity::of(&blob),
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
        let device = Device {
            asset_id: 10,
            model_id: 3,
            hostname: Some("host-10".to_string()),
        };
        directory.insert(device.clone());

        let controller = Controller::new(
            storage,
            Arc::new(Registry::with_known_analyzers()),
            Arc::new(HostInfoResolver::new(Arc::new(directory))),
            Arc::new(InMemoryReportStore::new()),
            ControllerConfig {
                api_cache_purge_timeout: Duration::from_secs(3600),
                ..Default::default()
            },
        );

        (controller, device)
    }

    #[tokio::test]
    async fn analyze_runs_a_requested_analyzer_and_persists_result() {
        let (controller, device) = test_controller().await;
        let host_info = HostInfo {
            asset_id: Some(device.asset_id),
            hostname: None,
            is_client_host_analyzed: false,
            model_id: None,
        };

        let result = controller
            .analyze(Some(host_info), None, vec![], vec!["intel_acm_policy".to_string()])
            .await
            .unwrap();

        assert_eq!(result.reports.len(), 1);
        assert!(result.reports[0].error.is_none());

        let fetched = controller.search_report(&ReportFilter::default(), 10).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].job_id, result.job_id);

        controller.close().await;
    }

    #[tokio::test]
    async fn analyze_with_unknown_analyzer_isolates_the_failure() {
        let (controller, device) = test_controller().await;
        let host_info = HostInfo {
            asset_id: Some(device.asset_id),
            hostname: None,
            is_client_host_analyzed: false,
            model_id: None,
        };

        let result = controller
            .analyze(Some(host_info), None, vec![], vec!["does_not_exist".to_string()])
            .await
            .unwrap();

        assert_eq!(result.reports.len(), 1);
        assert!(result.reports[0].output.is_none());
        assert!(matches!(
            result.reports[0].error.as_deref(),
            Some(msg) if msg.contains("does_not_exist")
        ));
        controller.close().await;
    }

    #[tokio::test]
    async fn analyze_stores_a_submitted_firmware_image_artifact() {
        let (controller, device) = test_controller().await;
        let host_info = HostInfo {
            asset_id: Some(device.asset_id),
            hostname: None,
            is_client_host_analyzed: false,
            model_id: None,
        };
        let submitted = vec![0x11u8; 4096];

        controller
            .analyze(
                Some(host_info),
                None,
                vec![Artifact::FirmwareImage(submitted.clone())],
                vec!["intel_acm_policy".to_string()],
            )
            .await
            .unwrap();

        let metadata = controller
            .store_firmware(&submitted, CachingPolicy::UseCache)
            .await
            .unwrap();
        let blob = controller.storage.get_blob(&metadata.identity).await.unwrap();
        assert_eq!(blob, submitted);

        controller.close().await;
    }

    #[tokio::test]
    async fn check_firmware_version_reports_existence() {
        let (controller, _device) = test_controller().await;
        let present = Version::parse("2.0.0").unwrap();
        let absent = Version::parse("9.9.9").unwrap();

        let results = controller
            .check_firmware_version(3, &[present.clone(), absent.clone()])
            .await
            .unwrap();

        assert!(results.contains(&(present, true)));
        assert!(results.contains(&(absent, false)));
        controller.close().await;
    }

    #[tokio::test]
    async fn report_host_configuration_computes_pcr0() {
        let (controller, _device) = test_controller().await;
        let digests = controller
            .report_host_configuration(&[b"measurement-one".to_vec()])
            .await
            .unwrap();
        assert_eq!(digests.sha1.len(), 20);
        assert_eq!(digests.sha256.len(), 32);
        controller.close().await;
    }
}
