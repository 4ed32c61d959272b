//! Analysis data calculator (C7): the hardest component. Given a device, a
//! set of client-supplied artifacts, and a set of requested analyzers,
//! materializes a typed `AnalyzerInput` per analyzer, memoizing shared
//! derivations (currently: original firmware resolution) at most once per
//! call regardless of how many analyzers depend on them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use semver::Version;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::analyzers::contract::{Analyzer, AnalyzerInput};
use crate::analyzers::registry::Registry;
use crate::artifact::{Artifact, ArtifactKind, TpmDeviceType};
use crate::error::{AfasError, Result};
use crate::firmware::storage::FirmwareStorageFacade;
use crate::host::models::Device;

/// The set of derivations the calculator knows how to produce. A second
/// derivation kind can be added here without changing the scheduling
/// shape in `DerivationCache`.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum DerivationKey {
    /// Keyed by (model_id, version): the parsed bytes of the golden
    /// firmware image for that (model, version) pair.
    OriginalFirmware(i64, Version),
}

/// Per-call memoization of derivation results, keyed by `DerivationKey`.
/// A structural hash of the key's ordered inputs would be used if
/// `DerivationKey` were not already cheaply hashable/comparable; it is, so
/// the enum itself serves as the memoization key.
#[derive(Default)]
pub struct DerivationCache {
    original_firmware: tokio::sync::Mutex<HashMap<DerivationKey, Arc<OnceCell<Result<Vec<u8>>>>>>,
}

impl DerivationCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn original_firmware_cell(&self, key: DerivationKey) -> Arc<OnceCell<Result<Vec<u8>>>> {
        let mut guard = self.original_firmware.lock().await;
        guard.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
    }
}

/// One requested analyzer's materialization outcome: either a ready input
/// or an explanatory error. Isolated per analyzer so one failure never
/// blocks unrelated sibling analyzers.
pub enum Materialized {
    Ready(String, AnalyzerInput),
    Failed(String, AfasError),
}

pub struct DataCalculator {
    storage: Arc<FirmwareStorageFacade>,
}

impl DataCalculator {
    pub fn new(storage: Arc<FirmwareStorageFacade>) -> Self {
        Self { storage }
    }

    #[instrument(skip(self, artifacts, registry, cache))]
    pub async fn materialize_all(
        &self,
        device: Option<&Device>,
        artifacts: &[Artifact],
        requested: &[&str],
        registry: &Registry,
        cache: &DerivationCache,
    ) -> Result<Vec<Materialized>> {
        let index = Self::index_by_kind(artifacts)?;

        let mut out = Vec::with_capacity(requested.len());
        for &id in requested {
            let analyzer = match registry.get(id) {
                Ok(a) => a,
                Err(e) => {
                    out.push(Materialized::Failed(id.to_string(), e));
                    continue;
                }
            };

            match self
                .materialize_one(analyzer.as_ref(), device, &index, cache)
                .await
            {
                Ok(input) => out.push(Materialized::Ready(id.to_string(), input)),
                Err(e) => out.push(Materialized::Failed(id.to_string(), e)),
            }
        }

        Ok(out)
    }

    fn index_by_kind(artifacts: &[Artifact]) -> Result<HashMap<ArtifactKind, &Artifact>> {
        let mut index = HashMap::with_capacity(artifacts.len());
        for artifact in artifacts {
            let kind = artifact.kind();
            if index.insert(kind, artifact).is_some() {
                return Err(AfasError::InvalidArgument(format!(
                    "duplicate artifact of kind {kind:?}"
                )));
            }
        }
        Ok(index)
    }

    async fn materialize_one(
        &self,
        analyzer: &dyn Analyzer,
        device: Option<&Device>,
        index: &HashMap<ArtifactKind, &Artifact>,
        cache: &DerivationCache,
    ) -> Result<AnalyzerInput> {
        let required = analyzer.required_artifact_kinds();
        self.check_required_present(analyzer.id(), &required, index)?;

        let original_firmware = if required.contains(&ArtifactKind::OriginalFirmware) {
            Some(self.resolve_original_firmware(analyzer.id(), device, cache).await?)
        } else {
            None
        };

        match analyzer.id() {
            "intel_acm_policy" => Ok(AnalyzerInput::IntelAcmPolicy {
                original_firmware: original_firmware.ok_or_else(|| {
                    AfasError::analyzer_failed(
                        analyzer.id(),
                        AfasError::Internal("original firmware derivation missing".into()),
                    )
                })?,
            }),
            "pcr0_replay" => {
                let event_log = match index.get(&ArtifactKind::TpmEventLog) {
                    Some(Artifact::TpmEventLog(bytes)) => bytes.clone(),
                    _ => {
                        return Err(AfasError::AnalyzerMissingArtifact {
                            id: analyzer.id().to_string(),
                            kind: ArtifactKind::TpmEventLog,
                        })
                    }
                };
                let reported_pcr0 = match index.get(&ArtifactKind::PcrValues) {
                    Some(Artifact::PcrValues(values)) => values
                        .iter()
                        .find(|v| v.index == 0)
                        .map(|v| v.digest.clone())
                        .ok_or_else(|| AfasError::AnalyzerMissingArtifact {
                            id: analyzer.id().to_string(),
                            kind: ArtifactKind::PcrValues,
                        })?,
                    _ => {
                        return Err(AfasError::AnalyzerMissingArtifact {
                            id: analyzer.id().to_string(),
                            kind: ArtifactKind::PcrValues,
                        })
                    }
                };
                Ok(AnalyzerInput::Pcr0Replay {
                    event_log,
                    reported_pcr0,
                    original_firmware: original_firmware.ok_or_else(|| {
                        AfasError::analyzer_failed(
                            analyzer.id(),
                            AfasError::Internal("original firmware derivation missing".into()),
                        )
                    })?,
                })
            }
            other => Err(AfasError::Internal(format!(
                "registry contains analyzer '{other}' with no known input-materialization rule"
            ))),
        }
    }

    fn check_required_present(
        &self,
        analyzer_id: &str,
        required: &BTreeSet<ArtifactKind>,
        index: &HashMap<ArtifactKind, &Artifact>,
    ) -> Result<()> {
        for kind in required {
            if *kind == ArtifactKind::OriginalFirmware {
                continue; // derived, not supplied
            }
            if !index.contains_key(kind) {
                return Err(AfasError::AnalyzerMissingArtifact {
                    id: analyzer_id.to_string(),
                    kind: *kind,
                });
            }
        }
        Ok(())
    }

    /// Resolves and parses the golden original firmware for this device's
    /// (model, version), memoized across every analyzer in the call that
    /// requires it.
    async fn resolve_original_firmware(
        &self,
        analyzer_id: &str,
        device: Option<&Device>,
        cache: &DerivationCache,
    ) -> Result<Vec<u8>> {
        let device = device.ok_or_else(|| {
            AfasError::analyzer_failed(
                analyzer_id,
                AfasError::InvalidArgument(
                    "original firmware derivation requires a resolved device".into(),
                ),
            )
        })?;

        // The model's currently expected firmware version is looked up
        // via the original-firmware catalog's own search, narrowed to
        // this model; a real deployment would instead take the version
        // the host itself reports. See DESIGN.md for this call's grounding.
        let candidates = self
            .storage
            .search(&crate::firmware::models::FirmwareFilter {
                model_id: Some(device.model_id),
                version: None,
            })
            .await
            .map_err(|e| AfasError::derivation_failed(e))?;

        let record = candidates
            .into_iter()
            .max_by(|a, b| a.version.cmp(&b.version))
            .ok_or_else(|| {
                AfasError::derivation_failed(AfasError::NotFound(format!(
                    "original firmware for model {}",
                    device.model_id
                )))
            })?;

        let key = DerivationKey::OriginalFirmware(device.model_id, record.version.clone());
        let cell = cache.original_firmware_cell(key).await;

        let result = cell
            .get_or_init(|| async {
                self.storage
                    .get_blob(&record.identity)
                    .await
                    .map_err(AfasError::derivation_failed)
            })
            .await;

        result
            .clone()
            .map_err(|e| AfasError::analyzer_failed(analyzer_id, e))
    }
}

#[allow(dead_code)]
fn _assert_tpm_device_type_kind_is_reachable(_: TpmDeviceType) {}
