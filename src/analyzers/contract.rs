//! Analyzer contract (C6): stable identity, declared requirements, and the
//! async `run` entry point every analyzer implements.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactKind;
use crate::error::Result;

pub type AnalyzerId = &'static str;

/// Fully materialized, per-analyzer typed input produced by the data
/// calculator (C7). One variant per analyzer family; adding an analyzer
/// that needs a new input shape adds a variant here.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum AnalyzerInput {
    IntelAcmPolicy {
        original_firmware: Vec<u8>,
    },
    Pcr0Replay {
        event_log: Vec<u8>,
        reported_pcr0: Vec<u8>,
        original_firmware: Vec<u8>,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzerOutput {
    pub passed: bool,
    pub detail: String,
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    fn id(&self) -> AnalyzerId;
    /// Artifact kinds (including the synthetic `OriginalFirmware`) this
    /// analyzer requires to materialize its `AnalyzerInput`.
    fn required_artifact_kinds(&self) -> BTreeSet<ArtifactKind>;
    async fn run(&self, input: &AnalyzerInput) -> Result<AnalyzerOutput>;
}
