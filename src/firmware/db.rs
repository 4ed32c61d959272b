//! Metadata and original-firmware record collaborators (C13), in-memory
//! stand-ins for the out-of-scope database described in the specification.

use dashmap::DashMap;
use semver::Version;

use crate::error::{AfasError, Result};
use crate::firmware::models::{FirmwareFilter, ImageMetadata, OriginalFirmwareRecord};
use crate::identity::Identity;

/// Stores one `ImageMetadata` row per identity, created once on first
/// sight and never mutated thereafter.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get(&self, identity: &Identity) -> Result<ImageMetadata>;
    /// Inserts metadata for a never-before-seen identity. A second insert
    /// for the same identity is a no-op success, mirroring unique-violation-
    /// as-success semantics at the storage facade.
    async fn insert_if_absent(&self, metadata: ImageMetadata) -> Result<()>;
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    rows: DashMap<Identity, ImageMetadata>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn get(&self, identity: &Identity) -> Result<ImageMetadata> {
        self.rows
            .get(identity)
            .map(|r| r.clone())
            .ok_or_else(|| AfasError::NotFound(format!("image metadata for {identity}")))
    }

    async fn insert_if_absent(&self, metadata: ImageMetadata) -> Result<()> {
        self.rows.entry(metadata.identity).or_insert(metadata);
        Ok(())
    }
}

/// The curated original-firmware catalog, keyed by `(model_id, version)`
/// and searchable by partial filter.
#[async_trait::async_trait]
pub trait OriginalFirmwareDb: Send + Sync {
    async fn find_by_version_model(
        &self,
        model_id: i64,
        version: &Version,
    ) -> Result<OriginalFirmwareRecord>;
    async fn search(&self, filter: &FirmwareFilter) -> Result<Vec<OriginalFirmwareRecord>>;
}

#[derive(Default)]
pub struct InMemoryOriginalFirmwareDb {
    records: DashMap<(i64, Version), OriginalFirmwareRecord>,
}

impl InMemoryOriginalFirmwareDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: OriginalFirmwareRecord) {
        self.records
            .insert((record.model_id, record.version.clone()), record);
    }
}

#[async_trait::async_trait]
impl OriginalFirmwareDb for InMemoryOriginalFirmwareDb {
    async fn find_by_version_model(
        &self,
        model_id: i64,
        version: &Version,
    ) -> Result<OriginalFirmwareRecord> {
        self.records
            .get(&(model_id, version.clone()))
            .map(|r| r.clone())
            .ok_or_else(|| {
                AfasError::NotFound(format!(
                    "original firmware for model {model_id} version {version}"
                ))
            })
    }

    async fn search(&self, filter: &FirmwareFilter) -> Result<Vec<OriginalFirmwareRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                filter.model_id.is_none_or(|m| m == record.model_id)
                    && filter
                        .version
                        .as_ref()
                        .is_none_or(|v| v == &record.version)
            })
            .map(|entry| entry.value().clone())
            .collect())
    }
}
