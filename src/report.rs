//! Analysis reports and the report store used by `search_report`. The
//! report store itself is out of scope (per the specification) beyond its
//! interface; this ships a minimal runnable `DashMap`-backed implementation
//! so `analyze`/`search_report` are exercisable end to end.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AfasError, Result};
use crate::host::models::{Device, HostInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One analyzer's outcome within an `AnalyzeResult`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analyzer_id: String,
    pub output: Option<crate::analyzers::AnalyzerOutput>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// The aggregate result of one `analyze` call, persisted via the report
/// store and returned to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub job_id: JobId,
    pub host_info: Option<HostInfo>,
    pub device: Option<Device>,
    pub reports: Vec<AnalysisReport>,
    pub created_at_unix: u64,
}

/// Filters accepted by `search_report`; an empty filter matches every
/// report (subject to `limit`).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    pub job_id: Option<JobId>,
    pub asset_id: Option<i64>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn persist(&self, result: AnalyzeResult) -> Result<()>;
    async fn search(&self, filter: &ReportFilter, limit: usize) -> Result<Vec<AnalyzeResult>>;
    async fn get(&self, job_id: JobId) -> Result<AnalyzeResult>;
}

#[derive(Default)]
pub struct InMemoryReportStore {
    results: DashMap<JobId, AnalyzeResult>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn persist(&self, result: AnalyzeResult) -> Result<()> {
        self.results.insert(result.job_id, result);
        Ok(())
    }

    async fn search(&self, filter: &ReportFilter, limit: usize) -> Result<Vec<AnalyzeResult>> {
        let mut matches: Vec<AnalyzeResult> = self
            .results
            .iter()
            .filter(|entry| {
                let result = entry.value();
                filter.job_id.is_none_or(|id| id == result.job_id)
                    && filter.asset_id.is_none_or(|asset_id| {
                        result
                            .device
                            .as_ref()
                            .is_some_and(|d| d.asset_id == asset_id)
                    })
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|r| std::cmp::Reverse(r.created_at_unix));
        matches.truncate(limit);
        Ok(matches)
    }

    async fn get(&self, job_id: JobId) -> Result<AnalyzeResult> {
        self.results
            .get(&job_id)
            .map(|r| r.clone())
            .ok_or_else(|| AfasError::NotFound(format!("report {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(job_id: JobId, asset_id: i64, created_at: u64) -> AnalyzeResult {
        AnalyzeResult {
            job_id,
            host_info: None,
            device: Some(Device {
                asset_id,
                model_id: 1,
                hostname: None,
            }),
            reports: vec![],
            created_at_unix: created_at,
        }
    }

    #[tokio::test]
    async fn persists_and_fetches_by_job_id() {
        let store = InMemoryReportStore::new();
        let job_id = JobId::new();
        store.persist(sample(job_id, 1, 1)).await.unwrap();
        let fetched = store.get(job_id).await.unwrap();
        assert_eq!(fetched.job_id, job_id);
    }

    #[tokio::test]
    async fn search_by_asset_id_orders_newest_first() {
        let store = InMemoryReportStore::new();
        store.persist(sample(JobId::new(), 42, 10)).await.unwrap();
        store.persist(sample(JobId::new(), 42, 20)).await.unwrap();
        store.persist(sample(JobId::new(), 7, 30)).await.unwrap();

        let results = store
            .search(
                &ReportFilter {
                    job_id: None,
                    asset_id: Some(42),
                },
                10,
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].created_at_unix, 20);
    }

    #[tokio::test]
    async fn search_respects_limit() {
        let store = InMemoryReportStore::new();
        for i in 0..5 {
            store.persist(sample(JobId::new(), 1, i)).await.unwrap();
        }
        let results = store
            .search(&ReportFilter::default(), 2)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn get_unknown_job_id_is_not_found() {
        let store = InMemoryReportStore::new();
        assert!(matches!(
            store.get(JobId::new()).await,
            Err(AfasError::NotFound(_))
        ));
    }
}
