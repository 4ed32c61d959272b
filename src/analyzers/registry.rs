//! Analyzer registry (C6): O(1) lookup by stable string ID, built once at
//! controller construction. Mirrors the original's
//! `analyzers.NewRegistryWithKnownAnalyzers`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analyzers::builtin::{IntelAcmPolicyAnalyzer, Pcr0ReplayAnalyzer};
use crate::analyzers::contract::{Analyzer, AnalyzerId};
use crate::error::{AfasError, Result};

pub struct Registry {
    analyzers: HashMap<AnalyzerId, Arc<dyn Analyzer>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            analyzers: HashMap::new(),
        }
    }

    pub fn with_known_analyzers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(IntelAcmPolicyAnalyzer));
        registry.register(Arc::new(Pcr0ReplayAnalyzer));
        registry
    }

    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers.insert(analyzer.id(), analyzer);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn Analyzer>> {
        self.analyzers
            .get(id)
            .cloned()
            .ok_or_else(|| AfasError::NoSuchAnalyzer(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &AnalyzerId> {
        self.analyzers.keys()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_known_analyzers()
    }
}
