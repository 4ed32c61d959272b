pub mod builtin;
pub mod calculator;
pub mod contract;
pub mod registry;

pub use calculator::{DataCalculator, DerivationCache, DerivationKey, Materialized};
pub use contract::{Analyzer, AnalyzerId, AnalyzerInput, AnalyzerOutput};
pub use registry::Registry;
