//! Configuration layer (C11): a `clap::Parser` CLI struct in the teacher's
//! own style, resolved `CLI flag > environment variable > default` via
//! clap's `env` attribute.

use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use crate::firmware::models::CachingPolicy;

const DEFAULT_CACHE_SIZE: usize = 100;
const DEFAULT_MAX_CONCURRENT_ANALYZERS: usize = 16;
const DEFAULT_PER_ANALYZER_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PURGE_TIMEOUT_SECS: u64 = 5 * 60;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    #[clap(long, env, default_value = "0.0.0.0:8080")]
    pub listen_addr: String,
    #[clap(long, env, default_value = "0.0.0.0:9090")]
    pub metrics_listen_addr: String,
    #[clap(long, env, default_value = "info")]
    pub log_level: LevelFilter,

    #[clap(long, env, default_value_t = DEFAULT_PURGE_TIMEOUT_SECS)]
    pub api_cache_purge_timeout_secs: u64,
    #[clap(long, env, default_value_t = DEFAULT_MAX_CONCURRENT_ANALYZERS)]
    pub max_concurrent_analyzers: usize,
    #[clap(long, env, default_value_t = DEFAULT_PER_ANALYZER_TIMEOUT_SECS)]
    pub per_analyzer_timeout_secs: u64,
    #[clap(long, env, value_enum, default_value = "use-cache")]
    pub caching_policy: CliCachingPolicy,
    #[clap(long, env, default_value_t = DEFAULT_CACHE_SIZE)]
    pub firmware_cache_size: usize,

    /// When set, backs the object store with a filesystem directory;
    /// otherwise an in-memory store is used.
    #[clap(long, env)]
    pub object_store_root: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum CliCachingPolicy {
    UseCache,
    BypassCache,
    WriteThrough,
}

impl From<CliCachingPolicy> for CachingPolicy {
    fn from(value: CliCachingPolicy) -> Self {
        match value {
            CliCachingPolicy::UseCache => CachingPolicy::UseCache,
            CliCachingPolicy::BypassCache => CachingPolicy::BypassCache,
            CliCachingPolicy::WriteThrough => CachingPolicy::WriteThrough,
        }
    }
}

impl Cli {
    pub fn api_cache_purge_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.api_cache_purge_timeout_secs)
    }

    pub fn per_analyzer_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.per_analyzer_timeout_secs)
    }
}
