use serde::{Deserialize, Serialize};

/// Client-supplied host info. All identifying fields are optional; at least
/// one is required to resolve a `Device` via `HostInfoResolver::resolve`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct HostInfo {
    pub asset_id: Option<i64>,
    pub hostname: Option<String>,
    #[serde(default)]
    pub is_client_host_analyzed: bool,
    pub model_id: Option<i64>,
}

/// An authoritative device record, produced by the device directory and
/// consumed when selecting the original firmware for a host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub asset_id: i64,
    pub model_id: i64,
    pub hostname: Option<String>,
}
