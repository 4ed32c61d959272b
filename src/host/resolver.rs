//! Host info resolver (C5): merges client-supplied host info with
//! authoritative device directory lookups.
//!
//! Mirrors the resolution order of the original `getHostInfo`: trusted
//! hostname (when the client claims to analyze itself) first, then asset
//! id, then hostname, first success wins, failures are logged and
//! non-fatal.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::host::directory::DeviceDirectory;
use crate::host::models::{Device, HostInfo};

pub struct HostInfoResolver {
    directory: Arc<dyn DeviceDirectory>,
}

impl HostInfoResolver {
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves `request_host_info`, optionally informed by a trusted
    /// hostname extracted from the transport's authentication context (the
    /// HTTP analogue of the original's TLS client-identity extraction — see
    /// `SPEC_FULL.md` Open Questions).
    #[instrument(skip(self, request_host_info), fields(
        asset_id = request_host_info.as_ref().and_then(|h| h.asset_id),
        hostname = request_host_info.as_ref().and_then(|h| h.hostname.clone()),
    ))]
    pub async fn resolve(
        &self,
        request_host_info: Option<HostInfo>,
        trusted_hostname: Option<&str>,
    ) -> (Option<HostInfo>, Option<Device>) {
        let Some(request_host_info) = request_host_info else {
            return (None, None);
        };

        let mut result_host_info = request_host_info.clone();
        let device = self.find_device(&request_host_info, trusted_hostname).await;

        if let Some(device) = &device {
            Self::overlay(device, &mut result_host_info);
        }

        (Some(result_host_info), device)
    }

    async fn find_device(
        &self,
        request_host_info: &HostInfo,
        trusted_hostname: Option<&str>,
    ) -> Option<Device> {
        if request_host_info.is_client_host_analyzed {
            if let Some(hostname) = trusted_hostname {
                debug!(hostname, "detected trusted transport identity hostname");
                match self.directory.get_device_by_hostname(hostname).await {
                    Ok(device) => return Some(device),
                    Err(e) => warn!(hostname, error = %e, "failed to get device by trusted hostname"),
                }
            }
        }

        if let Some(asset_id) = request_host_info.asset_id {
            match self.directory.get_device_by_asset_id(asset_id).await {
                Ok(device) => return Some(device),
                Err(e) => warn!(asset_id, error = %e, "failed to get device by asset id"),
            }
        }

        if let Some(hostname) = &request_host_info.hostname {
            match self.directory.get_device_by_hostname(hostname).await {
                Ok(device) => return Some(device),
                Err(e) => warn!(hostname, error = %e, "failed to get device by hostname"),
            }
        }

        None
    }

    /// Overlays the directory's authoritative fields onto a copy of the
    /// caller's host info, never mutating the caller's original struct.
    fn overlay(device: &Device, host_info: &mut HostInfo) {
        host_info.asset_id = Some(device.asset_id);
        host_info.model_id = Some(device.model_id);
        if device.hostname.is_some() {
            host_info.hostname = device.hostname.clone();
        }
    }
}
