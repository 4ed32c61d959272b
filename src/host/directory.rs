//! Device directory lookup — out of scope per the specification, modeled
//! only through its interface. An in-memory implementation is provided so
//! the engine can run and be tested standalone.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{AfasError, Result};
use crate::host::models::Device;

#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn get_device_by_asset_id(&self, asset_id: i64) -> Result<Device>;
    async fn get_device_by_hostname(&self, hostname: &str) -> Result<Device>;
}

#[derive(Default)]
pub struct InMemoryDeviceDirectory {
    by_asset_id: DashMap<i64, Device>,
    by_hostname: DashMap<String, Device>,
}

impl InMemoryDeviceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device: Device) {
        if let Some(hostname) = &device.hostname {
            self.by_hostname.insert(hostname.clone(), device.clone());
        }
        self.by_asset_id.insert(device.asset_id, device);
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryDeviceDirectory {
    async fn get_device_by_asset_id(&self, asset_id: i64) -> Result<Device> {
        self.by_asset_id
            .get(&asset_id)
            .map(|d| d.clone())
            .ok_or_else(|| AfasError::NotFound(format!("device with asset id {asset_id}")))
    }

    async fn get_device_by_hostname(&self, hostname: &str) -> Result<Device> {
        self.by_hostname
            .get(hostname)
            .map(|d| d.clone())
            .ok_or_else(|| AfasError::NotFound(format!("device with hostname '{hostname}'")))
    }
}
