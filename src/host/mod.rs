pub mod directory;
pub mod models;
pub mod resolver;

pub use directory::{DeviceDirectory, InMemoryDeviceDirectory};
pub use models::{Device, HostInfo};
pub use resolver::HostInfoResolver;
