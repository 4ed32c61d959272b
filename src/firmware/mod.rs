pub mod db;
pub mod models;
pub mod object_store;
pub mod parser;
pub mod storage;

pub use db::{InMemoryMetadataStore, InMemoryOriginalFirmwareDb, MetadataStore, OriginalFirmwareDb};
pub use models::{
    CachingPolicy, FirmwareFilter, FirmwareVolume, ImageMetadata, OriginalFirmwareRecord,
    ParsedImage, ParsedImageSummary,
};
pub use object_store::{FsObjectStore, InMemoryObjectStore, ObjectStore};
pub use parser::{FirmwareParser, FvhScanningParser, ParseCache, ParserConfig};
pub use storage::FirmwareStorageFacade;
