use semver::Version;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// `{Identity, Size, FirstSeenAt, OptionalParsedSummary}`, uniquely keyed by
/// Identity. Mutated only by `FirmwareStorage::store` on first sight;
/// immutable thereafter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageMetadata {
    #[serde(with = "identity_hex")]
    pub identity: Identity,
    pub size: usize,
    pub first_seen_at_unix: u64,
    pub parsed_summary: Option<ParsedImageSummary>,
}

/// A compact, serializable summary of a `ParsedImage`, suitable for storing
/// alongside the metadata row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParsedImageSummary {
    pub volume_count: usize,
    pub truncated: bool,
}

/// The curated "golden" firmware for a given (model, version). Uniquely
/// addressable by `(version, model_id)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OriginalFirmwareRecord {
    pub model_id: i64,
    pub version: Version,
    pub date_unix: u64,
    #[serde(with = "identity_hex")]
    pub identity: Identity,
    pub source_uri: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CachingPolicy {
    #[default]
    UseCache,
    BypassCache,
    WriteThrough,
}

/// The result of `FirmwareParser::parse`: a lightweight structural summary
/// of a UEFI image, standing in for the out-of-scope full UEFI parse tree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParsedImage {
    pub size: usize,
    pub volumes: Vec<FirmwareVolume>,
    /// True when the scan hit the end of the buffer before it could confirm
    /// whether further volumes follow (e.g. a truncated image).
    pub truncated: bool,
}

impl ParsedImage {
    pub fn summary(&self) -> ParsedImageSummary {
        ParsedImageSummary {
            volume_count: self.volumes.len(),
            truncated: self.truncated,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FirmwareVolume {
    pub offset: usize,
    pub length: u32,
}

mod identity_hex {
    use super::Identity;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(id: &Identity, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&id.to_hex())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Identity, D::Error> {
        let s = String::deserialize(d)?;
        Identity::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid identity hex"))
    }
}

/// Filters accepted by `FirmwareStorage::find_by_version_model` and
/// `SearchFirmware`. `Version`/`ModelId` narrow to exactly one record;
/// broader search filters (used only by `search_firmware`) may be partial.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FirmwareFilter {
    pub model_id: Option<i64>,
    pub version: Option<Version>,
}
