//! Client-supplied evidence about a host's boot state.
//!
//! Modeled as an explicit sum type rather than a generated one-of struct:
//! "exactly one variant set" is then a property of the type itself (and of
//! serde's internally-tagged deserialization), not a runtime field count
//! that can drift out of sync with the schema.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    FirmwareImage,
    TpmEventLog,
    PcrValues,
    StatusRegisters,
    TpmDeviceType,
    /// Not a client-supplied artifact kind; the derived original firmware,
    /// listed alongside the real kinds so analyzer contracts can require it
    /// the same way they require any other input.
    OriginalFirmware,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Artifact {
    FirmwareImage(#[serde(with = "base64_bytes")] Vec<u8>),
    TpmEventLog(#[serde(with = "base64_bytes")] Vec<u8>),
    PcrValues(Vec<PcrValue>),
    StatusRegisters(Vec<u64>),
    TpmDeviceType(TpmDeviceType),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TpmDeviceType {
    Tpm12,
    Tpm20,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PcrValue {
    pub index: u32,
    #[serde(with = "base64_bytes")]
    pub digest: Vec<u8>,
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::FirmwareImage(_) => ArtifactKind::FirmwareImage,
            Artifact::TpmEventLog(_) => ArtifactKind::TpmEventLog,
            Artifact::PcrValues(_) => ArtifactKind::PcrValues,
            Artifact::StatusRegisters(_) => ArtifactKind::StatusRegisters,
            Artifact::TpmDeviceType(_) => ArtifactKind::TpmDeviceType,
        }
    }
}

/// Serializes byte blobs as base64 strings so firmware images and event
/// logs travel safely inside JSON request/response bodies.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
