//! Image parse cache (C4): single-flight parse of firmware bytes into a
//! `ParsedImage` tree.
//!
//! `FirmwareParser` stands in for the out-of-scope UEFI/fiano parser named
//! in the original source (`uefi.ParseUEFIFirmwareBytes`). The default
//! implementation is a minimal firmware-volume header scanner: real volume
//! and file-system parsing belongs to analyzer logic, which is out of
//! scope here, but the *contract* — parse once, memoize by identity, return
//! a tree-shaped summary, surface-but-don't-cache failures — is exercised
//! end to end.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{AfasError, Result};
use crate::firmware::models::{FirmwareVolume, ParsedImage};
use crate::identity::Identity;
use crate::lockmap::LockMap;

/// Standard UEFI firmware volume header signature, `_FVH`, found 40 bytes
/// into each volume header, with the volume length stored as a little
/// endian u64 at offset 32.
const FVH_SIGNATURE: &[u8; 4] = b"_FVH";
const FVH_SIGNATURE_OFFSET: usize = 40;
const FVH_LENGTH_OFFSET: usize = 32;
const FVH_HEADER_MIN_LEN: usize = 64;

/// Explicit parser configuration, threaded in at construction instead of
/// toggled as process-wide globals the way the original source does
/// (`fianoUEFI.ReadOnly = true`, etc. in an `init()`).
#[derive(Clone, Copy, Debug)]
pub struct ParserConfig {
    pub read_only: bool,
    pub disable_decompression: bool,
    pub suppress_erase_polarity_error: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            disable_decompression: true,
            suppress_erase_polarity_error: true,
        }
    }
}

pub trait FirmwareParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedImage>;
}

/// Scans for `_FVH` volume headers. Not a validating UEFI parser — it
/// trusts header-declared lengths to skip forward, which is sufficient to
/// exercise the single-flight contract without pulling in a real firmware
/// volume parser (out of scope; see analyzer logic).
pub struct FvhScanningParser {
    config: ParserConfig,
}

impl FvhScanningParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }
}

impl FirmwareParser for FvhScanningParser {
    fn parse(&self, bytes: &[u8]) -> Result<ParsedImage> {
        if bytes.is_empty() {
            return Err(AfasError::InvalidArgument(
                "firmware image is empty".to_string(),
            ));
        }

        let _ = self.config; // parser behavior flags apply inside the (out-of-scope) real parser

        let mut volumes = Vec::new();
        let mut offset = 0usize;
        let mut truncated = false;

        while offset + FVH_HEADER_MIN_LEN <= bytes.len() {
            let signature_at = offset + FVH_SIGNATURE_OFFSET;
            if signature_at + 4 > bytes.len() {
                truncated = true;
                break;
            }
            if &bytes[signature_at..signature_at + 4] == FVH_SIGNATURE {
                let length_at = offset + FVH_LENGTH_OFFSET;
                let length_bytes: [u8; 4] = bytes[length_at..length_at + 4]
                    .try_into()
                    .map_err(|_| AfasError::Internal("volume length read out of bounds".into()))?;
                let length = u32::from_le_bytes(length_bytes);
                if length == 0 {
                    offset += 1;
                    continue;
                }
                volumes.push(FirmwareVolume { offset, length });
                let advance = length as usize;
                if advance == 0 || offset.saturating_add(advance) <= offset {
                    break;
                }
                offset += advance;
            } else {
                offset += 1;
            }
        }

        Ok(ParsedImage {
            size: bytes.len(),
            volumes,
            truncated,
        })
    }
}

/// Coalesces concurrent parses of the same image bytes via the keyed lock
/// map (C1), caching the successful result and letting failures retry.
pub struct ParseCache {
    locks: LockMap<ParsedImage>,
    parser: Arc<dyn FirmwareParser>,
}

impl ParseCache {
    pub fn new(parser: Arc<dyn FirmwareParser>) -> Self {
        Self {
            locks: LockMap::new(),
            parser,
        }
    }

    #[instrument(skip(self, bytes))]
    pub async fn parse(&self, bytes: &[u8]) -> Result<ParsedImage> {
        let identity = Identity::of(bytes);
        let key = identity.to_hex();
        let mut guard = self.locks.lock(&key).await;

        if let Some(cached) = guard.user_data() {
            debug!(identity = %identity, "parse cache hit");
            return Ok(cached.clone());
        }

        debug!(identity = %identity, "parse cache miss, invoking parser");
        let parsed = self.parser.parse(bytes)?;
        guard.set_user_data(parsed.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingParser {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl FirmwareParser for CountingParser {
        fn parse(&self, bytes: &[u8]) -> Result<ParsedImage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(ParsedImage {
                size: bytes.len(),
                volumes: vec![],
                truncated: false,
            })
        }
    }

    #[test]
    fn finds_a_volume_header() {
        let mut image = vec![0u8; 128];
        image[40..44].copy_from_slice(b"_FVH");
        image[32..36].copy_from_slice(&64u32.to_le_bytes());
        let parser = FvhScanningParser::new(ParserConfig::default());
        let parsed = parser.parse(&image).unwrap();
        assert_eq!(parsed.volumes.len(), 1);
        assert_eq!(parsed.volumes[0].offset, 0);
        assert_eq!(parsed.volumes[0].length, 64);
    }

    #[test]
    fn empty_input_is_rejected() {
        let parser = FvhScanningParser::new(ParserConfig::default());
        assert!(parser.parse(&[]).is_err());
    }

    #[tokio::test]
    async fn concurrent_parses_of_same_bytes_invoke_parser_once() {
        let parser = Arc::new(CountingParser {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(20),
        });
        let cache = Arc::new(ParseCache::new(parser.clone()));
        let bytes = Arc::new(vec![7u8; 4096]);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let bytes = Arc::clone(&bytes);
            handles.push(tokio::spawn(async move { cache.parse(&bytes).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert_eq!(parser.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_parse_is_not_cached_and_retries() {
        struct FlakyParser {
            calls: AtomicUsize,
        }
        impl FirmwareParser for FlakyParser {
            fn parse(&self, bytes: &[u8]) -> Result<ParsedImage> {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(AfasError::Internal("simulated parser failure".into()))
                } else {
                    Ok(ParsedImage {
                        size: bytes.len(),
                        volumes: vec![],
                        truncated: false,
                    })
                }
            }
        }
        let parser = Arc::new(FlakyParser {
            calls: AtomicUsize::new(0),
        });
        let cache = ParseCache::new(parser);

        assert!(cache.parse(b"abc").await.is_err());
        assert!(cache.parse(b"abc").await.is_ok());
    }
}
