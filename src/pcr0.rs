//! PCR0 extend-chain computation for `report_host_configuration`.
//!
//! A TPM PCR starts at an all-zero value and is updated only by
//! "extending": `pcr = hash(pcr || measurement)`. This computes the
//! resulting PCR0 value for both the SHA-1 and SHA-256 banks given an
//! ordered list of measurement digests, matching how a real TPM would fold
//! boot-time measurements into PCR0.

use sha1::Sha1;
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pcr0Digests {
    pub sha1: Vec<u8>,
    pub sha256: Vec<u8>,
}

pub fn compute_pcr0(measurements: &[Vec<u8>]) -> Pcr0Digests {
    Pcr0Digests {
        sha1: extend_chain::<Sha1>(measurements, 20),
        sha256: extend_chain::<Sha256>(measurements, 32),
    }
}

fn extend_chain<D: Digest>(measurements: &[Vec<u8>], digest_len: usize) -> Vec<u8> {
    let mut pcr = vec![0u8; digest_len];
    for measurement in measurements {
        let mut hasher = D::new();
        hasher.update(&pcr);
        hasher.update(measurement);
        pcr = hasher.finalize().to_vec();
    }
    pcr
}
