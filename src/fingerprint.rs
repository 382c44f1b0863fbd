//! Content fingerprints used as a cheap equality proxy between runs.
//!
//! A fingerprint is the first 128 bits of a Blake3 digest, hex encoded
//! (32 lowercase chars). Inputs are vendor pages, not adversarial data, so
//! the goal is change detection and not tamper resistance.

const DIGEST_BYTES: usize = 16;

/// Hex length of every fingerprint.
#[cfg(test)]
const FINGERPRINT_LEN: usize = DIGEST_BYTES * 2;

pub fn fingerprint(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hex::encode(&hash.as_bytes()[..DIGEST_BYTES])
}
