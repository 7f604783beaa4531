//! Snapshot checksums.
//!
//! SHA256 fingerprints detect truncated or corrupted transfers: the export
//! is hashed where it was written, the copy is hashed where it landed, and
//! the two must match before anything is imported.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

/// Compute the SHA256 of in-memory bytes as lowercase hex.
#[must_use]
pub fn bytes_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Compute the SHA256 of a file as lowercase hex, streaming its content.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_checksum(path: &Path) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Extract the digest from `sha256sum` / `shasum -a 256` output.
///
/// Both print `<hex>  <path>`; returns `None` unless the first field is a
/// 64 character hex string.
#[must_use]
pub fn parse_checksum_output(output: &str) -> Option<String> {
    let digest = output.split_whitespace().next()?;
    if digest.len() == 64 && digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}
