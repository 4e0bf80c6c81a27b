//! Content fingerprints: 128-bit XXH3 over a byte stream.
//!
//! Fingerprints are used only to decide whether two byte sequences are the
//! same. They are not a security boundary.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use xxhash_rust::xxh3::{xxh3_128, Xxh3};

const READ_BUFFER: usize = 64 * 1024;

/// Fixed-width digest of a byte sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u128);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

/// Fingerprint an in-memory byte sequence.
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    Fingerprint(xxh3_128(bytes))
}

/// Fingerprint everything `reader` yields until EOF.
///
/// Read failures are returned as-is.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<Fingerprint> {
    let mut hasher = Xxh3::new();
    let mut buf = vec![0u8; READ_BUFFER];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buf[..n]);
    }
    Ok(Fingerprint(hasher.digest128()))
}

/// Fingerprint the file at `path`.
pub fn fingerprint_file(path: &Path) -> io::Result<Fingerprint> {
    fingerprint_reader(File::open(path)?)
}
