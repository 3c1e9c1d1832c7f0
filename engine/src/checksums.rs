//! Checksums used to verify a transfer after the bytes have moved.
//!
//! Both sides are read back through their ports, so verification works the
//! same for push and pull.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;

use crate::error::EngineError;
use crate::port::TreeSource;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5 (matches what most remote stores report)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            other => Err(format!(
                "unknown checksum algorithm '{}' (expected md5, sha256 or blake3)",
                other
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

enum Hasher {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => {
                use sha2::Digest;
                Hasher::Sha256(sha2::Sha256::new())
            }
            ChecksumAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha256(hasher) => {
                use sha2::Digest;
                hasher.update(data);
            }
            Hasher::Blake3(hasher) => {
                hasher.update(data);
            }
        }
    }

    fn finalize(self) -> ChecksumValue {
        match self {
            Hasher::Md5(ctx) => ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", ctx.compute())),
            Hasher::Sha256(hasher) => {
                use sha2::Digest;
                ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", hasher.finalize()))
            }
            Hasher::Blake3(hasher) => {
                ChecksumValue::new(ChecksumAlgorithm::Blake3, hasher.finalize().to_hex().to_string())
            }
        }
    }
}

/// Hash everything a reader yields.
pub fn checksum_reader<R: Read>(mut reader: R, algorithm: ChecksumAlgorithm) -> io::Result<ChecksumValue> {
    let mut hasher = Hasher::new(algorithm);
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// Hash a file reached through a port.
pub fn checksum_file<S: TreeSource + ?Sized>(
    source: &S,
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    let reader = source
        .open(path)
        .map_err(|e| EngineError::io("open for checksum", path, e))?;
    checksum_reader(reader, algorithm).map_err(|e| EngineError::io("read for checksum", path, e))
}

/// Compare a transferred file on both sides.
///
/// Returns `Ok(false)` on a mismatch; `Err` only if either side can't be read.
pub fn verify_transfer<A, B>(
    source: &A,
    source_path: &Path,
    dest: &B,
    dest_path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<bool, EngineError>
where
    A: TreeSource + ?Sized,
    B: TreeSource + ?Sized,
{
    let expected = checksum_file(source, source_path, algorithm)?;
    let actual = checksum_file(dest, dest_path, algorithm)?;
    Ok(expected == actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::OsLocalFs;
    use crate::remote::MemoryRemote;
    use std::fs;

    #[test]
    fn test_algorithm_display_and_parse() {
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "md5");
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Sha256));
        assert_eq!("blake3".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Blake3));
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_known_digests() {
        let md5 = checksum_reader(&b"hello"[..], ChecksumAlgorithm::Md5).unwrap();
        assert_eq!(md5.hex(), "5d41402abc4b2a76b9719d911017c592");

        let sha = checksum_reader(&b"hello"[..], ChecksumAlgorithm::Sha256).unwrap();
        assert_eq!(
            sha.hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );

        let b3 = checksum_reader(&b"hello"[..], ChecksumAlgorithm::Blake3).unwrap();
        assert_eq!(b3.hex(), blake3::hash(b"hello").to_hex().as_str());
        assert_eq!(b3.algorithm(), ChecksumAlgorithm::Blake3);
    }

    #[test]
    fn test_verify_transfer_across_ports() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let local_path = temp_dir.path().join("a.txt");
        fs::write(&local_path, b"same bytes").expect("write");

        let remote = MemoryRemote::new();
        remote.insert_file("/r/a.txt", "same bytes");
        remote.insert_file("/r/b.txt", "other byte");

        let local = OsLocalFs::new();
        assert!(verify_transfer(&local, &local_path, &remote, Path::new("/r/a.txt"), ChecksumAlgorithm::Sha256).unwrap());
        assert!(!verify_transfer(&local, &local_path, &remote, Path::new("/r/b.txt"), ChecksumAlgorithm::Md5).unwrap());
        assert!(verify_transfer(&local, &local_path, &remote, Path::new("/r/missing"), ChecksumAlgorithm::Blake3).is_err());
    }
}
