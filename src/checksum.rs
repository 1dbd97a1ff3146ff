// src/checksum.rs

//! Checksum files for produced packages
//!
//! When `PACKAGE_CHECKSUM` names an algorithm, every final artifact gets a
//! sibling file `<stem>.<algo>` holding `<hex digest>  <file name>\n`, the
//! format understood by `sha256sum -c` and friends.

use crate::error::{Error, Result};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Lower-case name, also used as the checksum file extension
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha1 => "sha1",
            Self::Sha224 => "sha224",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA1" => Ok(Self::Sha1),
            "SHA224" => Ok(Self::Sha224),
            "SHA256" => Ok(Self::Sha256),
            "SHA384" => Ok(Self::Sha384),
            "SHA512" => Ok(Self::Sha512),
            _ => Err(Error::config(format!(
                "cannot recognize algorithm '{}' in PACKAGE_CHECKSUM",
                s
            ))),
        }
    }
}

fn digest_reader<D: Digest, R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Hex digest of a reader's content
pub fn hash_reader<R: Read>(algorithm: ChecksumAlgorithm, reader: &mut R) -> io::Result<String> {
    match algorithm {
        ChecksumAlgorithm::Md5 => digest_reader::<Md5, _>(reader),
        ChecksumAlgorithm::Sha1 => digest_reader::<Sha1, _>(reader),
        ChecksumAlgorithm::Sha224 => digest_reader::<Sha224, _>(reader),
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, _>(reader),
        ChecksumAlgorithm::Sha384 => digest_reader::<Sha384, _>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512, _>(reader),
    }
}

/// Hex digest of a byte slice
pub fn hash_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut reader = data;
    // Reading from a slice cannot fail
    hash_reader(algorithm, &mut reader).unwrap_or_default()
}

/// Hex digest of a file
pub fn hash_file(algorithm: ChecksumAlgorithm, path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    Ok(hash_reader(algorithm, &mut file)?)
}

/// Write the checksum file for a package
///
/// `extension` is stripped from the package file name to form the stem.
/// Returns the path of the written checksum file.
pub fn write_checksum_file(
    algorithm: ChecksumAlgorithm,
    package: &Path,
    extension: &str,
) -> Result<PathBuf> {
    let file_name = package
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::MissingArtifact(package.to_path_buf()))?;
    let stem = if extension.is_empty() {
        file_name.as_str()
    } else {
        file_name.strip_suffix(extension).unwrap_or(&file_name)
    };
    let digest = hash_file(algorithm, package)?;
    let checksum_path = package.with_file_name(format!("{}.{}", stem, algorithm.name()));
    std::fs::write(&checksum_path, format!("{}  {}\n", digest, file_name))?;
    Ok(checksum_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("sha256".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Sha256);
        assert_eq!("MD5".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Md5);
        assert!(matches!(
            "CRC32".parse::<ChecksumAlgorithm>(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_known_digests() {
        assert_eq!(
            hash_bytes(ChecksumAlgorithm::Sha256, b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
        assert_eq!(
            hash_bytes(ChecksumAlgorithm::Md5, b"hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(
            hash_bytes(ChecksumAlgorithm::Sha1, b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
        assert_eq!(hash_bytes(ChecksumAlgorithm::Sha512, b"").len(), 128);
    }

    #[test]
    fn test_write_checksum_file() {
        let temp = TempDir::new().unwrap();
        let package = temp.path().join("demo-1.0-lib.tar.gz");
        std::fs::write(&package, b"hello world").unwrap();

        let checksum = write_checksum_file(ChecksumAlgorithm::Sha256, &package, ".tar.gz").unwrap();
        assert_eq!(checksum, temp.path().join("demo-1.0-lib.sha256"));
        assert_eq!(
            std::fs::read_to_string(&checksum).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9  demo-1.0-lib.tar.gz\n"
        );
    }
}
