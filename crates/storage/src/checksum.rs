//! Checksum algorithms for sibling checksum files.
//!
//! A checksum for `lib-1.0.jar` is stored next to it as `lib-1.0.jar.sha256`
//! (hex digest only, no file name suffix).

use crate::error::{Error, ErrorKind};
use sha2::{Digest, Sha256, Sha512};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// File extensions that mark a checksum file, including legacy digests that
/// are recognised but never generated.
pub const CHECKSUM_EXTENSIONS: [&str; 5] = ["md5", "sha1", "sha256", "sha512", "blake3"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha512,
    Blake3,
}
impl ChecksumAlgorithm {
    pub const ALL: [ChecksumAlgorithm; 3] = [Self::Sha256, Self::Sha512, Self::Blake3];

    /// Extension (without leading dot) of the sibling checksum file.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
            Self::Blake3 => "blake3",
        }
    }

    /// Lowercase hex digest of `data`.
    #[must_use]
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            Self::Sha256 => hex::encode(Sha256::digest(data)),
            Self::Sha512 => hex::encode(Sha512::digest(data)),
            Self::Blake3 => blake3::hash(data).to_hex().to_string(),
        }
    }

    /// Sibling file name holding the checksum for `file_name`.
    #[must_use]
    pub fn sibling(&self, file_name: &str) -> String {
        format!("{file_name}.{}", self.extension())
    }
}
impl FromStr for ChecksumAlgorithm {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            "blake3" => Ok(Self::Blake3),
            _ => exn::bail!(ErrorKind::UnsupportedAlgorithm(s.to_string())),
        }
    }
}
impl Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.extension())
    }
}

/// Returns `true` if `file_name` ends in a known checksum extension.
#[must_use]
pub fn is_checksum_file(file_name: &str) -> bool {
    file_name
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| !stem.is_empty() && CHECKSUM_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
