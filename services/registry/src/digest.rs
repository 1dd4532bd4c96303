//! Content digests
//!
//! A digest is written `algorithm:encoded`, where the encoded part is the
//! lowercase hex form of the hash. Only the algorithms a Docker Registry v2
//! store can hold are accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Hash algorithm of a digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Algorithm {
    /// SHA-256, encoded as 64 hex characters.
    Sha256,

    /// SHA-512, encoded as 128 hex characters.
    Sha512,
}

impl Algorithm {
    /// The algorithm prefix used in the textual digest form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex encoded hash for this algorithm.
    pub fn encoded_len(&self) -> usize {
        match self {
            Algorithm::Sha256 => 64,
            Algorithm::Sha512 => 128,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" => Ok(Algorithm::Sha256),
            "sha512" => Ok(Algorithm::Sha512),
            other => Err(DigestError::UnsupportedAlgorithm(other.to_owned())),
        }
    }
}

/// Reasons a digest string is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    /// There is no `:` between algorithm and hash.
    #[error("missing ':' between algorithm and hash")]
    MissingSeparator,

    /// The algorithm prefix is not one we accept.
    #[error("unsupported algorithm {0:?}")]
    UnsupportedAlgorithm(String),

    /// The encoded hash has the wrong length or is not lowercase hex.
    #[error("{algorithm} hash must be {expected} lowercase hex characters")]
    Encoding {
        /// Algorithm of the digest
        algorithm: Algorithm,
        /// Expected number of hex characters
        expected: usize,
    },
}

/// A validated content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: Algorithm,
    encoded: String,
}

impl Digest {
    /// Build a digest from an algorithm and a raw hex hash, e.g. a revision
    /// directory name whose algorithm is known from its parent directory.
    pub fn from_raw(algorithm: Algorithm, encoded: impl Into<String>) -> Result<Self, DigestError> {
        let encoded = encoded.into();
        if encoded.len() != algorithm.encoded_len() || !is_lower_hex(&encoded) {
            return Err(DigestError::Encoding {
                algorithm,
                expected: algorithm.encoded_len(),
            });
        }
        Ok(Self { algorithm, encoded })
    }

    /// The hash algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// The hex encoded hash, without the algorithm prefix.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

fn is_lower_hex(value: &str) -> bool {
    value
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (algorithm, encoded) = s.split_once(':').ok_or(DigestError::MissingSeparator)?;
        Digest::from_raw(algorithm.parse()?, encoded)
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.to_string()
    }
}
