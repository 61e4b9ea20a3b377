mod canonical;
mod name;
mod transaction;

pub use canonical::{canonical_hash, canonicalize};
pub use name::Name;
pub use transaction::{Action, PermissionLevel, TransactRequest, Transaction};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Network identifier mixed into every signing digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl ChainId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 32-byte signing digest (or any other SHA-256 output).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest(#[serde(with = "hex_bytes")] pub [u8; 32]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Unix epoch timestamp in seconds.
pub type Timestamp = i64;

/// Errors shared by every autosign crate.
#[derive(Debug, thiserror::Error)]
pub enum AutosignError {
    #[error("no storage configured for delegated keys")]
    StorageUnavailable,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("setup transaction for {contract} failed: {reason}")]
    SetupTransactionFailed { contract: String, reason: String },
    #[error("stored key for {contract} is unreadable: {reason}")]
    DecodeCorruption { contract: String, reason: String },
    #[error("no delegated key stored for {0}")]
    MissingKey(String),
    #[error("no approved setup pending for {0}")]
    NoPendingSetup(String),
    #[error("invalid name: {0}")]
    InvalidName(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("could not resolve transaction: {0}")]
    Resolve(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Serde helper for fixed-size byte arrays as hex strings.
mod hex_bytes {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}
