use autosign_identity::{KeyVault, PrivateKey, PublicKey};
use autosign_types::{Digest, Name, PermissionLevel, Timestamp};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// How far an approved setup has progressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetupStage {
    /// Consent given, key generated, setup actions not yet injected.
    Approved,
    /// Setup actions were prepended to the transaction whose action list
    /// hashes to `fingerprint`.
    Injected { fingerprint: Digest },
}

/// A generated key waiting for its setup transaction to be accepted.
///
/// Lives only in memory; nothing here is persisted.
pub struct PendingSetup {
    pub key: PrivateKey,
    pub stage: SetupStage,
    pub created: Timestamp,
    pub expires: Timestamp,
}

/// Approved setups per (session authority, contract), each with a bounded
/// lifetime.
pub struct PendingSetups {
    entries: Arc<RwLock<HashMap<(PermissionLevel, Name), PendingSetup>>>,
    ttl: i64,
}

impl PendingSetups {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: ttl_seconds,
        }
    }

    /// Generate a fresh key for `contract`, replacing any earlier pending one.
    pub fn approve(&self, owner: &PermissionLevel, contract: Name) -> PublicKey {
        let (key, public) = KeyVault::generate();
        let now = chrono::Utc::now().timestamp();
        self.entries.write().unwrap().insert(
            (*owner, contract),
            PendingSetup {
                key,
                stage: SetupStage::Approved,
                created: now,
                expires: now.saturating_add(self.ttl),
            },
        );
        public
    }

    pub fn contains(&self, owner: &PermissionLevel, contract: &Name) -> bool {
        self.entries
            .read()
            .unwrap()
            .contains_key(&(*owner, *contract))
    }

    pub fn stage(&self, owner: &PermissionLevel, contract: &Name) -> Option<SetupStage> {
        self.entries
            .read()
            .unwrap()
            .get(&(*owner, *contract))
            .map(|p| p.stage)
    }

    pub fn public_key(&self, owner: &PermissionLevel, contract: &Name) -> Option<PublicKey> {
        self.entries
            .read()
            .unwrap()
            .get(&(*owner, *contract))
            .map(|p| p.key.public_key())
    }

    /// Every contract pending for `owner`, with its stage.
    pub fn stages(&self, owner: &PermissionLevel) -> HashMap<Name, SetupStage> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter(|((o, _), _)| o == owner)
            .map(|((_, c), p)| (*c, p.stage))
            .collect()
    }

    /// Returns false if nothing is pending for `contract`.
    pub fn mark_injected(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        fingerprint: Digest,
    ) -> bool {
        match self.entries.write().unwrap().get_mut(&(*owner, *contract)) {
            Some(pending) => {
                pending.stage = SetupStage::Injected { fingerprint };
                true
            }
            None => false,
        }
    }

    /// Remove and return the pending key for `contract`.
    pub fn take(&self, owner: &PermissionLevel, contract: &Name) -> Option<PrivateKey> {
        self.entries
            .write()
            .unwrap()
            .remove(&(*owner, *contract))
            .map(|p| p.key)
    }

    pub fn discard(&self, owner: &PermissionLevel, contract: &Name) -> bool {
        self.entries
            .write()
            .unwrap()
            .remove(&(*owner, *contract))
            .is_some()
    }

    /// Drop `owner`'s injected setups whose transaction is not the one
    /// being evaluated now. Returns the discarded contracts.
    pub fn discard_stale(&self, owner: &PermissionLevel, fingerprint: &Digest) -> Vec<Name> {
        let mut entries = self.entries.write().unwrap();
        let stale: Vec<(PermissionLevel, Name)> = entries
            .iter()
            .filter(|((o, _), p)| {
                o == owner
                    && matches!(
                        p.stage,
                        SetupStage::Injected { fingerprint: f } if f != *fingerprint
                    )
            })
            .map(|(k, _)| *k)
            .collect();
        for k in &stale {
            entries.remove(k);
        }
        stale.into_iter().map(|(_, c)| c).collect()
    }

    /// Remove expired entries of every session.
    pub fn cleanup(&self) -> Vec<(PermissionLevel, Name)> {
        let now = chrono::Utc::now().timestamp();
        let mut entries = self.entries.write().unwrap();
        let expired: Vec<(PermissionLevel, Name)> = entries
            .iter()
            .filter(|(_, p)| now > p.expires)
            .map(|(k, _)| *k)
            .collect();
        for k in &expired {
            entries.remove(k);
        }
        expired
    }

    /// Drop everything pending for `owner`.
    pub fn clear(&self, owner: &PermissionLevel) {
        self.entries.write().unwrap().retain(|(o, _), _| o != owner);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
