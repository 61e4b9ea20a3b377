use autosign_identity::{PrivateKey, Signature};
use autosign_types::{canonical_hash, AutosignError, ChainId, Digest, Transaction};
use sha2::{Digest as _, Sha256};

/// Digest and signature primitives of the target chain.
pub trait SigningProvider: Send + Sync {
    fn digest(&self, transaction: &Transaction, chain_id: &ChainId)
        -> Result<Digest, AutosignError>;

    fn sign(&self, key: &PrivateKey, digest: &Digest) -> Result<Signature, AutosignError> {
        key.sign_digest(digest)
    }
}

/// Signs SHA-256(chain_id || SHA-256(canonical JSON) || 32 zero bytes).
///
/// The layout mirrors the chain's signing preimage but hashes canonical
/// JSON instead of the packed binary transaction, so its signatures are
/// not accepted on-chain. Hosts with a native packer supply their own
/// [`SigningProvider`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CanonicalJsonSigner;

impl SigningProvider for CanonicalJsonSigner {
    fn digest(
        &self,
        transaction: &Transaction,
        chain_id: &ChainId,
    ) -> Result<Digest, AutosignError> {
        let value = serde_json::to_value(transaction)
            .map_err(|e| AutosignError::Serialization(e.to_string()))?;
        let body = canonical_hash(&value);

        let mut hasher = Sha256::new();
        hasher.update(chain_id.0);
        hasher.update(body.as_bytes());
        hasher.update([0u8; 32]);
        Ok(Digest(hasher.finalize().into()))
    }
}
