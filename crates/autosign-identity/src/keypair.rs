use autosign_types::{AutosignError, Digest};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const PRIVATE_KEY_PREFIX: &str = "PVT_K1_";
pub const PUBLIC_KEY_PREFIX: &str = "PUB_K1_";
pub const SIGNATURE_PREFIX: &str = "SIG_K1_";

/// A secp256k1 private key held locally for delegated signing.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Generate a new random key from the OS CSPRNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self { signing_key }
    }

    /// Restore from raw secret scalar bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, AutosignError> {
        let signing_key = SigningKey::from_slice(secret)
            .map_err(|e| AutosignError::InvalidKey(e.to_string()))?;
        Ok(Self { signing_key })
    }

    /// Raw secret scalar bytes.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes().into()
    }

    /// Text form, `PVT_K1_<hex>`.
    pub fn to_key_string(&self) -> String {
        format!("{PRIVATE_KEY_PREFIX}{}", hex::encode(self.to_bytes()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.signing_key.verifying_key())
    }

    /// Produce a recoverable signature over a precomputed digest.
    pub fn sign_digest(&self, digest: &Digest) -> Result<Signature, AutosignError> {
        let (signature, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(digest.as_bytes())
            .map_err(|e| AutosignError::Signing(e.to_string()))?;

        let mut bytes = [0u8; 65];
        bytes[0] = recovery_id.to_byte() + 31;
        bytes[1..].copy_from_slice(&signature.to_bytes());
        Ok(Signature(bytes))
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PrivateKey {}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({})", self.public_key())
    }
}

impl FromStr for PrivateKey {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(PRIVATE_KEY_PREFIX)
            .ok_or_else(|| AutosignError::InvalidKey("missing private key prefix".into()))?;
        let secret: [u8; 32] = hex::decode(body)
            .map_err(|e| AutosignError::InvalidKey(e.to_string()))?
            .try_into()
            .map_err(|_| AutosignError::InvalidKey("expected 32 key bytes".into()))?;
        Self::from_bytes(&secret)
    }
}

/// A compressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; 33]);

impl PublicKey {
    fn from_verifying_key(key: &VerifyingKey) -> Self {
        let mut bytes = [0u8; 33];
        bytes.copy_from_slice(key.to_encoded_point(true).as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AutosignError> {
        let key = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| AutosignError::InvalidKey(e.to_string()))?;
        Ok(Self::from_verifying_key(&key))
    }

    pub fn as_bytes(&self) -> &[u8; 33] {
        &self.0
    }

    fn verifying_key(&self) -> Result<VerifyingKey, AutosignError> {
        VerifyingKey::from_sec1_bytes(&self.0).map_err(|e| AutosignError::InvalidKey(e.to_string()))
    }

    /// Check `signature` against `digest` for this key.
    pub fn verify_digest(&self, digest: &Digest, signature: &Signature) -> bool {
        let Ok(key) = self.verifying_key() else {
            return false;
        };
        let Ok(sig) = signature.ecdsa() else {
            return false;
        };
        key.verify_prehash(digest.as_bytes(), &sig).is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{PUBLIC_KEY_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({self})")
    }
}

impl FromStr for PublicKey {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(PUBLIC_KEY_PREFIX)
            .ok_or_else(|| AutosignError::InvalidKey("missing public key prefix".into()))?;
        let bytes = hex::decode(body).map_err(|e| AutosignError::InvalidKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A recoverable signature: `[recovery_id + 31, r, s]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; 65]);

impl Signature {
    pub fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    fn ecdsa(&self) -> Result<EcdsaSignature, AutosignError> {
        EcdsaSignature::from_slice(&self.0[1..]).map_err(|e| AutosignError::Signing(e.to_string()))
    }

    /// Recover the public key that produced this signature over `digest`.
    pub fn recover(&self, digest: &Digest) -> Result<PublicKey, AutosignError> {
        let recovery_id = self.0[0]
            .checked_sub(31)
            .and_then(RecoveryId::from_byte)
            .ok_or_else(|| AutosignError::Signing("bad recovery id".into()))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &self.ecdsa()?, recovery_id)
            .map_err(|e| AutosignError::Signing(e.to_string()))?;
        Ok(PublicKey::from_verifying_key(&key))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SIGNATURE_PREFIX}{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_string();
        write!(f, "Signature({}..)", &text[..SIGNATURE_PREFIX.len() + 16])
    }
}

impl FromStr for Signature {
    type Err = AutosignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix(SIGNATURE_PREFIX)
            .ok_or_else(|| AutosignError::Signing("missing signature prefix".into()))?;
        let bytes: [u8; 65] = hex::decode(body)
            .map_err(|e| AutosignError::Signing(e.to_string()))?
            .try_into()
            .map_err(|_| AutosignError::Signing("expected 65 signature bytes".into()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
