mod keypair;
mod matcher;
mod storage;
mod vault;

pub use keypair::{
    PrivateKey, PublicKey, Signature, PRIVATE_KEY_PREFIX, PUBLIC_KEY_PREFIX, SIGNATURE_PREFIX,
};
pub use matcher::{ActionMatcher, ContractGrant, DelegationConfig};
pub use storage::{KeyValueStore, MemoryStore};
pub use vault::KeyVault;
