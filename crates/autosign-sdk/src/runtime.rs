use async_trait::async_trait;
use autosign_types::{Action, AutosignError, ChainId, PermissionLevel, TransactRequest, Transaction};
use serde::{Deserialize, Serialize};

/// Receipt for a transaction the runtime signed and broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactReceipt {
    pub transaction_id: String,
}

/// What the runtime reports after broadcasting a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Accepted { transaction_id: String },
    Rejected { reason: String },
}

/// The wallet/session runtime the hooks run inside.
#[async_trait]
pub trait SessionRuntime: Send + Sync {
    /// The session's own authority, e.g. `alice@active`.
    fn permission_level(&self) -> PermissionLevel;

    fn chain_id(&self) -> ChainId;

    /// Turn a template into a concrete transaction.
    async fn resolve(&self, request: &TransactRequest) -> Result<Transaction, AutosignError>;

    /// Sign with the session's primary credential and broadcast.
    async fn transact(&self, actions: Vec<Action>) -> Result<TransactReceipt, AutosignError>;
}
