use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::{Name, Timestamp};

/// An `actor@permission` pair authorizing an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionLevel {
    pub actor: Name,
    pub permission: Name,
}

impl PermissionLevel {
    pub fn new(actor: Name, permission: Name) -> Self {
        Self { actor, permission }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.actor, self.permission)
    }
}

/// A single contract call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// The contract account the action targets.
    pub account: Name,
    /// The action name on that contract.
    pub name: Name,
    #[serde(default)]
    pub authorization: Vec<PermissionLevel>,
    #[serde(default)]
    pub data: Value,
}

impl Action {
    pub fn new(
        account: Name,
        name: Name,
        authorization: Vec<PermissionLevel>,
        data: Value,
    ) -> Self {
        Self {
            account,
            name,
            authorization,
            data,
        }
    }
}

/// A fully resolved transaction, ready for digest computation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub expiration: Timestamp,
    pub ref_block_num: u16,
    pub ref_block_prefix: u32,
    pub actions: Vec<Action>,
}

/// An unsigned transaction template as handed over by the session runtime.
///
/// Templates may carry placeholder authorizations; turning one into a
/// [`Transaction`] is the runtime's job and is redone on every hook call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactRequest {
    pub actions: Vec<Action>,
}

impl TransactRequest {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    /// The same request with `setup` placed ahead of the original actions.
    pub fn with_prepended(&self, setup: Vec<Action>) -> Self {
        let mut actions = setup;
        actions.extend(self.actions.iter().cloned());
        Self { actions }
    }
}
