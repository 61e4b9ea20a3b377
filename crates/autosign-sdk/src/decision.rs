//! Host-independent decisions for the transact and login hooks.
//!
//! Both functions are pure: they read a [`SessionView`] snapshot and return
//! what should happen. The controller gathers the snapshot and carries the
//! decision out.

use autosign_identity::{ActionMatcher, DelegationConfig};
use autosign_types::{Name, Transaction};
use std::collections::{HashMap, HashSet};

use crate::pending::SetupStage;

/// Delegation state as seen at the start of one hook call.
#[derive(Clone, Debug, Default)]
pub struct SessionView {
    pub storage_available: bool,
    /// Contracts with a persisted key.
    pub active: HashSet<Name>,
    /// Contracts with an approved setup awaiting on-chain confirmation.
    pub pending: HashMap<Name, SetupStage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassReason {
    StorageUnavailable,
    NoQualifyingAction,
    /// Some actions qualify, but not all of them under active keys.
    PartialQualification,
    SetupAlreadyInjected,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactDecision {
    /// Leave the transaction to the ordinary wallet-prompted path.
    PassThrough(PassReason),
    /// Prepend the pending setup actions for `contract`.
    InjectSetup { contract: Name },
    /// Every action qualifies and every involved contract has a key.
    SignLocally { contracts: Vec<Name> },
    /// Ask the user to enable delegation for `contract`.
    RequestConsent { contract: Name, actions: Vec<Name> },
}

pub fn plan_transact(
    matcher: &ActionMatcher,
    transaction: &Transaction,
    view: &SessionView,
) -> TransactDecision {
    if !view.storage_available {
        return TransactDecision::PassThrough(PassReason::StorageUnavailable);
    }

    let involved = matcher.involved_contracts(&transaction.actions);
    if involved.is_empty() {
        return TransactDecision::PassThrough(PassReason::NoQualifyingAction);
    }

    // Only the first eligible contract is set up per attempt.
    if let Some(contract) = involved
        .iter()
        .find(|c| !view.active.contains(*c) && view.pending.contains_key(*c))
    {
        return TransactDecision::InjectSetup {
            contract: *contract,
        };
    }

    if matcher.all_qualify(&transaction.actions)
        && involved.iter().all(|c| view.active.contains(c))
    {
        return TransactDecision::SignLocally { contracts: involved };
    }

    if let Some(contract) = involved.iter().find(|c| !view.active.contains(*c)) {
        return TransactDecision::RequestConsent {
            contract: *contract,
            actions: matcher.config().actions_for(contract),
        };
    }

    TransactDecision::PassThrough(PassReason::PartialQualification)
}

/// Configured contracts the login hook should offer to set up.
pub fn plan_login(config: &DelegationConfig, view: &SessionView) -> Vec<Name> {
    if !view.storage_available {
        return Vec::new();
    }
    config
        .contracts()
        .into_iter()
        .filter(|c| !view.active.contains(c))
        .filter(|c| !matches!(view.pending.get(c), Some(SetupStage::Injected { .. })))
        .collect()
}
