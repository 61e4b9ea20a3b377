use autosign_identity::{
    ActionMatcher, KeyValueStore, KeyVault, PrivateKey, PublicKey, Signature,
};
use autosign_permission::PermissionSetupBuilder;
use autosign_types::{
    canonical_hash, Action, AutosignError, ChainId, Digest, Name, PermissionLevel, Transaction,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::config::AutosignConfig;
use crate::consent::ConsentOutcome;
use crate::decision::{plan_login, plan_transact, PassReason, SessionView, TransactDecision};
use crate::pending::{PendingSetups, SetupStage};
use crate::runtime::SessionRuntime;
use crate::signer::SigningProvider;

/// Where one contract stands for one session authority.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DelegationState {
    Unconfigured,
    AwaitingApproval,
    SettingUpOnChain,
    Active,
    TornDown,
}

/// Result of a login-time setup attempt for one contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    Activated,
    AlreadyActive,
    Declined,
}

/// Local keys deleted by a teardown. On-chain permissions are untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TeardownReport {
    pub removed: Vec<Name>,
}

type SessionContract = (PermissionLevel, Name);

/// The delegation state machine, tracked per (session authority, contract).
///
/// A persisted key for a contract means its restricted permission is
/// installed and usable for that authority. Keys reach the vault only after
/// the setup transaction carrying them has been accepted, either directly
/// through [`DelegationController::setup_now`] or through
/// [`DelegationController::confirm_setup`] after an injected setup was
/// broadcast.
pub struct DelegationController {
    matcher: ActionMatcher,
    builder: PermissionSetupBuilder,
    vault: Option<KeyVault>,
    pending: PendingSetups,
    awaiting: RwLock<HashSet<SessionContract>>,
    torn_down: RwLock<HashSet<SessionContract>>,
    guards: Mutex<HashMap<SessionContract, Arc<tokio::sync::Mutex<()>>>>,
}

impl DelegationController {
    /// Without a store the controller never intercepts anything.
    pub fn new(
        config: &AutosignConfig,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Result<Self, AutosignError> {
        config.validate()?;
        Ok(Self {
            matcher: ActionMatcher::new(config.contracts.clone()),
            builder: config.setup_builder(),
            vault: store.map(|s| KeyVault::new(s, config.namespace.clone())),
            pending: PendingSetups::new(config.pending_ttl_secs),
            awaiting: RwLock::new(HashSet::new()),
            torn_down: RwLock::new(HashSet::new()),
            guards: Mutex::new(HashMap::new()),
        })
    }

    pub fn matcher(&self) -> &ActionMatcher {
        &self.matcher
    }

    pub fn builder(&self) -> &PermissionSetupBuilder {
        &self.builder
    }

    pub fn storage_available(&self) -> bool {
        self.vault.is_some()
    }

    pub async fn state(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
    ) -> Result<DelegationState, AutosignError> {
        if let Some(vault) = &self.vault {
            if vault.for_session(owner).exists(contract).await? {
                return Ok(DelegationState::Active);
            }
        }
        let key = (*owner, *contract);
        if self.pending.contains(owner, contract) {
            return Ok(DelegationState::SettingUpOnChain);
        }
        if self.awaiting.read().unwrap().contains(&key) {
            return Ok(DelegationState::AwaitingApproval);
        }
        if self.torn_down.read().unwrap().contains(&key) {
            return Ok(DelegationState::TornDown);
        }
        Ok(DelegationState::Unconfigured)
    }

    pub async fn is_setup(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
    ) -> Result<bool, AutosignError> {
        Ok(self.state(owner, contract).await? == DelegationState::Active)
    }

    /// Snapshot of the configured contracts' state for `owner`.
    pub async fn view(&self, owner: &PermissionLevel) -> Result<SessionView, AutosignError> {
        let Some(vault) = &self.vault else {
            return Ok(SessionView::default());
        };
        let vault = vault.for_session(owner);
        let mut active = HashSet::new();
        for contract in self.matcher.config().contracts() {
            if vault.exists(&contract).await? {
                active.insert(contract);
            }
        }
        Ok(SessionView {
            storage_available: true,
            active,
            pending: self.pending.stages(owner),
        })
    }

    /// Decide what to do with a resolved transaction.
    ///
    /// Expired pending setups, and injected setups whose transaction was
    /// replaced by a different one, are discarded first.
    pub async fn evaluate(
        &self,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Result<TransactDecision, AutosignError> {
        self.expire_pending();
        if self.vault.is_none() {
            return Ok(TransactDecision::PassThrough(PassReason::StorageUnavailable));
        }

        if let Some(contract) = self.injected_setup_in(transaction, owner) {
            debug!(%contract, %owner, "transaction already carries setup actions");
            return Ok(TransactDecision::PassThrough(PassReason::SetupAlreadyInjected));
        }

        let fingerprint = fingerprint(&transaction.actions)?;
        for contract in self.pending.discard_stale(owner, &fingerprint) {
            info!(%contract, %owner, "injected setup superseded by another transaction; discarded");
        }

        let view = self.view(owner).await?;
        let decision = plan_transact(&self.matcher, transaction, &view);
        match &decision {
            TransactDecision::RequestConsent { contract, .. } => {
                self.begin_consent(owner, contract)
            }
            TransactDecision::PassThrough(reason) => debug!(?reason, "passing through"),
            _ => {}
        }
        Ok(decision)
    }

    /// Contracts the login hook should offer to set up for `owner`.
    pub async fn plan_login(&self, owner: &PermissionLevel) -> Result<Vec<Name>, AutosignError> {
        self.expire_pending();
        Ok(plan_login(self.matcher.config(), &self.view(owner).await?))
    }

    /// Mark `contract` as waiting on the user.
    pub fn begin_consent(&self, owner: &PermissionLevel, contract: &Name) {
        info!(%contract, %owner, "consent requested");
        self.awaiting.write().unwrap().insert((*owner, *contract));
    }

    /// Apply the user's answer. Approval generates a fresh key held in
    /// memory until the setup transaction is confirmed.
    pub fn record_consent(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        outcome: ConsentOutcome,
    ) -> Option<PublicKey> {
        self.awaiting.write().unwrap().remove(&(*owner, *contract));
        match outcome {
            ConsentOutcome::Declined => {
                info!(%contract, %owner, "consent declined");
                None
            }
            ConsentOutcome::Approved => {
                self.torn_down.write().unwrap().remove(&(*owner, *contract));
                let public = self.pending.approve(owner, *contract);
                info!(%contract, %owner, public_key = %public, "consent given; key generated");
                Some(public)
            }
        }
    }

    /// Setup actions to prepend to `transaction` for the approved `contract`.
    ///
    /// Calling this again for the same transaction returns the same actions.
    pub fn inject_setup(
        &self,
        contract: &Name,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Result<Vec<Action>, AutosignError> {
        let public = self
            .pending
            .public_key(owner, contract)
            .ok_or_else(|| AutosignError::NoPendingSetup(contract.to_string()))?;
        let fingerprint = fingerprint(&transaction.actions)?;
        self.pending.mark_injected(owner, contract, fingerprint);

        let actions = self.setup_actions(owner, contract, public);
        info!(%contract, %owner, actions = actions.len(), "setup actions injected");
        Ok(actions)
    }

    /// Sign `transaction` with `owner`'s stored keys for `contracts`.
    ///
    /// The owner's authorizations on those contracts' actions are first
    /// pointed at the restricted permission. A missing or unreadable key is
    /// an error.
    pub async fn sign_locally(
        &self,
        contracts: &[Name],
        transaction: &Transaction,
        owner: &PermissionLevel,
        chain_id: &ChainId,
        signer: &dyn SigningProvider,
    ) -> Result<(Transaction, Vec<Signature>), AutosignError> {
        let vault = self.vault_for(owner)?;
        let mut keys: Vec<PrivateKey> = Vec::with_capacity(contracts.len());
        for contract in contracts {
            let key = vault
                .load(contract)
                .await?
                .ok_or_else(|| AutosignError::MissingKey(contract.to_string()))?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let mut signed = transaction.clone();
        for action in &mut signed.actions {
            let Some(contract) = self.matcher.find_contract_for(action).copied() else {
                continue;
            };
            if !contracts.contains(&contract) {
                continue;
            }
            let permission = self.builder.permission_name_for(&contract);
            for auth in &mut action.authorization {
                if auth.actor == owner.actor {
                    auth.permission = permission;
                }
            }
        }

        let digest = signer.digest(&signed, chain_id)?;
        let signatures = keys
            .iter()
            .map(|key| signer.sign(key, &digest))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            contracts = ?contracts,
            %owner,
            signatures = signatures.len(),
            "transaction signed locally"
        );
        Ok((signed, signatures))
    }

    /// The broadcast of a transaction carrying injected setup actions was
    /// accepted: persist the pending key.
    pub async fn confirm_setup(
        &self,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Result<Option<Name>, AutosignError> {
        let Some(contract) = self.setup_contract_in(transaction, owner) else {
            return Ok(None);
        };
        let vault = self.vault_for(owner)?;
        let _guard = self.lock(owner, &contract).await;
        let Some(key) = self.pending.take(owner, &contract) else {
            return Ok(None);
        };
        vault.save(&contract, &key).await?;
        info!(
            %contract,
            %owner,
            public_key = %key.public_key(),
            "setup confirmed; delegation active"
        );
        Ok(Some(contract))
    }

    /// The broadcast was rejected or never happened: forget the pending key.
    pub fn abandon_setup(
        &self,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Option<Name> {
        let contract = self.setup_contract_in(transaction, owner)?;
        if self.pending.discard(owner, &contract) {
            warn!(%contract, %owner, "setup transaction not accepted; pending key discarded");
        }
        Some(contract)
    }

    /// Install the restricted permission for `contract` right away through
    /// the session's primary credential, persisting the key on success.
    pub async fn setup_now(
        &self,
        contract: &Name,
        runtime: &dyn SessionRuntime,
    ) -> Result<LoginOutcome, AutosignError> {
        let owner = runtime.permission_level();
        let vault = self.vault_for(&owner)?;
        let _guard = self.lock(&owner, contract).await;
        self.awaiting.write().unwrap().remove(&(owner, *contract));
        if vault.exists(contract).await? {
            return Ok(LoginOutcome::AlreadyActive);
        }

        let (key, public) = KeyVault::generate();
        let actions = self.setup_actions(&owner, contract, public);
        info!(%contract, %owner, public_key = %public, "submitting setup transaction");

        match runtime.transact(actions).await {
            Ok(receipt) => {
                vault.save(contract, &key).await?;
                self.pending.discard(&owner, contract);
                self.torn_down.write().unwrap().remove(&(owner, *contract));
                info!(
                    %contract,
                    %owner,
                    tx = %receipt.transaction_id,
                    "setup confirmed; delegation active"
                );
                Ok(LoginOutcome::Activated)
            }
            Err(e) => {
                warn!(%contract, %owner, error = %e, "setup transaction failed; no key stored");
                Err(AutosignError::SetupTransactionFailed {
                    contract: contract.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Delete every key managed for `owner`. Produces no chain actions.
    pub async fn teardown(&self, owner: &PermissionLevel) -> Result<TeardownReport, AutosignError> {
        let contracts = self.matcher.config().contracts();
        let mut report = TeardownReport::default();
        if let Some(vault) = &self.vault {
            let vault = vault.for_session(owner);
            for contract in &contracts {
                if vault.exists(contract).await? {
                    vault.remove(contract).await?;
                    report.removed.push(*contract);
                }
            }
        }
        self.pending.clear(owner);
        self.awaiting.write().unwrap().retain(|(o, _)| o != owner);
        self.torn_down
            .write()
            .unwrap()
            .extend(contracts.into_iter().map(|c| (*owner, c)));
        info!(%owner, removed = report.removed.len(), "delegation torn down");
        Ok(report)
    }

    fn vault_for(&self, owner: &PermissionLevel) -> Result<KeyVault, AutosignError> {
        self.vault
            .as_ref()
            .map(|v| v.for_session(owner))
            .ok_or(AutosignError::StorageUnavailable)
    }

    fn expire_pending(&self) {
        for (owner, contract) in self.pending.cleanup() {
            info!(%contract, %owner, "pending setup expired; discarded");
        }
    }

    fn setup_actions(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        public: PublicKey,
    ) -> Vec<Action> {
        self.builder.build_setup_actions(
            owner,
            contract,
            public,
            &self.matcher.config().actions_for(contract),
        )
    }

    /// Pending contract whose setup actions lead `transaction`.
    fn injected_setup_in(
        &self,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Option<Name> {
        self.pending.stages(owner).into_keys().find(|contract| {
            self.pending
                .public_key(owner, contract)
                .is_some_and(|public| {
                    transaction
                        .actions
                        .starts_with(&self.setup_actions(owner, contract, public))
                })
        })
    }

    /// Pending contract whose install action appears anywhere in `transaction`.
    fn setup_contract_in(
        &self,
        transaction: &Transaction,
        owner: &PermissionLevel,
    ) -> Option<Name> {
        self.pending
            .stages(owner)
            .into_iter()
            .filter(|(_, stage)| matches!(stage, SetupStage::Injected { .. }))
            .map(|(contract, _)| contract)
            .find(|contract| {
                self.pending
                    .public_key(owner, contract)
                    .is_some_and(|public| {
                        let install = self.builder.build_install_action(owner, contract, public);
                        transaction.actions.contains(&install)
                    })
            })
    }

    async fn lock(&self, owner: &PermissionLevel, contract: &Name) -> OwnedMutexGuard<()> {
        let guard = self
            .guards
            .lock()
            .unwrap()
            .entry((*owner, *contract))
            .or_default()
            .clone();
        guard.lock_owned().await
    }
}

/// Hash identifying a transaction's action list.
fn fingerprint(actions: &[Action]) -> Result<Digest, AutosignError> {
    let value =
        serde_json::to_value(actions).map_err(|e| AutosignError::Serialization(e.to_string()))?;
    Ok(canonical_hash(&value))
}
