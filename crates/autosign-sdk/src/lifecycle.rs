use autosign_identity::{KeyValueStore, Signature};
use autosign_types::{AutosignError, Name, TransactRequest, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AutosignConfig;
use crate::consent::{ConsentOutcome, ConsentPrompt, ConsentText};
use crate::controller::{DelegationController, LoginOutcome, TeardownReport};
use crate::decision::TransactDecision;
use crate::runtime::{BroadcastOutcome, SessionRuntime};
use crate::signer::{CanonicalJsonSigner, SigningProvider};

/// What `before_sign` did to the request.
#[derive(Clone, Debug, PartialEq)]
pub enum BeforeSignOutcome {
    /// Continue through the wallet-prompted path with the original request.
    Unchanged,
    /// Continue through the wallet with `request`, which now starts with the
    /// setup actions for `contract`.
    SetupInjected {
        contract: Name,
        request: TransactRequest,
    },
    /// Broadcast `transaction` with `signatures`; no wallet prompt needed.
    SignedLocally {
        contracts: Vec<Name>,
        transaction: Transaction,
        signatures: Vec<Signature>,
    },
}

/// Per-contract result of the login hook.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoginReport {
    pub activated: Vec<Name>,
    pub declined: Vec<Name>,
    pub already_active: Vec<Name>,
    pub storage_unavailable: bool,
}

/// Binds a [`DelegationController`] to the host runtime's hooks.
pub struct LifecycleAdapter {
    controller: Arc<DelegationController>,
    consent: Arc<dyn ConsentPrompt>,
    signer: Arc<dyn SigningProvider>,
    text: ConsentText,
}

impl LifecycleAdapter {
    pub fn new(
        controller: Arc<DelegationController>,
        consent: Arc<dyn ConsentPrompt>,
        signer: Arc<dyn SigningProvider>,
        text: ConsentText,
    ) -> Self {
        Self {
            controller,
            consent,
            signer,
            text,
        }
    }

    /// Build the controller from `config`, signing with [`CanonicalJsonSigner`].
    pub fn from_config(
        config: &AutosignConfig,
        store: Option<Arc<dyn KeyValueStore>>,
        consent: Arc<dyn ConsentPrompt>,
    ) -> Result<Self, AutosignError> {
        let controller = DelegationController::new(config, store)?;
        Ok(Self::new(
            Arc::new(controller),
            consent,
            Arc::new(CanonicalJsonSigner),
            config.consent.clone(),
        ))
    }

    pub fn with_signer(mut self, signer: Arc<dyn SigningProvider>) -> Self {
        self.signer = signer;
        self
    }

    pub fn controller(&self) -> &Arc<DelegationController> {
        &self.controller
    }

    /// Pre-signing hook.
    ///
    /// The request is resolved afresh on every call, so calling this twice
    /// on the same request yields the same outcome without a second prompt.
    pub async fn before_sign(
        &self,
        request: &TransactRequest,
        runtime: &dyn SessionRuntime,
    ) -> Result<BeforeSignOutcome, AutosignError> {
        let owner = runtime.permission_level();
        let transaction = runtime.resolve(request).await?;

        let mut decision = self.controller.evaluate(&transaction, &owner).await?;
        if let TransactDecision::RequestConsent { contract, actions } = &decision {
            let outcome = self.ask(contract, actions).await;
            if self.controller.record_consent(&owner, contract, outcome).is_none() {
                return Ok(BeforeSignOutcome::Unchanged);
            }
            decision = self.controller.evaluate(&transaction, &owner).await?;
        }

        match decision {
            TransactDecision::PassThrough(_) => Ok(BeforeSignOutcome::Unchanged),
            TransactDecision::InjectSetup { contract } => {
                let setup = self
                    .controller
                    .inject_setup(&contract, &transaction, &owner)?;
                Ok(BeforeSignOutcome::SetupInjected {
                    contract,
                    request: request.with_prepended(setup),
                })
            }
            TransactDecision::SignLocally { contracts } => {
                let (transaction, signatures) = self
                    .controller
                    .sign_locally(
                        &contracts,
                        &transaction,
                        &owner,
                        &runtime.chain_id(),
                        self.signer.as_ref(),
                    )
                    .await?;
                Ok(BeforeSignOutcome::SignedLocally {
                    contracts,
                    transaction,
                    signatures,
                })
            }
            TransactDecision::RequestConsent { contract, .. } => {
                // Another contract still needs consent; one prompt per attempt.
                self.controller
                    .record_consent(&owner, &contract, ConsentOutcome::Declined);
                debug!(%contract, "second consent request deferred to the next attempt");
                Ok(BeforeSignOutcome::Unchanged)
            }
        }
    }

    /// Report how a broadcast went. Returns the contract whose pending
    /// setup was confirmed or discarded, if `transaction` carried one.
    pub async fn after_broadcast(
        &self,
        transaction: &Transaction,
        outcome: &BroadcastOutcome,
        runtime: &dyn SessionRuntime,
    ) -> Result<Option<Name>, AutosignError> {
        let owner = runtime.permission_level();
        match outcome {
            BroadcastOutcome::Accepted { .. } => {
                self.controller.confirm_setup(transaction, &owner).await
            }
            BroadcastOutcome::Rejected { reason } => {
                let contract = self.controller.abandon_setup(transaction, &owner);
                if let Some(contract) = &contract {
                    info!(%contract, %reason, "setup broadcast rejected");
                }
                Ok(contract)
            }
        }
    }

    /// Offer delegation for every configured contract without a key, and
    /// install it immediately for each approval.
    ///
    /// A failed setup transaction stops the hook and is returned as
    /// [`AutosignError::SetupTransactionFailed`]; nothing is stored for that
    /// contract.
    pub async fn after_login(
        &self,
        runtime: &dyn SessionRuntime,
    ) -> Result<LoginReport, AutosignError> {
        let mut report = LoginReport::default();
        if !self.controller.storage_available() {
            debug!("no storage configured; login setup skipped");
            report.storage_unavailable = true;
            return Ok(report);
        }
        let config = self.controller.matcher().config();
        if config.is_empty() {
            debug!("no contracts configured; login setup skipped");
            return Ok(report);
        }

        let owner = runtime.permission_level();
        let planned = self.controller.plan_login(&owner).await?;
        for contract in config.contracts() {
            if !planned.contains(&contract) {
                if self.controller.is_setup(&owner, &contract).await? {
                    report.already_active.push(contract);
                }
                continue;
            }

            self.controller.begin_consent(&owner, &contract);
            let outcome = match self.ask(&contract, &config.actions_for(&contract)).await {
                ConsentOutcome::Declined => {
                    self.controller
                        .record_consent(&owner, &contract, ConsentOutcome::Declined);
                    LoginOutcome::Declined
                }
                ConsentOutcome::Approved => self.controller.setup_now(&contract, runtime).await?,
            };
            match outcome {
                LoginOutcome::Activated => report.activated.push(contract),
                LoginOutcome::AlreadyActive => report.already_active.push(contract),
                LoginOutcome::Declined => report.declined.push(contract),
            }
        }

        info!(
            activated = report.activated.len(),
            declined = report.declined.len(),
            already_active = report.already_active.len(),
            "login setup finished"
        );
        Ok(report)
    }

    /// Session teardown: the session's local keys only.
    pub async fn on_logout(
        &self,
        runtime: &dyn SessionRuntime,
    ) -> Result<TeardownReport, AutosignError> {
        self.controller.teardown(&runtime.permission_level()).await
    }

    async fn ask(&self, contract: &Name, actions: &[Name]) -> ConsentOutcome {
        let request = self.text.render(contract, actions);
        ConsentOutcome::from_response(self.consent.prompt(&request).await)
    }
}
