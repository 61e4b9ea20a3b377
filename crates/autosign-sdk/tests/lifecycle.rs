use async_trait::async_trait;
use autosign_identity::{ContractGrant, DelegationConfig, KeyValueStore, MemoryStore};
use autosign_sdk::{
    AutosignConfig, BeforeSignOutcome, BroadcastOutcome, CanonicalJsonSigner, ConsentPrompt,
    ConsentRequest, ConsentResponse, DelegationState, LifecycleAdapter, LoginReport,
    SessionRuntime, SigningProvider, TransactReceipt,
};
use autosign_store::SqliteStore;
use autosign_types::{
    Action, AutosignError, ChainId, Name, PermissionLevel, TransactRequest, Transaction,
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn name(s: &str) -> Name {
    Name::new(s).unwrap()
}

fn alice() -> PermissionLevel {
    PermissionLevel::new(name("alice"), Name::ACTIVE)
}

fn bob() -> PermissionLevel {
    PermissionLevel::new(name("bob"), Name::ACTIVE)
}

/// Session runtime that resolves templates deterministically and records
/// every transaction it is asked to submit.
struct FakeRuntime {
    owner: PermissionLevel,
    submitted: Mutex<Vec<Vec<Action>>>,
    fail_transact: AtomicBool,
    resolves: AtomicUsize,
}

impl FakeRuntime {
    fn new() -> Self {
        Self::as_account(alice())
    }

    fn as_account(owner: PermissionLevel) -> Self {
        Self {
            owner,
            submitted: Mutex::new(Vec::new()),
            fail_transact: AtomicBool::new(false),
            resolves: AtomicUsize::new(0),
        }
    }

    fn failing(self) -> Self {
        self.fail_transact.store(true, Ordering::SeqCst);
        self
    }

    fn submitted(&self) -> Vec<Vec<Action>> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRuntime for FakeRuntime {
    fn permission_level(&self) -> PermissionLevel {
        self.owner
    }

    fn chain_id(&self) -> ChainId {
        ChainId([0x73; 32])
    }

    async fn resolve(&self, request: &TransactRequest) -> Result<Transaction, AutosignError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(Transaction {
            expiration: 1_700_000_000 + self.resolves.load(Ordering::SeqCst) as i64,
            ref_block_num: 42,
            ref_block_prefix: 0xdead_beef,
            actions: request.actions.clone(),
        })
    }

    async fn transact(&self, actions: Vec<Action>) -> Result<TransactReceipt, AutosignError> {
        if self.fail_transact.load(Ordering::SeqCst) {
            return Err(AutosignError::Resolve("expired transaction".into()));
        }
        self.submitted.lock().unwrap().push(actions);
        Ok(TransactReceipt {
            transaction_id: format!("tx{}", self.submitted.lock().unwrap().len()),
        })
    }
}

/// Consent UI replaying scripted answers; `None` once the script runs out.
struct FakeConsent {
    answers: Mutex<VecDeque<Option<bool>>>,
    prompts: Mutex<Vec<ConsentRequest>>,
}

impl FakeConsent {
    fn answering(answers: impl IntoIterator<Item = Option<bool>>) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.into_iter().collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ConsentPrompt for FakeConsent {
    async fn prompt(&self, request: &ConsentRequest) -> Option<ConsentResponse> {
        self.prompts.lock().unwrap().push(request.clone());
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .flatten()
            .map(|approved| ConsentResponse { approved })
    }
}

/// Memory-backed store whose reads or writes can be switched to fail.
#[derive(Default)]
struct FailingStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FailingStore {
    fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), AutosignError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AutosignError::Storage("quota exceeded".into()));
        }
        self.inner.write(key, value).await
    }

    async fn read(&self, key: &str) -> Result<Option<String>, AutosignError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AutosignError::Storage("storage locked".into()));
        }
        self.inner.read(key).await
    }

    async fn remove(&self, key: &str) -> Result<(), AutosignError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AutosignError::Storage("quota exceeded".into()));
        }
        self.inner.remove(key).await
    }
}

fn config() -> AutosignConfig {
    AutosignConfig::new(DelegationConfig::new(vec![ContractGrant::new(
        name("gamecontract"),
        [name("play"), name("claim")],
    )]))
}

fn adapter(store: Arc<dyn KeyValueStore>, consent: Arc<FakeConsent>) -> LifecycleAdapter {
    LifecycleAdapter::from_config(&config(), Some(store), consent).unwrap()
}

fn play() -> Action {
    play_by(alice())
}

fn play_by(player: PermissionLevel) -> Action {
    Action::new(
        name("gamecontract"),
        name("play"),
        vec![player],
        json!({"player": player.actor.to_string(), "move": 3}),
    )
}

fn transfer() -> Action {
    Action::new(
        name("eosio.token"),
        name("transfer"),
        vec![alice()],
        json!({"from": "alice", "to": "bob", "quantity": "1.0000 EOS", "memo": ""}),
    )
}

#[tokio::test]
async fn login_setup_then_local_signing() {
    let store = Arc::new(SqliteStore::open(":memory:").await.unwrap());
    let consent = FakeConsent::answering([Some(true)]);
    let adapter = adapter(store.clone(), consent.clone());
    let runtime = FakeRuntime::new();
    let game = name("gamecontract");

    assert!(!adapter.controller().is_setup(&alice(), &game).await.unwrap());

    let report = adapter.after_login(&runtime).await.unwrap();
    assert_eq!(report.activated, vec![game]);
    assert!(adapter.controller().is_setup(&alice(), &game).await.unwrap());

    // updateauth + one linkauth per allow-listed action.
    let submitted = runtime.submitted();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].len(), 3);
    assert_eq!(submitted[0][0].name, name("updateauth"));
    assert!(submitted[0][1..].iter().all(|a| a.name == name("linkauth")));

    let outcome = adapter
        .before_sign(&TransactRequest::new(vec![play()]), &runtime)
        .await
        .unwrap();
    let BeforeSignOutcome::SignedLocally {
        contracts,
        transaction,
        signatures,
    } = outcome
    else {
        panic!("expected local signing");
    };
    assert_eq!(contracts, vec![game]);
    assert_eq!(transaction.actions[0].authorization[0].permission, game);

    let installed_key = submitted[0][0].data["auth"]["keys"][0]["key"]
        .as_str()
        .unwrap()
        .to_string();
    let digest = CanonicalJsonSigner
        .digest(&transaction, &runtime.chain_id())
        .unwrap();
    assert_eq!(signatures[0].recover(&digest).unwrap().to_string(), installed_key);

    // One prompt at login, none while signing.
    assert_eq!(consent.prompt_count(), 1);
}

#[tokio::test]
async fn second_login_does_not_prompt_again() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([Some(true)]);
    let adapter = adapter(store.clone(), consent.clone());
    let runtime = FakeRuntime::new();

    adapter.after_login(&runtime).await.unwrap();
    let report = adapter.after_login(&runtime).await.unwrap();
    assert_eq!(report.already_active, vec![name("gamecontract")]);
    assert!(report.activated.is_empty());
    assert_eq!(consent.prompt_count(), 1);
    assert_eq!(runtime.submitted().len(), 1);
}

#[tokio::test]
async fn partial_qualification_is_never_signed_locally() {
    let store = Arc::new(MemoryStore::new());
    let adapter = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let runtime = FakeRuntime::new();
    adapter.after_login(&runtime).await.unwrap();

    let outcome = adapter
        .before_sign(&TransactRequest::new(vec![play(), transfer()]), &runtime)
        .await
        .unwrap();
    assert_eq!(outcome, BeforeSignOutcome::Unchanged);
}

#[tokio::test]
async fn failed_setup_stores_nothing_and_retry_succeeds() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([Some(true), Some(true)]);
    let adapter = adapter(store.clone(), consent.clone());
    let game = name("gamecontract");

    let err = adapter
        .after_login(&FakeRuntime::new().failing())
        .await
        .unwrap_err();
    assert!(matches!(err, AutosignError::SetupTransactionFailed { .. }));
    assert!(store.is_empty());
    assert_eq!(
        adapter.controller().state(&alice(), &game).await.unwrap(),
        DelegationState::Unconfigured
    );

    let runtime = FakeRuntime::new();
    let report = adapter.after_login(&runtime).await.unwrap();
    assert_eq!(report.activated, vec![game]);
    assert_eq!(consent.prompt_count(), 2);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn declined_or_dismissed_login_changes_nothing() {
    for answer in [Some(false), None] {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter(store.clone(), FakeConsent::answering([answer]));
        let runtime = FakeRuntime::new();

        let report = adapter.after_login(&runtime).await.unwrap();
        assert_eq!(report.declined, vec![name("gamecontract")]);
        assert!(store.is_empty());
        assert!(runtime.submitted().is_empty());
    }
}

#[tokio::test]
async fn transact_path_injects_setup_then_confirms() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([Some(true)]);
    let adapter = adapter(store.clone(), consent.clone());
    let runtime = FakeRuntime::new();
    let game = name("gamecontract");
    let request = TransactRequest::new(vec![play()]);

    let outcome = adapter.before_sign(&request, &runtime).await.unwrap();
    let BeforeSignOutcome::SetupInjected {
        contract,
        request: replaced,
    } = outcome.clone()
    else {
        panic!("expected setup injection");
    };
    assert_eq!(contract, game);
    assert_eq!(replaced.actions.len(), 4);
    assert_eq!(replaced.actions[3], play());
    assert!(store.is_empty());
    assert_eq!(
        adapter.controller().state(&alice(), &game).await.unwrap(),
        DelegationState::SettingUpOnChain
    );

    // Re-running the hook on the same request gives the same result.
    assert_eq!(adapter.before_sign(&request, &runtime).await.unwrap(), outcome);
    // The replaced request already carries the setup.
    assert_eq!(
        adapter.before_sign(&replaced, &runtime).await.unwrap(),
        BeforeSignOutcome::Unchanged
    );
    assert_eq!(consent.prompt_count(), 1);

    let broadcast = runtime.resolve(&replaced).await.unwrap();
    let confirmed = adapter
        .after_broadcast(
            &broadcast,
            &BroadcastOutcome::Accepted {
                transaction_id: "abc".into(),
            },
            &runtime,
        )
        .await
        .unwrap();
    assert_eq!(confirmed, Some(game));
    assert!(adapter.controller().is_setup(&alice(), &game).await.unwrap());

    let outcome = adapter.before_sign(&request, &runtime).await.unwrap();
    assert!(matches!(outcome, BeforeSignOutcome::SignedLocally { .. }));
}

#[tokio::test]
async fn rejected_broadcast_leaves_contract_unconfigured() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([Some(true), Some(true)]);
    let adapter = adapter(store.clone(), consent.clone());
    let runtime = FakeRuntime::new();
    let request = TransactRequest::new(vec![play()]);

    let BeforeSignOutcome::SetupInjected { request: replaced, .. } =
        adapter.before_sign(&request, &runtime).await.unwrap()
    else {
        panic!("expected setup injection");
    };
    let first_key = replaced.actions[0].data["auth"]["keys"][0]["key"].clone();

    let broadcast = runtime.resolve(&replaced).await.unwrap();
    adapter
        .after_broadcast(
            &broadcast,
            &BroadcastOutcome::Rejected {
                reason: "user cancelled".into(),
            },
            &runtime,
        )
        .await
        .unwrap();
    assert!(store.is_empty());
    assert_eq!(
        adapter.controller().state(&alice(), &name("gamecontract")).await.unwrap(),
        DelegationState::Unconfigured
    );

    // A retry prompts again and injects a fresh key.
    let BeforeSignOutcome::SetupInjected { request: retried, .. } =
        adapter.before_sign(&request, &runtime).await.unwrap()
    else {
        panic!("expected setup injection");
    };
    assert_ne!(retried.actions[0].data["auth"]["keys"][0]["key"], first_key);
    assert_eq!(consent.prompt_count(), 2);
}

#[tokio::test]
async fn declined_transact_consent_passes_through() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([None]);
    let adapter = adapter(store.clone(), consent.clone());
    let runtime = FakeRuntime::new();

    let outcome = adapter
        .before_sign(&TransactRequest::new(vec![play()]), &runtime)
        .await
        .unwrap();
    assert_eq!(outcome, BeforeSignOutcome::Unchanged);
    assert!(store.is_empty());
    assert_eq!(consent.prompt_count(), 1);
}

#[tokio::test]
async fn unrelated_transactions_are_untouched() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([]);
    let adapter = adapter(store, consent.clone());

    let outcome = adapter
        .before_sign(&TransactRequest::new(vec![transfer()]), &FakeRuntime::new())
        .await
        .unwrap();
    assert_eq!(outcome, BeforeSignOutcome::Unchanged);
    assert_eq!(consent.prompt_count(), 0);
}

#[tokio::test]
async fn logout_removes_keys_without_chain_actions() {
    let store = Arc::new(MemoryStore::new());
    let adapter = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let runtime = FakeRuntime::new();
    let game = name("gamecontract");
    adapter.after_login(&runtime).await.unwrap();
    let submitted_before = runtime.submitted().len();

    let report = adapter.on_logout(&runtime).await.unwrap();
    assert_eq!(report.removed, vec![game]);
    assert!(store.is_empty());
    assert_eq!(runtime.submitted().len(), submitted_before);
    assert!(!adapter.controller().is_setup(&alice(), &game).await.unwrap());
    assert_eq!(
        adapter.controller().state(&alice(), &game).await.unwrap(),
        DelegationState::TornDown
    );
}

#[tokio::test]
async fn without_storage_hooks_are_inert() {
    let consent = FakeConsent::answering([Some(true)]);
    let adapter = LifecycleAdapter::from_config(&config(), None, consent.clone()).unwrap();
    let runtime = FakeRuntime::new();

    let report = adapter.after_login(&runtime).await.unwrap();
    assert!(report.storage_unavailable);
    let outcome = adapter
        .before_sign(&TransactRequest::new(vec![play()]), &runtime)
        .await
        .unwrap();
    assert_eq!(outcome, BeforeSignOutcome::Unchanged);
    assert_eq!(consent.prompt_count(), 0);
    assert!(runtime.submitted().is_empty());
}

#[tokio::test]
async fn instances_with_different_namespaces_share_storage() {
    let store = Arc::new(MemoryStore::new());
    let mut other = config();
    other.namespace = "othergame".into();

    let first = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let second =
        LifecycleAdapter::from_config(&other, Some(store.clone()), FakeConsent::answering([]))
            .unwrap();
    let game = name("gamecontract");
    first.after_login(&FakeRuntime::new()).await.unwrap();

    assert!(first.controller().is_setup(&alice(), &game).await.unwrap());
    assert!(!second.controller().is_setup(&alice(), &game).await.unwrap());
}

#[tokio::test]
async fn accounts_sharing_storage_keep_separate_keys() {
    let store = Arc::new(MemoryStore::new());
    let first = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let bob_consent = FakeConsent::answering([Some(false)]);
    let second = adapter(store.clone(), bob_consent.clone());
    let game = name("gamecontract");
    let alice_runtime = FakeRuntime::new();
    let bob_runtime = FakeRuntime::as_account(bob());

    first.after_login(&alice_runtime).await.unwrap();
    assert!(store.raw("autosign-alice-active-gamecontract").is_some());

    // Alice's key is never used for bob; he is asked for his own consent.
    let outcome = second
        .before_sign(&TransactRequest::new(vec![play_by(bob())]), &bob_runtime)
        .await
        .unwrap();
    assert_eq!(outcome, BeforeSignOutcome::Unchanged);
    assert_eq!(bob_consent.prompt_count(), 1);
    assert!(!second.controller().is_setup(&bob(), &game).await.unwrap());

    let report = second.on_logout(&bob_runtime).await.unwrap();
    assert!(report.removed.is_empty());
    assert_eq!(store.len(), 1);
    assert!(second.controller().is_setup(&alice(), &game).await.unwrap());

    let outcome = first
        .before_sign(&TransactRequest::new(vec![play()]), &alice_runtime)
        .await
        .unwrap();
    assert!(matches!(outcome, BeforeSignOutcome::SignedLocally { .. }));
}

#[tokio::test]
async fn one_adapter_serves_each_account_separately() {
    let store = Arc::new(MemoryStore::new());
    let adapter = adapter(store.clone(), FakeConsent::answering([Some(true), Some(true)]));
    let game = name("gamecontract");
    let bob_runtime = FakeRuntime::as_account(bob());

    adapter.after_login(&FakeRuntime::new()).await.unwrap();
    assert!(!adapter.controller().is_setup(&bob(), &game).await.unwrap());

    let report = adapter.after_login(&bob_runtime).await.unwrap();
    assert_eq!(report.activated, vec![game]);
    assert_eq!(store.len(), 2);

    adapter.on_logout(&bob_runtime).await.unwrap();
    assert!(adapter.controller().is_setup(&alice(), &game).await.unwrap());
    assert_eq!(
        adapter.controller().state(&bob(), &game).await.unwrap(),
        DelegationState::TornDown
    );
}

#[tokio::test]
async fn login_reports_failed_key_write_after_setup_succeeds() {
    let store = Arc::new(FailingStore::default());
    store.fail_writes();
    let adapter = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let runtime = FakeRuntime::new();

    let err = adapter.after_login(&runtime).await.unwrap_err();
    assert!(matches!(err, AutosignError::Storage(_)));
    assert_eq!(runtime.submitted().len(), 1);
    assert!(store.inner.is_empty());
    assert!(!adapter
        .controller()
        .is_setup(&alice(), &name("gamecontract"))
        .await
        .unwrap());
}

#[tokio::test]
async fn confirming_setup_surfaces_write_failure() {
    let store = Arc::new(FailingStore::default());
    let adapter = adapter(store.clone(), FakeConsent::answering([Some(true)]));
    let runtime = FakeRuntime::new();

    let BeforeSignOutcome::SetupInjected { request, .. } = adapter
        .before_sign(&TransactRequest::new(vec![play()]), &runtime)
        .await
        .unwrap()
    else {
        panic!("expected setup injection");
    };
    let broadcast = runtime.resolve(&request).await.unwrap();

    store.fail_writes();
    let err = adapter
        .after_broadcast(
            &broadcast,
            &BroadcastOutcome::Accepted {
                transaction_id: "abc".into(),
            },
            &runtime,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AutosignError::Storage(_)));
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn unreadable_storage_fails_before_sign() {
    let store = Arc::new(FailingStore::default());
    store.fail_reads();
    let consent = FakeConsent::answering([Some(true)]);
    let adapter = adapter(store, consent.clone());

    let err = adapter
        .before_sign(&TransactRequest::new(vec![play()]), &FakeRuntime::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AutosignError::Storage(_)));
    assert_eq!(consent.prompt_count(), 0);
}

#[tokio::test]
async fn login_without_configured_contracts_prompts_nothing() {
    let store = Arc::new(MemoryStore::new());
    let consent = FakeConsent::answering([Some(true)]);
    let empty = AutosignConfig::new(DelegationConfig::default());
    let adapter = LifecycleAdapter::from_config(&empty, Some(store.clone()), consent.clone())
        .unwrap();
    let runtime = FakeRuntime::new();

    let report = adapter.after_login(&runtime).await.unwrap();
    assert_eq!(report, LoginReport::default());
    assert_eq!(consent.prompt_count(), 0);
    assert!(runtime.submitted().is_empty());
}
