mod config;
mod consent;
mod controller;
mod lifecycle;
mod pending;
mod runtime;
mod signer;
pub mod decision;

pub use config::AutosignConfig;
pub use consent::{ConsentOutcome, ConsentPrompt, ConsentRequest, ConsentResponse, ConsentText};
pub use controller::{DelegationController, DelegationState, LoginOutcome, TeardownReport};
pub use decision::{PassReason, SessionView, TransactDecision};
pub use lifecycle::{BeforeSignOutcome, LifecycleAdapter, LoginReport};
pub use pending::{PendingSetup, PendingSetups, SetupStage};
pub use runtime::{BroadcastOutcome, SessionRuntime, TransactReceipt};
pub use signer::{CanonicalJsonSigner, SigningProvider};
