use autosign_identity::DelegationConfig;
use autosign_permission::{PermissionNaming, PermissionSetupBuilder};
use autosign_types::{AutosignError, Name};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::consent::ConsentText;

/// Everything one autosign instance needs, injected at construction.
///
/// Two instances sharing a storage backend must use different
/// `namespace` values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AutosignConfig {
    /// Prefix of every storage key this instance writes.
    pub namespace: String,
    pub permission: PermissionNaming,
    /// Parent of the installed permission.
    pub parent_permission: Name,
    /// Account hosting `updateauth` / `linkauth`.
    pub system_contract: Name,
    /// Seconds an approved setup may wait for on-chain confirmation.
    pub pending_ttl_secs: i64,
    pub contracts: DelegationConfig,
    pub consent: ConsentText,
}

impl Default for AutosignConfig {
    fn default() -> Self {
        Self {
            namespace: "autosign".to_string(),
            permission: PermissionNaming::PerContract,
            parent_permission: Name::ACTIVE,
            system_contract: Name::EOSIO,
            pending_ttl_secs: 300,
            contracts: DelegationConfig::default(),
            consent: ConsentText::default(),
        }
    }
}

impl AutosignConfig {
    pub fn new(contracts: DelegationConfig) -> Self {
        Self {
            contracts,
            ..Default::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, AutosignError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| AutosignError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AutosignError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AutosignError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), AutosignError> {
        if self.namespace.trim().is_empty() {
            return Err(AutosignError::Config("namespace must not be empty".into()));
        }
        if self.namespace.chars().any(char::is_whitespace) {
            return Err(AutosignError::Config(
                "namespace must not contain whitespace".into(),
            ));
        }
        if self.pending_ttl_secs <= 0 {
            return Err(AutosignError::Config(
                "pending_ttl_secs must be positive".into(),
            ));
        }
        if let Some(grant) = self.contracts.grants().iter().find(|g| g.actions.is_empty()) {
            return Err(AutosignError::Config(format!(
                "{} lists no actions",
                grant.contract
            )));
        }
        Ok(())
    }

    pub fn setup_builder(&self) -> PermissionSetupBuilder {
        PermissionSetupBuilder::new()
            .system_contract(self.system_contract)
            .naming(self.permission)
            .parent(self.parent_permission)
    }
}
