use autosign_types::{Action, Name};
use serde::{Deserialize, Serialize};

/// One allow-list entry: a contract and the actions on it that may be
/// signed by the delegated key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGrant {
    pub contract: Name,
    pub actions: Vec<Name>,
}

impl ContractGrant {
    pub fn new(contract: Name, actions: impl IntoIterator<Item = Name>) -> Self {
        let mut unique = Vec::new();
        for action in actions {
            if !unique.contains(&action) {
                unique.push(action);
            }
        }
        Self {
            contract,
            actions: unique,
        }
    }

    pub fn permits(&self, action: &Action) -> bool {
        self.contract == action.account && self.actions.contains(&action.name)
    }
}

/// The immutable, ordered allow-list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ContractGrant>", into = "Vec<ContractGrant>")]
pub struct DelegationConfig {
    grants: Vec<ContractGrant>,
}

impl DelegationConfig {
    pub fn new(grants: Vec<ContractGrant>) -> Self {
        let grants = grants
            .into_iter()
            .map(|g| ContractGrant::new(g.contract, g.actions))
            .collect();
        Self { grants }
    }

    pub fn grants(&self) -> &[ContractGrant] {
        &self.grants
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Configured contracts, first occurrence order, without duplicates.
    pub fn contracts(&self) -> Vec<Name> {
        let mut out = Vec::new();
        for grant in &self.grants {
            if !out.contains(&grant.contract) {
                out.push(grant.contract);
            }
        }
        out
    }

    /// Every allow-listed action for `contract`, merged across entries.
    pub fn actions_for(&self, contract: &Name) -> Vec<Name> {
        let mut out = Vec::new();
        for grant in self.grants.iter().filter(|g| &g.contract == contract) {
            for action in &grant.actions {
                if !out.contains(action) {
                    out.push(*action);
                }
            }
        }
        out
    }
}

impl From<Vec<ContractGrant>> for DelegationConfig {
    fn from(grants: Vec<ContractGrant>) -> Self {
        Self::new(grants)
    }
}

impl From<DelegationConfig> for Vec<ContractGrant> {
    fn from(config: DelegationConfig) -> Self {
        config.grants
    }
}

/// Pure classification of actions against a [`DelegationConfig`].
#[derive(Clone, Debug)]
pub struct ActionMatcher {
    config: DelegationConfig,
}

impl ActionMatcher {
    pub fn new(config: DelegationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    pub fn matches(&self, action: &Action) -> bool {
        self.config.grants.iter().any(|g| g.permits(action))
    }

    /// Every action qualifies. Vacuously true for no actions; a mix of
    /// qualifying and non-qualifying actions never qualifies.
    pub fn all_qualify(&self, actions: &[Action]) -> bool {
        actions.iter().all(|a| self.matches(a))
    }

    pub fn find_contract_for(&self, action: &Action) -> Option<&Name> {
        self.config
            .grants
            .iter()
            .find(|g| g.permits(action))
            .map(|g| &g.contract)
    }

    /// Contracts of the qualifying actions, in action order, without duplicates.
    pub fn involved_contracts(&self, actions: &[Action]) -> Vec<Name> {
        let mut out = Vec::new();
        for contract in actions.iter().filter_map(|a| self.find_contract_for(a)) {
            if !out.contains(contract) {
                out.push(*contract);
            }
        }
        out
    }
}
