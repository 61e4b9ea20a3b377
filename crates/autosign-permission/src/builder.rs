use autosign_identity::PublicKey;
use autosign_types::{Action, Name, PermissionLevel};
use serde::{Deserialize, Serialize};

use crate::authority::{Authority, LinkAuth, UpdateAuth};

const UPDATEAUTH: Name = Name::from_u64(15_371_467_950_649_982_976);
const LINKAUTH: Name = Name::from_u64(10_063_015_651_234_021_376);

/// How the restricted permission is named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionNaming {
    /// One permission per contract, named after the contract.
    #[default]
    PerContract,
    /// The same permission name for every contract.
    Fixed(Name),
}

/// Builds the authority-update and authority-link actions that install a
/// restricted permission for one contract.
///
/// The permission only ever gets linked to the actions passed in, which
/// callers take from the contract's allow-list.
#[derive(Clone, Debug)]
pub struct PermissionSetupBuilder {
    system_contract: Name,
    naming: PermissionNaming,
    parent: Name,
}

impl Default for PermissionSetupBuilder {
    fn default() -> Self {
        Self {
            system_contract: Name::EOSIO,
            naming: PermissionNaming::PerContract,
            parent: Name::ACTIVE,
        }
    }
}

impl PermissionSetupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account hosting `updateauth` / `linkauth` (default `eosio`).
    pub fn system_contract(mut self, account: Name) -> Self {
        self.system_contract = account;
        self
    }

    pub fn naming(mut self, naming: PermissionNaming) -> Self {
        self.naming = naming;
        self
    }

    /// Parent of the installed permission (default `active`).
    pub fn parent(mut self, parent: Name) -> Self {
        self.parent = parent;
        self
    }

    pub fn permission_name_for(&self, contract: &Name) -> Name {
        match self.naming {
            PermissionNaming::PerContract => *contract,
            PermissionNaming::Fixed(name) => name,
        }
    }

    /// Create or overwrite the restricted permission for `contract`, held by
    /// `public_key` alone.
    pub fn build_install_action(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        public_key: PublicKey,
    ) -> Action {
        let update = UpdateAuth {
            account: owner.actor,
            permission: self.permission_name_for(contract),
            parent: self.parent,
            auth: Authority::single_key(public_key),
        };
        Action::new(
            self.system_contract,
            UPDATEAUTH,
            vec![*owner],
            serde_json::to_value(update).expect("UpdateAuth must serialize"),
        )
    }

    /// One link per action, each requiring the restricted permission.
    pub fn build_link_actions(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        actions: &[Name],
    ) -> Vec<Action> {
        let requirement = self.permission_name_for(contract);
        actions
            .iter()
            .map(|action_type| {
                let link = LinkAuth {
                    account: owner.actor,
                    code: *contract,
                    action_type: *action_type,
                    requirement,
                };
                Action::new(
                    self.system_contract,
                    LINKAUTH,
                    vec![*owner],
                    serde_json::to_value(link).expect("LinkAuth must serialize"),
                )
            })
            .collect()
    }

    /// Install action followed by every link action.
    pub fn build_setup_actions(
        &self,
        owner: &PermissionLevel,
        contract: &Name,
        public_key: PublicKey,
        actions: &[Name],
    ) -> Vec<Action> {
        let mut out = vec![self.build_install_action(owner, contract, public_key)];
        out.extend(self.build_link_actions(owner, contract, actions));
        out
    }
}
