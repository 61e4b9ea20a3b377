use async_trait::async_trait;
use autosign_types::Name;
use serde::{Deserialize, Serialize};

/// User-facing wording of the consent prompt.
///
/// `{contract}` and `{actions}` in `title` and `body` are replaced when the
/// prompt is rendered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsentText {
    pub title: String,
    pub body: String,
    pub approve_label: String,
    pub decline_label: String,
}

impl Default for ConsentText {
    fn default() -> Self {
        Self {
            title: "Enable automatic signing?".to_string(),
            body: "Allow this session to sign {actions} on {contract} without asking each time? \
                   A restricted permission limited to these actions will be added to your account."
                .to_string(),
            approve_label: "Enable".to_string(),
            decline_label: "Not now".to_string(),
        }
    }
}

impl ConsentText {
    pub fn render(&self, contract: &Name, actions: &[Name]) -> ConsentRequest {
        let action_list = actions
            .iter()
            .map(Name::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let fill = |template: &str| {
            template
                .replace("{contract}", &contract.to_string())
                .replace("{actions}", &action_list)
        };
        ConsentRequest {
            title: fill(&self.title),
            body: fill(&self.body),
            contract: *contract,
            actions: actions.to_vec(),
            approve_label: self.approve_label.clone(),
            decline_label: self.decline_label.clone(),
        }
    }
}

/// What the consent UI is asked to show.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRequest {
    pub title: String,
    pub body: String,
    pub contract: Name,
    pub actions: Vec<Name>,
    pub approve_label: String,
    pub decline_label: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentResponse {
    pub approved: bool,
}

/// The interactive yes/no prompt owned by the host.
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// `None` means the prompt was dismissed without an answer.
    async fn prompt(&self, request: &ConsentRequest) -> Option<ConsentResponse>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsentOutcome {
    Approved,
    Declined,
}

impl ConsentOutcome {
    /// A dismissed prompt counts as a decline.
    pub fn from_response(response: Option<ConsentResponse>) -> Self {
        match response {
            Some(ConsentResponse { approved: true }) => Self::Approved,
            _ => Self::Declined,
        }
    }
}
