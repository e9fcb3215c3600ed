use holdwise_core::domain::identity::VerifiedIdentity;

use crate::tools::Tool;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    /// When false, side-effecting tools are withheld even from verified callers.
    pub mutations_enabled: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { mutations_enabled: true }
    }
}

impl GuardrailPolicy {
    pub fn read_only() -> Self {
        Self { mutations_enabled: false }
    }

    pub fn evaluate(&self, tool: &dyn Tool, identity: Option<&VerifiedIdentity>) -> GuardrailDecision {
        if !tool.requires_identity() {
            return GuardrailDecision::Allow;
        }

        if !self.mutations_enabled {
            return GuardrailDecision::Deny {
                reason_code: "mutations_disabled",
                user_message: format!("{} is disabled on this deployment.", tool.name()),
            };
        }

        match identity {
            Some(_) => GuardrailDecision::Allow,
            None => GuardrailDecision::Deny {
                reason_code: "identity_required",
                user_message: format!(
                    "{} is unavailable: the user is not signed in. Ask them to sign in to manage their watchlist.",
                    tool.name()
                ),
            },
        }
    }
}
