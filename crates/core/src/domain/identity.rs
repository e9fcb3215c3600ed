use serde::{Deserialize, Serialize};

/// A caller whose credential has been checked by an `IdentityVerifier`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    pub user_id: String,
}

impl VerifiedIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into() }
    }
}
