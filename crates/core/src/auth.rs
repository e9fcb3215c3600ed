//! Bearer API key identity verification.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::config::AuthConfig;
use crate::domain::identity::VerifiedIdentity;
use crate::ports::IdentityVerifier;

/// Maps configured API keys to user ids.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyIdentityVerifier {
    keys: HashMap<String, String>,
}

impl ApiKeyIdentityVerifier {
    pub fn new<I, K, U>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, U)>,
        K: Into<String>,
        U: Into<String>,
    {
        let keys = entries.into_iter().map(|(key, user)| (key.into(), user.into())).collect();
        Self { keys }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config
                .api_keys
                .iter()
                .map(|entry| (entry.key.expose_secret().to_string(), entry.user_id.clone())),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Extracts the credential from an `Authorization` header value.
    pub fn bearer_token(header: &str) -> Option<&str> {
        let (scheme, token) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();
        (!token.is_empty()).then_some(token)
    }
}

#[async_trait]
impl IdentityVerifier for ApiKeyIdentityVerifier {
    async fn verify(&self, credential: &str) -> Option<VerifiedIdentity> {
        let identity = self.keys.get(credential.trim()).map(VerifiedIdentity::new);
        if identity.is_none() {
            debug!(event_name = "auth.credential.rejected", "unknown api key presented");
        }
        identity
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::ApiKeyIdentityVerifier;
    use crate::config::{ApiKeyEntry, AuthConfig};
    use crate::ports::IdentityVerifier;

    #[tokio::test]
    async fn known_key_yields_identity() {
        let verifier = ApiKeyIdentityVerifier::from_config(&AuthConfig {
            api_keys: vec![ApiKeyEntry {
                key: SecretString::from("k-123".to_string()),
                user_id: "analyst-7".to_string(),
            }],
        });

        let identity = verifier.verify("k-123").await;
        assert_eq!(identity.map(|identity| identity.user_id), Some("analyst-7".to_string()));
        assert!(verifier.verify("k-999").await.is_none());
    }

    #[test]
    fn bearer_token_is_parsed_case_insensitively() {
        assert_eq!(ApiKeyIdentityVerifier::bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(ApiKeyIdentityVerifier::bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(ApiKeyIdentityVerifier::bearer_token("Basic abc"), None);
        assert_eq!(ApiKeyIdentityVerifier::bearer_token("Bearer"), None);
    }
}
