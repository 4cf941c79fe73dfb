use crate::common::EventHubResult;
use async_trait::async_trait;

/// Credential presented when a transport link is opened.
#[derive(Clone, Debug)]
pub struct AuthToken {
    /// The actual authentication token string
    pub token: String,
    /// The type of token (e.g., "Bearer")
    pub token_type: String,
    /// Optional expiration time in seconds from when the token was issued
    pub expires_in_secs: Option<u64>,
}

/// Trait for providers that supply credentials for opening transport links.
///
/// Failures are treated as connection-level and retried under the send deadline.
///
/// # Examples
///
/// ```no_run
/// use producer::auth::{AuthProvider, AuthToken};
/// use producer::common::EventHubResult;
/// use async_trait::async_trait;
///
/// struct MyAuthProvider;
///
/// #[async_trait]
/// impl AuthProvider for MyAuthProvider {
///     async fn authenticate(&self) -> EventHubResult<AuthToken> {
///         Ok(AuthToken {
///             token: "example_token".to_string(),
///             token_type: "Bearer".to_string(),
///             expires_in_secs: Some(3600),
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Obtains a credential.
    ///
    /// # Errors
    ///
    /// Should return [`EventHubError::Connection`](crate::common::EventHubError::Connection)
    /// when the credential cannot be obtained.
    async fn authenticate(&self) -> EventHubResult<AuthToken>;

    /// Renews the credential. Default implementation calls [`authenticate`](Self::authenticate) again.
    async fn refresh(&self) -> EventHubResult<AuthToken> {
        self.authenticate().await
    }

    /// Whether tokens from this provider expire and must be renewed.
    fn requires_refresh(&self) -> bool {
        true
    }
}

/// Provider handing out one fixed token, e.g. a pre-generated SAS token.
#[derive(Clone, Debug)]
pub struct StaticTokenProvider {
    token: AuthToken,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            token: AuthToken {
                token: token.into(),
                token_type: token_type.into(),
                expires_in_secs: None,
            },
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn authenticate(&self) -> EventHubResult<AuthToken> {
        Ok(self.token.clone())
    }

    fn requires_refresh(&self) -> bool {
        false
    }
}
