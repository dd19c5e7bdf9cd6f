//! Authentication onboarding and session refresh
//!
//! The OAuth redirect/PKCE handshake itself lives outside this crate; the
//! identity provider is consumed through [`IdentityProviderClient`], which
//! turns an authorization code into a raw provider-shaped profile. This
//! service normalizes that profile, applies policy-layer role synthesis, and
//! resolves the user's permission set.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::domain::{Provider, User};
use crate::error::{AppError, AuthStep, Result};
use crate::identity;
use crate::policy::PolicyStore;
use crate::retry::{run_with_retry, RetryContext};

/// Synthetic role applied when Google reports a hosted-domain (`hd`) claim.
pub const GSUITE_ROLE: &str = "gsuite_user";

/// Access/refresh credential pair. Opaque to this crate beyond expiry; the
/// surrounding application persists it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Boundary to the identity provider token endpoints.
#[async_trait]
pub trait IdentityProviderClient: Send + Sync {
    /// Exchange an authorization code for the raw provider profile.
    async fn exchange_code(&self, provider: Provider, code: &str) -> Result<Value>;

    /// Redeem a refresh credential for a new token pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair>;
}

/// Session/token persistence owned by the surrounding application.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn persist(&self, tokens: &TokenPair) -> Result<()>;
    async fn clear(&self) -> Result<()>;
}

pub struct AuthService {
    idp: Arc<dyn IdentityProviderClient>,
    sessions: Arc<dyn SessionStore>,
    store: Arc<PolicyStore>,
    retry: RetryConfig,
}

impl AuthService {
    pub fn new(
        idp: Arc<dyn IdentityProviderClient>,
        sessions: Arc<dyn SessionStore>,
        store: Arc<PolicyStore>,
    ) -> Self {
        Self {
            idp,
            sessions,
            store,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Complete a sign-in: exchange the code, normalize the profile, apply
    /// role synthesis, and resolve the permission set.
    pub async fn handle_callback(&self, provider: Provider, code: &str) -> Result<User> {
        let raw = self
            .idp
            .exchange_code(provider, code)
            .await
            .map_err(|err| as_auth_error(err, AuthStep::Callback))?;

        let profile = identity::normalize(&raw, provider)?;
        let mut attributes = profile.attributes;

        // Google's hosted-domain claim implies a managed workspace; surface
        // it as a synthetic role here in the policy layer, never in the
        // normalizer.
        if provider == Provider::Google
            && raw.get("hd").and_then(Value::as_str).is_some()
            && !attributes.roles.iter().any(|r| r == GSUITE_ROLE)
        {
            attributes.roles.push(GSUITE_ROLE.to_string());
        }

        let permissions = self.store.resolve_permissions(&attributes);
        tracing::info!(
            email = %profile.email,
            %provider,
            permission_count = permissions.len(),
            "user authenticated"
        );

        Ok(User {
            id: profile.subject_id,
            email: profile.email,
            name: profile.display_name,
            provider,
            attributes,
            permissions,
            authenticated_at: Utc::now(),
        })
    }

    /// Refresh the session, retrying per the authentication policy. On
    /// exhaustion the session is force-cleared; the caller must prompt a
    /// fresh sign-in.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenPair> {
        let mut ctx = RetryContext::new("token refresh");
        if let Some(cap) = self.retry.refresh_attempts {
            ctx = ctx.with_max_attempts(cap);
        }

        let result = run_with_retry(&mut ctx, cancel, || {
            let idp = Arc::clone(&self.idp);
            let token = refresh_token.to_string();
            async move {
                idp.refresh(&token)
                    .await
                    .map_err(|err| as_auth_error(err, AuthStep::Refresh))
            }
        })
        .await;

        match result {
            Ok(pair) => {
                self.sessions.persist(&pair).await?;
                Ok(pair)
            }
            Err(err) => {
                // The one sanctioned side effect in the error layer: refresh
                // exhaustion invalidates the session.
                if matches!(err, AppError::Authentication { .. }) {
                    tracing::warn!("token refresh exhausted, clearing session");
                    if let Err(clear_err) = self.sessions.clear().await {
                        tracing::error!(error = %clear_err, "failed to clear session");
                    }
                }
                Err(err)
            }
        }
    }
}

/// Transport and provider failures at the token endpoints surface as
/// authentication errors for the given step; network errors keep their class
/// so the retry table can see the status code.
fn as_auth_error(err: AppError, step: AuthStep) -> AppError {
    match err {
        AppError::Authentication { message, .. } => AppError::Authentication { step, message },
        AppError::Network { .. } => err,
        other => AppError::Authentication {
            step,
            message: other.to_string(),
        },
    }
}
