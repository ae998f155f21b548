//! Session lifecycle: freshness checks, refresh-token exchange, and the
//! decision to send the user back through authorization.

use crate::error::AuthError;
use crate::oauth::{AuthorizationRequest, OAuthClient};
use crate::store::TokenStore;
use crate::types::Session;

/// Source of "now" in Unix-epoch milliseconds.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        let nanos = time::OffsetDateTime::now_utc().unix_timestamp_nanos();
        i64::try_from(nanos / 1_000_000).unwrap_or(i64::MAX)
    }
}

/// Outcome of [`SessionManager::ensure_authenticated`].
#[derive(Debug, Clone)]
pub enum AuthStatus {
    /// A usable access token.
    Authenticated { access_token: String },
    /// No usable session and refresh failed. The caller must send the user
    /// to `request.url`; nothing can be fetched until that completes.
    AuthorizationRequired(AuthorizationRequest),
}

impl AuthStatus {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Keeps the stored [`Session`] usable.
pub struct SessionManager<S, C = SystemClock> {
    oauth: OAuthClient,
    store: S,
    clock: C,
}

impl<S: TokenStore> SessionManager<S, SystemClock> {
    #[must_use]
    pub fn new(oauth: OAuthClient, store: S) -> Self {
        Self::with_clock(oauth, store, SystemClock)
    }
}

impl<S: TokenStore, C: Clock> SessionManager<S, C> {
    #[must_use]
    pub fn with_clock(oauth: OAuthClient, store: S, clock: C) -> Self {
        Self { oauth, store, clock }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// `true` iff a session is stored and has not yet expired.
    pub async fn is_valid(&self) -> bool {
        self.fresh_session().await.is_some()
    }

    /// Exchange the stored refresh token for a new token pair and store it.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MissingRefreshToken`] if nothing is stored
    /// - [`AuthError::Rejected`] / [`AuthError::Http`] if the exchange fails
    /// - [`AuthError::Store`] if the store cannot be read or written
    pub async fn refresh(&self) -> Result<Session, AuthError> {
        let refresh_token = self
            .store
            .get()
            .await?
            .map(|s| s.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingRefreshToken)?;

        let tokens = self.oauth.refresh(&refresh_token).await?;
        let session = tokens.into_session(self.clock.now_millis());
        self.store.set(session.clone()).await?;

        tracing::info!(expires_at = session.expires_at, "Netatmo session refreshed");
        Ok(session)
    }

    /// Return a usable access token, refreshing once if needed.
    ///
    /// A still-valid session is returned without any network traffic. Refresh
    /// failures are logged and reported as
    /// [`AuthStatus::AuthorizationRequired`]; they are never retried here.
    pub async fn ensure_authenticated(&self) -> AuthStatus {
        if let Some(session) = self.fresh_session().await {
            return AuthStatus::Authenticated {
                access_token: session.access_token,
            };
        }

        match self.refresh().await {
            Ok(session) => AuthStatus::Authenticated {
                access_token: session.access_token,
            },
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed; authorization required");
                AuthStatus::AuthorizationRequired(self.oauth.authorization_url())
            }
        }
    }

    /// Complete the authorization redirect: exchange `code` and store the session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] if the exchange fails or the store cannot be written.
    pub async fn complete_authorization(&self, code: &str) -> Result<Session, AuthError> {
        let tokens = self.oauth.exchange_code(code).await?;
        let session = tokens.into_session(self.clock.now_millis());
        self.store.set(session.clone()).await?;

        tracing::info!(expires_at = session.expires_at, "Netatmo authorization completed");
        Ok(session)
    }

    /// The stored access token, fresh or not.
    pub async fn access_token(&self) -> Option<String> {
        self.stored_session().await.map(|s| s.access_token)
    }

    /// The stored session, fresh or not. Store failures read as `None`.
    pub async fn stored_session(&self) -> Option<Session> {
        match self.store.get().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(error = %e, "Token store read failed");
                None
            }
        }
    }

    async fn fresh_session(&self) -> Option<Session> {
        let now = self.clock.now_millis();
        self.stored_session().await.filter(|s| s.is_fresh_at(now))
    }
}
