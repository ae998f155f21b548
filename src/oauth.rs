use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use serde::Deserialize;

use crate::config::NetatmoConfig;
use crate::error::{AuthError, Error};
use crate::types::Session;

/// `OAuth2` client for the Netatmo authorization server.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    config: NetatmoConfig,
    http: reqwest::Client,
}

/// Authorization URL plus the CSRF `state` the callback must echo back.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Token response from the Netatmo token endpoint.
#[derive(Debug, Clone, Deserialize)]
#[non_exhaustive]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of `access_token` in seconds.
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<Vec<String>>,
}

impl TokenResponse {
    /// Turn the response into a [`Session`] whose expiry is `now_ms + expires_in * 1000`.
    #[must_use]
    pub fn into_session(self, now_ms: i64) -> Session {
        let lifetime_ms = i64::try_from(self.expires_in)
            .unwrap_or(i64::MAX)
            .saturating_mul(1000);
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: now_ms.saturating_add(lifetime_ms),
        }
    }
}

impl OAuthClient {
    /// Client with its own HTTP client built from `config` (timeout included).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the HTTP client cannot be built.
    pub fn new(config: NetatmoConfig) -> Result<Self, Error> {
        let http = config.http_client()?;
        Ok(Self { config, http })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// The HTTP client, for sharing its connection pool with other callers.
    #[must_use]
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    #[must_use]
    pub fn config(&self) -> &NetatmoConfig {
        &self.config
    }

    /// Build the URL the user must visit to grant access.
    #[must_use]
    pub fn authorization_url(&self) -> AuthorizationRequest {
        let state = generate_state();

        let mut url = self.config.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.config.scope_param())
            .append_pair("state", &state)
            .append_pair("response_type", "code");

        AuthorizationRequest {
            url: url.into(),
            state,
        }
    }

    /// Exchange an authorization code from the redirect callback for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] on network failure, or
    /// [`AuthError::Rejected`] if the token endpoint answers with a non-2xx status.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AuthError> {
        let scope = self.config.scope_param();
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
        ];
        self.token_request(&params, "code exchange").await
    }

    /// Exchange a refresh token for a new access/refresh token pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] on network failure, or
    /// [`AuthError::Rejected`] if the token endpoint answers with a non-2xx status.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        self.token_request(&params, "token refresh").await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        operation: &'static str,
    ) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.config.token_url.clone())
            .form(params)
            .send()
            .await?;

        let response = Self::ensure_success(response, operation).await?;
        response.json::<TokenResponse>().await.map_err(Into::into)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, AuthError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(AuthError::Rejected {
            operation,
            status,
            detail,
        })
    }
}

/// Random `state` parameter for CSRF protection.
///
/// 16 random bytes as a 22-character URL-safe string.
#[must_use]
pub fn generate_state() -> String {
    let random_bytes: [u8; 16] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(random_bytes)
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_config() -> NetatmoConfig {
        NetatmoConfig::new(
            "test-client",
            "test-secret",
            "https://example.com/callback".parse().unwrap(),
        )
    }

    fn client_for(server: &MockServer) -> OAuthClient {
        let token_url = format!("{}/oauth2/token", server.uri()).parse().unwrap();
        OAuthClient::new(test_config().with_token_url(token_url)).unwrap()
    }

    #[test]
    fn test_authorization_url_params() {
        let client = OAuthClient::new(test_config()).unwrap();
        let req = client.authorization_url();

        assert!(req.url.starts_with("https://api.netatmo.com/oauth2/authorize?"));
        assert!(req.url.contains("client_id=test-client"));
        assert!(req.url.contains("redirect_uri=https%3A%2F%2Fexample.com%2Fcallback"));
        assert!(req.url.contains("scope=read_station+read_homecoach"));
        assert!(req.url.contains("response_type=code"));
        assert!(req.url.contains(&format!("state={}", req.state)));
        assert!(!req.url.contains("test-secret"));
    }

    #[test]
    fn test_authorization_url_unique_state() {
        let client = OAuthClient::new(test_config()).unwrap();
        assert_ne!(client.authorization_url().state, client.authorization_url().state);
    }

    #[test]
    fn test_state_shape() {
        let state = generate_state();
        assert_eq!(state.len(), 22);
        assert!(
            state
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "state should be URL-safe: {state}"
        );
    }

    #[test]
    fn test_into_session_expiry_in_millis() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "A",
            "refresh_token": "B",
            "expires_in": 3600
        }))
        .unwrap();

        let session = response.into_session(1_000);
        assert_eq!(session, Session::new("A", "B", 1_000 + 3_600_000));
    }

    #[tokio::test]
    async fn test_refresh_posts_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("client_id=test-client"))
            .and(body_string_contains("client_secret=test-secret"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 10800,
                "scope": ["read_station"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server).refresh("old-refresh").await.unwrap();

        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token, "new-refresh");
        assert_eq!(tokens.expires_in, 10800);
    }

    #[tokio::test]
    async fn test_refresh_rejected_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh("stale").await.unwrap_err();

        match err {
            AuthError::Rejected { status, detail, .. } => {
                assert_eq!(status, 400);
                assert!(detail.contains("invalid_grant"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=the-code"))
            .and(body_string_contains("redirect_uri=https%3A%2F%2Fexample.com%2Fcallback"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access",
                "refresh_token": "refresh",
                "expires_in": 10800
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = client_for(&server).exchange_code("the-code").await.unwrap();
        assert_eq!(tokens.access_token, "access");
    }
}
