use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_AUTH_URL: &str = "https://api.netatmo.com/oauth2/authorize";
const DEFAULT_TOKEN_URL: &str = "https://api.netatmo.com/oauth2/token";
const DEFAULT_API_URL: &str = "https://api.netatmo.com/api";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Netatmo client configuration.
///
/// Required fields are constructor parameters; everything else has a default
/// that can be overridden by chaining:
///
/// ```rust,ignore
/// use netatmo_dashboard::NetatmoConfig;
///
/// let config = NetatmoConfig::new("id", "secret", "https://my-app.com/callback".parse()?)
///     .with_poll_interval(std::time::Duration::from_secs(60));
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct NetatmoConfig {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) redirect_uri: Url,
    pub(crate) scopes: Vec<String>,
    pub(crate) auth_url: Url,
    pub(crate) token_url: Url,
    pub(crate) api_url: Url,
    pub(crate) poll_interval: Duration,
    pub(crate) http_timeout: Option<Duration>,
}

impl NetatmoConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
            scopes: vec!["read_station".into(), "read_homecoach".into()],
            auth_url: default_url(DEFAULT_AUTH_URL),
            token_url: default_url(DEFAULT_TOKEN_URL),
            api_url: default_url(DEFAULT_API_URL),
            poll_interval: DEFAULT_POLL_INTERVAL,
            http_timeout: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `NETATMO_CLIENT_ID`
    /// - `NETATMO_CLIENT_SECRET`
    /// - `NETATMO_REDIRECT_URI` (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `NETATMO_AUTH_URL`, `NETATMO_TOKEN_URL`, `NETATMO_API_URL`: endpoint overrides
    /// - `NETATMO_SCOPES`: space- or comma-separated scopes
    /// - `NETATMO_POLL_INTERVAL_SECS`: polling period, greater than zero
    /// - `NETATMO_HTTP_TIMEOUT_SECS`: per-request timeout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a value
    /// does not parse.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| Error::Config(format!("{key} is required")))
        };
        let parse_url = |key: &str, raw: String| {
            raw.parse::<Url>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };
        let parse_secs = |key: &str, raw: String| {
            raw.trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("{key}: {e}")))
        };

        let client_id = required("NETATMO_CLIENT_ID")?;
        let client_secret = required("NETATMO_CLIENT_SECRET")?;
        let redirect_uri = parse_url("NETATMO_REDIRECT_URI", required("NETATMO_REDIRECT_URI")?)?;

        let mut config = Self::new(client_id, client_secret, redirect_uri);

        if let Some(raw) = lookup("NETATMO_AUTH_URL") {
            config = config.with_auth_url(parse_url("NETATMO_AUTH_URL", raw)?);
        }
        if let Some(raw) = lookup("NETATMO_TOKEN_URL") {
            config = config.with_token_url(parse_url("NETATMO_TOKEN_URL", raw)?);
        }
        if let Some(raw) = lookup("NETATMO_API_URL") {
            config = config.with_api_url(parse_url("NETATMO_API_URL", raw)?);
        }
        if let Some(raw) = lookup("NETATMO_SCOPES") {
            let scopes: Vec<String> = raw
                .split([',', ' '])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
            if scopes.is_empty() {
                return Err(Error::Config("NETATMO_SCOPES is empty".into()));
            }
            config = config.with_scopes(scopes);
        }
        if let Some(raw) = lookup("NETATMO_POLL_INTERVAL_SECS") {
            let secs = parse_secs("NETATMO_POLL_INTERVAL_SECS", raw)?;
            if secs == 0 {
                return Err(Error::Config(
                    "NETATMO_POLL_INTERVAL_SECS must be greater than zero".into(),
                ));
            }
            config = config.with_poll_interval(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("NETATMO_HTTP_TIMEOUT_SECS") {
            let secs = parse_secs("NETATMO_HTTP_TIMEOUT_SECS", raw)?;
            config = config.with_http_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Override the authorization endpoint.
    #[must_use]
    pub fn with_auth_url(mut self, url: Url) -> Self {
        self.auth_url = url;
        self
    }

    /// Override the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: Url) -> Self {
        self.token_url = url;
        self
    }

    /// Override the API base (the station-data call is `<api>/getstationsdata`).
    #[must_use]
    pub fn with_api_url(mut self, url: Url) -> Self {
        self.api_url = url;
        self
    }

    /// Override the requested scopes (default: `read_station read_homecoach`).
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Polling period. The poller raises anything under
    /// [`MIN_POLL_INTERVAL`](crate::poller::MIN_POLL_INTERVAL) to that minimum.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes as the space-separated string the vendor expects.
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }

    #[must_use]
    pub fn auth_url(&self) -> &Url {
        &self.auth_url
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http_timeout
    }

    /// Build the shared HTTP client honouring `http_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TLS backend cannot be initialised.
    pub fn http_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.http_timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))
    }
}

impl std::fmt::Debug for NetatmoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetatmoConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url.as_str())
            .field("token_url", &self.token_url.as_str())
            .field("api_url", &self.api_url.as_str())
            .field("poll_interval", &self.poll_interval)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

fn default_url(raw: &str) -> Url {
    raw.parse().expect("valid default URL")
}
