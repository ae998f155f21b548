use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// Netatmo device identifier (the station's `_id`, a MAC address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An OAuth2 token pair with its absolute expiry.
///
/// `expires_at` is Unix-epoch milliseconds, directly comparable to
/// [`Clock::now_millis`](crate::session::Clock::now_millis).
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

impl Session {
    #[must_use]
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// `true` while `now_ms` is strictly before the expiry.
    #[must_use]
    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

// Tokens stay out of logs.
impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// One station's current measurements.
///
/// Each successful fetch produces a complete new list; readings carry no
/// identity across fetches beyond `id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub id: DeviceId,
    pub name: String,
    pub temperature_celsius: f64,
    /// Relative humidity, 0–100.
    pub humidity_percent: f64,
    pub co2_ppm: u32,
    /// Unix-epoch milliseconds of the station's last upload.
    pub last_update: i64,
}
