#![doc = include_str!("../README.md")]

pub mod config;
pub mod display;
pub mod error;
pub mod oauth;
pub mod poller;
pub mod session;
pub mod station;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use config::NetatmoConfig;
pub use display::{Locale, TemperatureBand};
pub use error::{AuthError, Error, FetchError, StoreError};
pub use oauth::{AuthorizationRequest, OAuthClient, TokenResponse};
pub use poller::{
    LoadError, MIN_POLL_INTERVAL, NetatmoSource, PollState, Poller, PollerHandle, SensorSource,
};
pub use session::{AuthStatus, Clock, SessionManager, SystemClock};
pub use station::StationClient;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use types::{DeviceId, SensorReading, Session};
