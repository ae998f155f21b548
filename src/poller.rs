//! Periodic station polling.
//!
//! The poller owns scheduling only: it runs one load cycle at start, then one
//! per interval tick or manual trigger, and publishes the outcome through a
//! [`watch`] channel that renderers subscribe to.
//!
//! All cycles run on the poller's single task, so two loads are never in
//! flight at once. A manual trigger that arrives while a cycle is running is
//! ignored, and a tick that falls due mid-cycle runs once the cycle ends.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::display::Locale;
use crate::error::FetchError;
use crate::oauth::AuthorizationRequest;
use crate::session::{AuthStatus, Clock, SessionManager};
use crate::station::StationClient;
use crate::store::TokenStore;
use crate::types::SensorReading;

/// Why a load cycle produced no readings.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("authorization required")]
    AuthorizationRequired(AuthorizationRequest),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// One authenticate-then-fetch cycle.
pub trait SensorSource: Send + Sync + 'static {
    fn load(&self) -> impl Future<Output = Result<Vec<SensorReading>, LoadError>> + Send;
}

/// The production source: session manager plus station client.
pub struct NetatmoSource<S, C> {
    session: SessionManager<S, C>,
    station: StationClient,
}

impl<S: TokenStore, C: Clock> NetatmoSource<S, C> {
    #[must_use]
    pub fn new(session: SessionManager<S, C>, station: StationClient) -> Self {
        Self { session, station }
    }

    #[must_use]
    pub fn session(&self) -> &SessionManager<S, C> {
        &self.session
    }
}

impl<S: TokenStore, C: Clock> SensorSource for NetatmoSource<S, C> {
    async fn load(&self) -> Result<Vec<SensorReading>, LoadError> {
        match self.session.ensure_authenticated().await {
            AuthStatus::Authenticated { access_token } => {
                Ok(self.station.fetch(&access_token).await?)
            }
            AuthStatus::AuthorizationRequired(request) => {
                Err(LoadError::AuthorizationRequired(request))
            }
        }
    }
}

/// What the dashboard should currently show.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Loading,
    /// The latest readings; replaces any previous list wholesale.
    Ready(Vec<SensorReading>),
    /// The last cycle failed. Previous readings are not kept.
    Failed { message: String },
    /// Terminal: the poller has stopped and the user must authorize at `url`.
    AuthorizationRequired { url: String },
}

impl PollState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AuthorizationRequired { .. })
    }
}

/// Shortest period the poller accepts; anything below is raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct Poller<T> {
    source: T,
    interval: Duration,
    locale: Locale,
}

impl<T: SensorSource> Poller<T> {
    /// `interval` below [`MIN_POLL_INTERVAL`] (zero included) is raised to it.
    #[must_use]
    pub fn new(source: T, interval: Duration) -> Self {
        if interval < MIN_POLL_INTERVAL {
            tracing::warn!(
                ?interval,
                minimum = ?MIN_POLL_INTERVAL,
                "Poll interval too short; raising it"
            );
        }
        Self {
            source,
            interval: interval.max(MIN_POLL_INTERVAL),
            locale: Locale::default(),
        }
    }

    /// Language of the generic failure message.
    #[must_use]
    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    /// Spawn the polling task. The first cycle starts immediately.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(self) -> PollerHandle {
        let (state_tx, state_rx) = watch::channel(PollState::Loading);
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run(self, state_tx, trigger_rx, cancel.clone()));

        PollerHandle {
            state_rx,
            trigger_tx,
            cancel,
            task: Some(task),
        }
    }
}

async fn run<T: SensorSource>(
    poller: Poller<T>,
    state_tx: watch::Sender<PollState>,
    mut trigger_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let Poller {
        source,
        interval,
        locale,
    } = poller;

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
            Some(()) = trigger_rx.recv() => {
                tracing::debug!("Manual refresh requested");
            }
        }

        state_tx.send_if_modified(|state| {
            if *state == PollState::Loading {
                false
            } else {
                *state = PollState::Loading;
                true
            }
        });

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            outcome = source.load() => outcome,
        };

        let next = match outcome {
            Ok(readings) => {
                tracing::info!(count = readings.len(), "Sensor readings updated");
                PollState::Ready(readings)
            }
            Err(LoadError::AuthorizationRequired(request)) => {
                tracing::warn!("No usable session; stopping poller until authorization");
                PollState::AuthorizationRequired { url: request.url }
            }
            Err(LoadError::Fetch(e)) => {
                tracing::error!(error = %e, "Sensor data load failed");
                PollState::Failed {
                    message: locale.load_failed().to_owned(),
                }
            }
        };

        let terminal = next.is_terminal();
        state_tx.send_replace(next);
        if terminal {
            break;
        }

        // Drain triggers queued while the cycle ran; they do not start another.
        while trigger_rx.try_recv().is_ok() {}
    }

    tracing::debug!("Poller stopped");
}

/// Control and observation handle for a running [`Poller`].
///
/// Dropping the handle cancels the poller.
pub struct PollerHandle {
    state_rx: watch::Receiver<PollState>,
    trigger_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Receiver that observes every state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PollState> {
        self.state_rx.clone()
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> PollState {
        self.state_rx.borrow().clone()
    }

    /// Request an immediate cycle.
    ///
    /// Returns `false` if the request was ignored: a cycle is already in
    /// flight, or the poller has stopped.
    pub fn refresh(&self) -> bool {
        if *self.state_rx.borrow() == PollState::Loading {
            return false;
        }
        self.trigger_tx.try_send(()).is_ok()
    }

    /// `true` once the polling task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancel the poller, including any in-flight cycle, and wait for it to exit.
    /// No cycle starts after this returns.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Poller task ended abnormally");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
