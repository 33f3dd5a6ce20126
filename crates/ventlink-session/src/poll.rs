//! Periodic refresh and reconnect scheduling.
//!
//! Each cycle holds the session's exclusive section from connect to the end
//! of the settle window, so control commands queue behind it rather than
//! interleaving with GET_STATE.

use std::sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ventlink_frame::DeviceState;
use ventlink_transport::Transport;

use crate::config::PollConfig;
use crate::error::{SessionError, UpdateFailed, UpdateFailure};
use crate::session::{Session, SessionEvent};

/// Outcome published to the host after every cycle, and for state the unit
/// pushes between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEvent {
    Updated(DeviceState),
    UpdateFailed(UpdateFailed),
}

/// Drives refresh cycles against one session.
pub struct PollCoordinator<T: Transport> {
    session: Arc<Session<T>>,
    config: PollConfig,
    cache: SyncMutex<Option<DeviceState>>,
    events: broadcast::Sender<PollEvent>,
    cancel: CancellationToken,
}

impl<T: Transport> PollCoordinator<T> {
    /// The coordinator stops on its own when the session is stopped.
    pub fn new(session: Arc<Session<T>>, config: PollConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let cancel = session.cancel_token().child_token();
        Self {
            session,
            config,
            cache: SyncMutex::new(None),
            events,
            cancel,
        }
    }

    pub fn session(&self) -> &Arc<Session<T>> {
        &self.session
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    fn cache(&self) -> SyncGuard<'_, Option<DeviceState>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// State from the last successful cycle (or later notification).
    pub fn cached_state(&self) -> Option<DeviceState> {
        self.cache().clone()
    }

    pub fn events(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PollEvent) {
        let _ = self.events.send(event);
    }

    /// Publish state pushed outside a cycle, unless the cycle already did.
    fn absorb(&self, state: DeviceState) {
        {
            let mut cache = self.cache();
            if cache.as_ref() == Some(&state) {
                return;
            }
            *cache = Some(state.clone());
        }
        self.publish(PollEvent::Updated(state));
    }

    /// Run one cycle and publish its outcome.
    pub async fn run_cycle(&self) -> Result<DeviceState, UpdateFailed> {
        let outcome = self.cycle().await;
        match &outcome {
            Ok(state) => {
                *self.cache() = Some(state.clone());
                self.publish(PollEvent::Updated(state.clone()));
            }
            Err(failed) => {
                warn!(address = %self.session.address(), kind = %failed.kind, cause = %failed.cause, "poll cycle failed");
                self.publish(PollEvent::UpdateFailed(failed.clone()));
            }
        }
        outcome
    }

    async fn cycle(&self) -> Result<DeviceState, UpdateFailed> {
        let connectivity = |err: SessionError| UpdateFailed::from_session(UpdateFailure::Connectivity, &err);
        let mut guard = self.session.lock().await.map_err(connectivity)?;
        guard.ensure_connected().await.map_err(connectivity)?;

        if let Err(err) = guard.request_state().await {
            if matches!(err, SessionError::Shutdown) {
                return Err(UpdateFailed::from_session(UpdateFailure::Shutdown, &err));
            }
            let cached = self.session.get_current_state().or_else(|| self.cached_state());
            return match cached {
                Some(state) => {
                    warn!(address = %self.session.address(), error = %err, "state request failed, returning cached state");
                    Ok(state)
                }
                None => Err(UpdateFailed::from_session(UpdateFailure::Data, &err)),
            };
        }

        tokio::select! {
            () = tokio::time::sleep(self.config.settle_window) => {}
            () = self.cancel.cancelled() => {
                return Err(UpdateFailed::new(UpdateFailure::Shutdown, "poll coordinator stopped"));
            }
        }

        self.session.get_current_state().ok_or_else(|| {
            UpdateFailed::new(
                UpdateFailure::Data,
                "state request accepted but no state arrived within the settle window",
            )
        })
    }

    /// Start the periodic loop. The first cycle runs immediately.
    pub fn spawn(self) -> PollHandle<T> {
        let coordinator = Arc::new(self);
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(Arc::clone(&coordinator).run(Arc::clone(&refresh)));
        PollHandle {
            coordinator,
            refresh,
            task: SyncMutex::new(Some(task)),
        }
    }

    async fn run(self: Arc<Self>, refresh: Arc<Notify>) {
        let address = self.session.address().to_string();
        let mut session_events = self.session.events();
        let mut next = Instant::now();
        let mut retry: Option<Duration> = None;

        info!(address = %address, interval = ?self.config.interval, "poll loop started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep_until(next) => {}
                () = refresh.notified() => debug!(address = %address, "refresh requested"),
                event = session_events.recv() => {
                    match event {
                        Ok(SessionEvent::StateUpdated(state)) => self.absorb(state),
                        Ok(SessionEvent::Disconnected) if retry.is_none() => {
                            let delay = self.config.reconnect_delay;
                            info!(address = %address, ?delay, "scheduling reconnect");
                            retry = Some(delay);
                            next = next.min(Instant::now() + delay);
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(address = %address, skipped, "session events lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                    continue;
                }
            }

            let outcome = self.run_cycle().await;

            let now = Instant::now();
            match outcome {
                Ok(_) => {
                    retry = None;
                    next = now + self.config.interval;
                }
                Err(failed) if failed.kind == UpdateFailure::Shutdown => break,
                Err(_) => {
                    let delay = next_retry(retry, &self.config);
                    retry = Some(delay);
                    next = now + delay.min(self.config.interval);
                    debug!(address = %address, ?delay, "next attempt scheduled");
                }
            }
        }
        info!(address = %address, "poll loop stopped");
    }
}

/// Doubling delay for consecutive failures, capped.
fn next_retry(current: Option<Duration>, config: &PollConfig) -> Duration {
    match current {
        None => config.reconnect_delay,
        Some(delay) => delay
            .saturating_mul(2)
            .min(config.max_reconnect_delay)
            .max(config.reconnect_delay),
    }
}

/// Handle to a running poll loop.
///
/// Dropping the handle stops the loop.
pub struct PollHandle<T: Transport> {
    coordinator: Arc<PollCoordinator<T>>,
    refresh: Arc<Notify>,
    task: SyncMutex<Option<JoinHandle<()>>>,
}

impl<T: Transport> PollHandle<T> {
    /// Run a cycle as soon as possible (right after the current one, if any).
    pub fn refresh(&self) {
        self.refresh.notify_one();
    }

    pub fn events(&self) -> broadcast::Receiver<PollEvent> {
        self.coordinator.events()
    }

    pub fn coordinator(&self) -> &PollCoordinator<T> {
        &self.coordinator
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Stop the loop and wait for it. Idempotent.
    pub async fn shutdown(&self) {
        self.coordinator.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                warn!(address = %self.coordinator.session.address(), error = %err, "poll task ended abnormally");
            }
        }
    }
}

impl<T: Transport> Drop for PollHandle<T> {
    fn drop(&mut self) {
        self.coordinator.cancel.cancel();
    }
}
