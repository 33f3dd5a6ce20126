//! One authenticated session to one unit.
//!
//! Every protocol exchange runs under a single async mutex, exposed as the
//! [`Exclusive`] guard so a caller (the poll coordinator) can chain
//! connect, authenticate and request without another task interleaving frames
//! on the wire. Notifications arrive outside that section and only swap the
//! state snapshot and flip link flags, both behind short synchronous locks.

use std::sync::{Arc, Mutex as SyncMutex, MutexGuard as SyncGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ventlink_frame::{
    decode_frame, encode_command, parse_state, AuthReply, Command, DeviceState, FrameError, Mode,
    ResponseKind,
};
use ventlink_transport::{NotificationHandler, Transport, TransportError};

use crate::auth::{AuthStatus, LinkState};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::snapshot::{Setpoint, StateStore};

/// Speed range accepted by the unit.
pub const SPEED_MIN: u8 = 1;
pub const SPEED_MAX: u8 = 10;

/// Display brightness ceiling.
pub const BRIGHTNESS_MAX: u8 = 100;

/// Callback for every authoritative state snapshot.
pub type StateListener = Arc<dyn Fn(&DeviceState) + Send + Sync>;

/// Callback for a link lost without a local disconnect.
pub type DisconnectListener = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle notifications published by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Authenticated,
    StateUpdated(DeviceState),
    Disconnected,
}

#[derive(Default)]
struct Listeners {
    state: Vec<StateListener>,
    disconnect: Vec<DisconnectListener>,
}

/// State reachable from transport callbacks. Never holds the transport.
struct Shared {
    address: String,
    link: SyncMutex<LinkState>,
    store: StateStore,
    listeners: SyncMutex<Listeners>,
    events: broadcast::Sender<SessionEvent>,
}

impl Shared {
    fn link(&self) -> SyncGuard<'_, LinkState> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> SyncGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn is_connected(&self) -> bool {
        self.link().is_connected()
    }

    fn auth_status(&self) -> AuthStatus {
        self.link().auth()
    }

    fn link_up(&self) {
        self.link().connected();
        self.emit(SessionEvent::Connected);
    }

    /// Forget the link without telling listeners. Returns whether it was up.
    fn link_reset(&self) -> bool {
        let was = self.link().disconnected();
        self.store.clear();
        was
    }

    fn link_lost(&self, reason: &str) {
        if !self.link_reset() {
            return;
        }
        warn!(address = %self.address, reason, "link lost");
        self.emit(SessionEvent::Disconnected);
        let listeners = self.listeners().disconnect.clone();
        for listener in listeners {
            listener();
        }
    }

    fn generation(&self) -> u64 {
        self.link().generation()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link().is_current(generation)
    }

    /// Frames from a link that has since been reset are dropped.
    fn apply_auth(&self, generation: u64, reply: AuthReply) {
        let changed = {
            let mut link = self.link();
            if !link.is_current(generation) {
                debug!(address = %self.address, ?reply, "dropping auth reply from a closed link");
                return;
            }
            link.auth_reply(reply)
        };
        match (changed, reply) {
            (Some(AuthStatus::Authenticated), _) => {
                info!(address = %self.address, "authentication confirmed");
                self.emit(SessionEvent::Authenticated);
            }
            (Some(_), AuthReply::Rejected(code)) => {
                warn!(address = %self.address, code, "device rejected authentication");
            }
            _ => debug!(address = %self.address, ?reply, "auth reply"),
        }
    }

    /// Replace the snapshot. `Ok(None)` when the frame belongs to a closed link.
    ///
    /// The link lock is held across the replace so a concurrent reset either
    /// sees the new snapshot and clears it, or retires the generation first.
    fn apply_state(
        &self,
        generation: u64,
        body: &[u8],
    ) -> std::result::Result<Option<DeviceState>, FrameError> {
        let state = parse_state(body, self.store.last_mode())?;
        let (version, promoted) = {
            let mut link = self.link();
            if !link.is_current(generation) {
                debug!(address = %self.address, "dropping state frame from a closed link");
                return Ok(None);
            }
            let version = self.store.replace(state.clone());
            (version, link.state_decoded())
        };
        debug!(address = %self.address, version, "state snapshot replaced");

        if promoted {
            info!(address = %self.address, "authenticated (state frame decoded)");
            self.emit(SessionEvent::Authenticated);
        }
        self.emit(SessionEvent::StateUpdated(state.clone()));

        let listeners = self.listeners().state.clone();
        for listener in listeners {
            listener(&state);
        }
        Ok(Some(state))
    }

    fn handle_notification(&self, generation: u64, data: &[u8]) {
        let response = match decode_frame(data) {
            Ok(response) => response,
            Err(err) => {
                warn!(address = %self.address, len = data.len(), error = %err, "dropping rejected frame");
                return;
            }
        };

        match response.kind() {
            ResponseKind::Auth(reply) => self.apply_auth(generation, reply),
            ResponseKind::State(body) => {
                if let Err(err) = self.apply_state(generation, &body) {
                    warn!(address = %self.address, error = %err, "dropping unparseable state record");
                }
            }
            ResponseKind::Other(code) => {
                debug!(address = %self.address, code, "ignoring response to command");
            }
        }
    }
}

/// A session to one unit over transport `T`.
pub struct Session<T: Transport> {
    transport: T,
    config: SessionConfig,
    shared: Arc<Shared>,
    exclusive: Mutex<()>,
    cancel: CancellationToken,
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session. Nothing touches the link until the
    /// first operation.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let shared = Arc::new(Shared {
            address: transport.address().to_string(),
            link: SyncMutex::new(LinkState::default()),
            store: StateStore::default(),
            listeners: SyncMutex::new(Listeners::default()),
            events,
        });

        let on_drop = Arc::clone(&shared);
        transport.on_disconnect(Arc::new(move || {
            on_drop.link_lost("link dropped by transport");
        }));

        Self {
            transport,
            config,
            shared,
            exclusive: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.shared.address
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.shared.auth_status()
    }

    /// `Err(AuthNotConfirmed)` while AUTH is sent but unconfirmed. Advisory only.
    pub fn auth_confirmed(&self) -> Result<()> {
        match self.auth_status() {
            AuthStatus::Authenticated => Ok(()),
            AuthStatus::AuthSent => Err(SessionError::AuthNotConfirmed),
            AuthStatus::Unauthenticated if self.is_connected() => Err(SessionError::AuthNotConfirmed),
            AuthStatus::Unauthenticated => Err(SessionError::NotConnected),
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Last known state: the speculative overlay if one is active, otherwise
    /// the authoritative snapshot. `None` until a state frame decodes on the
    /// current link.
    pub fn get_current_state(&self) -> Option<DeviceState> {
        self.shared.store.current()
    }

    /// The unit's own last report, ignoring any speculative overlay.
    pub fn reported_state(&self) -> Option<DeviceState> {
        self.shared.store.authoritative()
    }

    /// Register a callback for every authoritative snapshot.
    ///
    /// Runs on the notification path, possibly while another task holds the
    /// exclusive section. Keep it short and do not call back into the session.
    pub fn on_state_update<F>(&self, listener: F)
    where
        F: Fn(&DeviceState) + Send + Sync + 'static,
    {
        self.shared.listeners().state.push(Arc::new(listener));
    }

    /// Register a callback for links that drop without a local disconnect.
    pub fn on_disconnect<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.listeners().disconnect.push(Arc::new(listener));
    }

    /// Subscribe to session lifecycle events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// Acquire the exclusive section. Fails with `Shutdown` once stopped.
    pub async fn lock(&self) -> Result<Exclusive<'_, T>> {
        if self.cancel.is_cancelled() {
            return Err(SessionError::Shutdown);
        }
        let guard = tokio::select! {
            guard = self.exclusive.lock() => guard,
            () = self.cancel.cancelled() => return Err(SessionError::Shutdown),
        };
        Ok(Exclusive {
            session: self,
            _guard: guard,
        })
    }

    pub async fn ensure_connected(&self) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.ensure_connected().await
    }

    pub async fn authenticate(&self) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.authenticate().await
    }

    pub async fn request_state(&self) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.request_state().await
    }

    pub async fn set_power(&self, on: bool) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.set_power(on).await
    }

    pub async fn set_speed(&self, speed: u8) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.set_speed(speed).await
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.set_mode(mode).await
    }

    pub async fn set_brightness(&self, level: u8) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.set_brightness(level).await
    }

    pub async fn reset_filter(&self) -> Result<()> {
        let mut guard = self.lock().await?;
        guard.reset_filter().await
    }

    /// Tear the session down. Idempotent; teardown errors are logged, not
    /// returned.
    ///
    /// In-flight operations observe cancellation at their next settle delay
    /// and fail with `Shutdown`. Every later operation fails the same way.
    pub async fn stop(&self) {
        let first = !self.cancel.is_cancelled();
        self.cancel.cancel();
        let _guard = self.exclusive.lock().await;

        if self.transport.is_connected() {
            if let Err(err) = self.transport.unsubscribe(self.config.characteristic).await {
                warn!(address = %self.shared.address, error = %err, "failed to stop notifications during teardown");
            }
            if let Err(err) = self.transport.disconnect().await {
                warn!(address = %self.shared.address, error = %err, "disconnect failed during teardown");
            }
        }
        self.shared.link_reset();

        if first {
            info!(address = %self.shared.address, "session stopped");
        } else {
            debug!(address = %self.shared.address, "session already stopped");
        }
    }

    /// Close a partially established link without notifying listeners.
    async fn abort_connect(&self) {
        if let Err(err) = self.transport.disconnect().await {
            debug!(address = %self.shared.address, error = %err, "disconnect after failed setup");
        }
        self.shared.link_reset();
    }

    /// Treat a failed write or read as a dropped link.
    async fn drop_link(&self, reason: &str) {
        if let Err(err) = self.transport.disconnect().await {
            debug!(address = %self.shared.address, error = %err, "disconnect after link failure");
        }
        self.shared.link_lost(reason);
    }
}

/// Exclusive access to a session's link for a sequence of operations.
pub struct Exclusive<'a, T: Transport> {
    session: &'a Session<T>,
    _guard: MutexGuard<'a, ()>,
}

impl<T: Transport> Exclusive<'_, T> {
    pub fn session(&self) -> &Session<T> {
        self.session
    }

    fn require_live(&self) -> Result<()> {
        if self.session.cancel.is_cancelled() {
            return Err(SessionError::Shutdown);
        }
        if !self.session.shared.is_connected() {
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    async fn settle(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            () = tokio::time::sleep(delay) => Ok(()),
            () = self.session.cancel.cancelled() => Err(SessionError::Shutdown),
        }
    }

    /// Connect, subscribe and attempt AUTH unless already connected.
    ///
    /// Succeeds once connect and subscribe succeed; the AUTH outcome does not
    /// matter. Any setup failure closes the partial link.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        let session = self.session;
        if session.cancel.is_cancelled() {
            return Err(SessionError::Shutdown);
        }
        if session.shared.is_connected() {
            if session.transport.is_connected() {
                return Ok(());
            }
            session.shared.link_lost("transport reports link down");
        }

        let address = session.shared.address.as_str();
        info!(address, "connecting");
        // Enforced here too: an adapter may ignore its own timeout argument.
        let ceiling = session.config.connect_timeout;
        let connected = tokio::select! {
            res = tokio::time::timeout(ceiling, session.transport.connect(ceiling)) => {
                res.unwrap_or(Err(TransportError::Timeout(ceiling)))
            }
            () = session.cancel.cancelled() => Err(TransportError::Shutdown),
        };
        if let Err(err) = connected {
            warn!(address, error = %err, "connect failed");
            session.abort_connect().await;
            if session.cancel.is_cancelled() {
                return Err(SessionError::Shutdown);
            }
            return Err(err.into());
        }

        // Only this link's subscription may touch the snapshot.
        let generation = session.shared.generation();
        let shared = Arc::clone(&session.shared);
        let handler: NotificationHandler =
            Arc::new(move |data: Bytes| shared.handle_notification(generation, &data));
        if let Err(err) = session
            .transport
            .subscribe(session.config.characteristic, handler)
            .await
        {
            warn!(address, error = %err, "notification setup failed, closing link");
            session.abort_connect().await;
            return Err(err.into());
        }

        session.shared.link_up();
        info!(address, "connected");

        match self.authenticate().await {
            Ok(()) => {}
            Err(SessionError::Shutdown) => return Err(SessionError::Shutdown),
            Err(err) => {
                warn!(address, error = %err, "authentication attempt failed, continuing unauthenticated");
            }
        }
        Ok(())
    }

    /// Send AUTH and wait for a confirmation to arrive.
    ///
    /// Succeeds when the frame was handed to the transport; the unit's answer
    /// only moves [`AuthStatus`]. A failed AUTH write leaves the link up.
    pub async fn authenticate(&mut self) -> Result<()> {
        self.require_live()?;
        let session = self.session;
        let address = session.shared.address.as_str();

        let frame = encode_command(Command::Auth, &session.config.password, &[]);
        if let Err(err) = session
            .transport
            .write(session.config.characteristic, frame.as_ref(), false)
            .await
        {
            warn!(address, error = %err, "failed to send AUTH");
            return Err(err.into());
        }
        session.shared.link().auth_sent();
        debug!(address, "AUTH sent");

        self.settle(session.config.command_settle + session.config.auth_settle)
            .await?;
        if session.shared.auth_status() == AuthStatus::AuthSent {
            debug!(address, "{}", SessionError::AuthNotConfirmed);
        }
        Ok(())
    }

    /// Send GET_STATE, then read the characteristic directly.
    ///
    /// Succeeds when either the notification path or the direct read
    /// produced a new snapshot on a link that is still up. A state
    /// notification may still arrive after this returns an error.
    pub async fn request_state(&mut self) -> Result<()> {
        let session = self.session;
        let generation = session.shared.generation();
        let before = session.shared.store.version();

        self.send(Command::GetState, &[]).await?;
        self.settle(session.config.read_settle).await?;

        let direct = self.read_state(generation).await;
        let notified = session.shared.store.version() != before;
        let current = session.shared.is_current(generation);
        match direct {
            Err(SessionError::Shutdown) => Err(SessionError::Shutdown),
            Ok(()) if current => Ok(()),
            Ok(()) => Err(SessionError::NotConnected),
            Err(err) if notified && current => {
                debug!(address = %session.shared.address, error = %err, "direct read unusable, state arrived by notification");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn read_state(&mut self, generation: u64) -> Result<()> {
        self.require_live()?;
        let session = self.session;
        let address = session.shared.address.as_str();

        let raw = match session.transport.read(session.config.characteristic).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(address, error = %err, "direct read failed, dropping link");
                session.drop_link("direct read failed").await;
                return Err(err.into());
            }
        };

        if !raw.is_empty() && raw.iter().all(|b| *b == 0) {
            warn!(address, len = raw.len(), "direct read returned only zeros, device may not accept the password");
            return Err(SessionError::NoDataAvailable);
        }

        let response = decode_frame(&raw).map_err(|err| {
            warn!(address, len = raw.len(), error = %err, "direct read rejected");
            err
        })?;

        match response.kind() {
            ResponseKind::State(body) => match session.shared.apply_state(generation, &body)? {
                Some(_) => Ok(()),
                None => Err(SessionError::NotConnected),
            },
            ResponseKind::Auth(reply) => {
                session.shared.apply_auth(generation, reply);
                Err(SessionError::NoDataAvailable)
            }
            ResponseKind::Other(code) => {
                warn!(address, code, "direct read holds a response to another command");
                Err(SessionError::NoDataAvailable)
            }
        }
    }

    async fn send(&mut self, command: Command, args: &[u8]) -> Result<()> {
        self.require_live()?;
        let session = self.session;
        let address = session.shared.address.as_str();

        let frame = encode_command(command, &session.config.password, args);
        if let Err(err) = session
            .transport
            .write(session.config.characteristic, frame.as_ref(), false)
            .await
        {
            warn!(address, command = command.name(), error = %err, "command write failed, dropping link");
            session.drop_link("command write failed").await;
            return Err(err.into());
        }
        debug!(address, command = command.name(), "command sent");
        self.settle(session.config.command_settle).await
    }

    async fn control(&mut self, command: Command, args: &[u8], setpoint: Setpoint) -> Result<()> {
        self.ensure_connected().await?;

        let session = self.session;
        if session.shared.auth_status() == AuthStatus::Unauthenticated {
            warn!(address = %session.shared.address, command = command.name(), "refusing command, session not authenticated");
            return Err(SessionError::CommandRejected {
                command: command.name(),
                reason: "not authenticated",
            });
        }

        self.send(command, args).await?;
        if session.shared.store.apply(setpoint) {
            debug!(address = %session.shared.address, ?setpoint, "speculative state applied");
        }
        Ok(())
    }

    pub async fn set_power(&mut self, on: bool) -> Result<()> {
        self.control(Command::SetPower, &[u8::from(on)], Setpoint::Power(on))
            .await
    }

    /// Speed is clamped to `1..=10`.
    pub async fn set_speed(&mut self, speed: u8) -> Result<()> {
        let speed = speed.clamp(SPEED_MIN, SPEED_MAX);
        self.control(Command::SetSpeed, &[speed], Setpoint::Speed(speed))
            .await
    }

    pub async fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.control(Command::SetMode, &[mode.code()], Setpoint::Mode(mode))
            .await
    }

    /// Brightness is clamped to `0..=100`.
    pub async fn set_brightness(&mut self, level: u8) -> Result<()> {
        let level = level.min(BRIGHTNESS_MAX);
        self.control(Command::SetBrightness, &[level], Setpoint::Brightness(level))
            .await
    }

    pub async fn reset_filter(&mut self) -> Result<()> {
        self.control(Command::ResetFilter, &[], Setpoint::FilterReset)
            .await
    }
}
