//! In-process simulated ventilation unit.
//!
//! [`SimulatedUnit`] implements [`Transport`] by emulating the device end of
//! the protocol: it validates incoming command frames, applies control
//! commands to its own [`DeviceState`], answers AUTH and GET_STATE through
//! notifications, and leaves the last response readable on the data
//! characteristic. [`Faults`] injects the failure modes seen on real links.
//!
//! Clones share the same unit, so a test can keep a handle while the session
//! owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};
use ventlink_frame::{
    encode_response, encode_state, Command, CommandFrame, DeviceState, Mode, Password,
    COMMAND_FRAME_LEN,
};

use crate::error::{Result, TransportError};
use crate::gatt::Characteristic;
use crate::traits::{DisconnectHandler, NotificationHandler, Transport};

/// Failure injection switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// `connect()` fails.
    pub refuse_connect: bool,
    /// `connect()` takes this long (compared against the caller's timeout).
    pub connect_delay: Option<Duration>,
    /// `connect()` never completes and ignores the caller's timeout.
    pub stall_connect: bool,
    /// `subscribe()` fails.
    pub refuse_subscribe: bool,
    /// `unsubscribe()` fails.
    pub fail_unsubscribe: bool,
    /// Every `write()` fails.
    pub fail_writes: bool,
    /// Only AUTH writes fail.
    pub fail_auth_write: bool,
    /// Every `read()` fails.
    pub fail_reads: bool,
    /// Reads return a corrupted frame.
    pub garble_reads: bool,
    /// Responses are not pushed as notifications (direct reads still work).
    pub suppress_notifications: bool,
    /// GET_STATE responses are only pushed as notifications, never left readable.
    pub notify_only: bool,
    /// AUTH is accepted silently, without a confirmation notification.
    pub silent_auth: bool,
}

struct SimState {
    connected: bool,
    device: DeviceState,
    readable: Bytes,
    notify: Option<NotificationHandler>,
    on_disconnect: Option<DisconnectHandler>,
    faults: Faults,
    written: Vec<CommandFrame>,
    connects: usize,
    authenticated: bool,
}

struct SimInner {
    address: String,
    password: Password,
    notify_delay: Duration,
    state: Mutex<SimState>,
}

/// Emulated unit reachable through the [`Transport`] contract.
#[derive(Clone)]
pub struct SimulatedUnit {
    inner: Arc<SimInner>,
}

impl SimulatedUnit {
    /// A unit with the given address and password, reporting `default_state()`.
    pub fn new(address: impl Into<String>, password: Password) -> Self {
        Self::with_state(address, password, Self::default_state())
    }

    /// A unit starting from an explicit state.
    pub fn with_state(address: impl Into<String>, password: Password, device: DeviceState) -> Self {
        Self {
            inner: Arc::new(SimInner {
                address: address.into(),
                password,
                notify_delay: Duration::from_millis(2),
                state: Mutex::new(SimState {
                    connected: false,
                    device,
                    readable: Bytes::from_static(&[0u8; COMMAND_FRAME_LEN]),
                    notify: None,
                    on_disconnect: None,
                    faults: Faults::default(),
                    written: Vec::new(),
                    connects: 0,
                    authenticated: false,
                }),
            }),
        }
    }

    /// A plausible idle unit: on, speed 3, auto mode, all sensors reporting.
    pub fn default_state() -> DeviceState {
        DeviceState {
            power: true,
            speed: 3,
            mode: Some(Mode::Auto),
            winter_mode_active: false,
            auto_mode_active: true,
            temp_in: 21,
            temp_out: 8,
            temp_exhaust: 12,
            temp_supply: 18,
            humidity: Some(45),
            co2: Some(620),
            voc: Some(110),
            filter_timer_days: Some(37),
            brightness: Some(60),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the fault switches.
    pub fn set_faults(&self, faults: Faults) {
        self.lock().faults = faults;
    }

    /// Adjust the fault switches in place.
    pub fn update_faults(&self, f: impl FnOnce(&mut Faults)) {
        f(&mut self.lock().faults);
    }

    /// Current device-side state.
    pub fn device_state(&self) -> DeviceState {
        self.lock().device.clone()
    }

    /// Overwrite the device-side state.
    pub fn set_device_state(&self, device: DeviceState) {
        self.lock().device = device;
    }

    /// Every well-formed command frame received, in order.
    pub fn written(&self) -> Vec<CommandFrame> {
        self.lock().written.clone()
    }

    /// Command codes received, in order.
    pub fn written_codes(&self) -> Vec<u8> {
        self.lock().written.iter().map(CommandFrame::code).collect()
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Whether a correct AUTH has been received on the current link.
    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    /// Push the current state as an unsolicited notification.
    pub fn push_state(&self) {
        let frame = {
            let state = self.lock();
            if !state.connected {
                return;
            }
            state_frame(&state.device)
        };
        if let Some(frame) = frame {
            self.notify(frame);
        }
    }

    /// Push arbitrary bytes as a notification (for malformed-frame tests).
    pub fn push_raw(&self, bytes: impl Into<Bytes>) {
        self.notify(bytes.into());
    }

    /// Drop the link as if the unit went out of range.
    pub fn drop_link(&self) {
        let handler = {
            let mut state = self.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.notify = None;
            state.authenticated = false;
            state.on_disconnect.clone()
        };
        warn!(address = %self.inner.address, "simulated link dropped");
        if let Some(handler) = handler {
            handler();
        }
    }

    fn notify(&self, bytes: Bytes) {
        let handler = {
            let state = self.lock();
            if state.faults.suppress_notifications {
                return;
            }
            state.notify.clone()
        };
        let Some(handler) = handler else {
            return;
        };
        let delay = self.inner.notify_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handler(bytes);
        });
    }

    fn handle_command(&self, frame: CommandFrame) {
        let arg = frame.args()[0];
        let mut state = self.lock();
        state.written.push(frame);

        let password_ok = &frame.as_bytes()[1..5] == self.inner.password.as_bytes();
        let command = match Command::try_from(frame.code()) {
            Ok(command) => command,
            Err(err) => {
                warn!(%err, "simulated unit ignoring unknown command");
                return;
            }
        };

        let reply = match command {
            Command::Auth if password_ok => {
                state.authenticated = true;
                (!state.faults.silent_auth)
                    .then(|| response(Command::Auth, &[0x01]))
                    .flatten()
            }
            Command::Auth => {
                state.authenticated = false;
                response(Command::Auth, &[0x00])
            }
            _ if !password_ok => {
                state.readable = Bytes::from_static(&[0u8; COMMAND_FRAME_LEN]);
                None
            }
            Command::GetState => {
                let frame = state_frame(&state.device);
                if let (Some(frame), false) = (&frame, state.faults.notify_only) {
                    state.readable = frame.clone();
                }
                frame
            }
            Command::SetPower => {
                state.device.power = arg != 0;
                None
            }
            Command::SetSpeed => {
                state.device.speed = arg.clamp(1, 10);
                None
            }
            Command::SetMode => {
                if let Ok(mode) = Mode::try_from(arg) {
                    state.device.mode = Some(mode);
                }
                None
            }
            Command::SetBrightness => {
                state.device.brightness = Some(arg.min(100));
                None
            }
            Command::ResetFilter => {
                state.device.filter_timer_days = Some(0);
                None
            }
            Command::SetTimer => None,
        };
        drop(state);

        debug!(command = command.name(), password_ok, "simulated unit handled command");
        if let Some(reply) = reply {
            self.notify(reply);
        }
    }
}

/// `None` when the body does not fit a frame; the unit then stays silent.
fn response(command: Command, body: &[u8]) -> Option<Bytes> {
    let mut buf = BytesMut::new();
    if let Err(err) = encode_response(command.code(), body, &mut buf) {
        warn!(command = command.name(), %err, "simulated unit cannot encode response");
        return None;
    }
    Some(buf.freeze())
}

fn state_frame(device: &DeviceState) -> Option<Bytes> {
    response(Command::GetState, &encode_state(device))
}

#[async_trait]
impl Transport for SimulatedUnit {
    fn address(&self) -> &str {
        &self.inner.address
    }

    async fn connect(&self, timeout: Duration) -> Result<()> {
        let (refuse, delay, stall) = {
            let state = self.lock();
            (
                state.faults.refuse_connect,
                state.faults.connect_delay,
                state.faults.stall_connect,
            )
        };
        if stall {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = delay {
            if delay > timeout {
                tokio::time::sleep(timeout).await;
                return Err(TransportError::Timeout(timeout));
            }
            tokio::time::sleep(delay).await;
        }
        if refuse {
            return Err(TransportError::Connect {
                address: self.inner.address.clone(),
                reason: "device not reachable".to_string(),
            });
        }

        let mut state = self.lock();
        state.connected = true;
        state.authenticated = false;
        state.connects += 1;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut state = self.lock();
        state.connected = false;
        state.notify = None;
        state.authenticated = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn write(
        &self,
        characteristic: Characteristic,
        data: &[u8],
        _with_response: bool,
    ) -> Result<()> {
        {
            let state = self.lock();
            if !state.connected {
                return Err(TransportError::NotConnected);
            }
            let is_auth = data.first() == Some(&Command::Auth.code());
            if state.faults.fail_writes || (is_auth && state.faults.fail_auth_write) {
                return Err(TransportError::Write {
                    characteristic,
                    reason: "simulated write failure".to_string(),
                });
            }
        }

        match CommandFrame::from_bytes(data) {
            Some(frame) if frame.is_valid() => self.handle_command(frame),
            _ => warn!(len = data.len(), "simulated unit ignoring malformed command frame"),
        }
        Ok(())
    }

    async fn read(&self, characteristic: Characteristic) -> Result<Bytes> {
        let state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.faults.fail_reads {
            return Err(TransportError::Read {
                characteristic,
                reason: "simulated read failure".to_string(),
            });
        }
        if state.faults.garble_reads {
            let mut garbled = state.readable.to_vec();
            if let Some(last) = garbled.last_mut() {
                *last ^= 0xFF;
            }
            return Ok(Bytes::from(garbled));
        }
        Ok(state.readable.clone())
    }

    async fn subscribe(
        &self,
        characteristic: Characteristic,
        handler: NotificationHandler,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.connected {
            return Err(TransportError::NotConnected);
        }
        if state.faults.refuse_subscribe {
            return Err(TransportError::Subscribe {
                characteristic,
                reason: "simulated subscribe failure".to_string(),
            });
        }
        state.notify = Some(handler);
        Ok(())
    }

    async fn unsubscribe(&self, characteristic: Characteristic) -> Result<()> {
        let mut state = self.lock();
        if state.faults.fail_unsubscribe {
            return Err(TransportError::Subscribe {
                characteristic,
                reason: "simulated unsubscribe failure".to_string(),
            });
        }
        state.notify = None;
        Ok(())
    }

    fn on_disconnect(&self, handler: DisconnectHandler) {
        self.lock().on_disconnect = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ventlink_frame::{decode_frame, encode_command, parse_state, ResponseKind};

    use super::*;

    fn unit() -> SimulatedUnit {
        SimulatedUnit::new("AA:BB:CC:DD:EE:FF", Password::new("1234").unwrap())
    }

    #[test]
    fn oversized_response_is_not_sent() {
        assert!(response(Command::GetState, &[0u8; 255]).is_none());

        let auth = response(Command::Auth, &[0x01]).expect("auth reply fits");
        assert_eq!(auth.as_ref(), &[0x55, 0xAA, 0x02, 0x01, 0x01, 0x02]);
    }

    #[tokio::test]
    async fn stalled_connect_ignores_timeout() {
        let unit = unit();
        unit.set_faults(Faults {
            stall_connect: true,
            ..Faults::default()
        });

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            unit.connect(Duration::from_millis(5)),
        )
        .await;
        assert!(outcome.is_err(), "connect should still be pending");
        assert!(!unit.is_connected());
    }

    #[tokio::test]
    async fn get_state_is_readable_after_write() {
        let unit = unit();
        unit.connect(Duration::from_secs(1)).await.unwrap();

        let frame = encode_command(Command::GetState, &Password::new("1234").unwrap(), &[]);
        unit.write(Characteristic::DATA, frame.as_ref(), false)
            .await
            .unwrap();

        let raw = unit.read(Characteristic::DATA).await.unwrap();
        let resp = decode_frame(&raw).unwrap();
        let ResponseKind::State(body) = resp.kind() else {
            panic!("expected state response");
        };
        let state = parse_state(&body, None).unwrap();
        assert_eq!(state, SimulatedUnit::default_state());
    }

    #[tokio::test]
    async fn wrong_password_reads_zeros() {
        let unit = unit();
        unit.connect(Duration::from_secs(1)).await.unwrap();

        let frame = encode_command(Command::GetState, &Password::new("0000").unwrap(), &[]);
        unit.write(Characteristic::DATA, frame.as_ref(), false)
            .await
            .unwrap();

        let raw = unit.read(Characteristic::DATA).await.unwrap();
        assert!(raw.iter().all(|b| *b == 0));
    }

    #[tokio::test]
    async fn control_commands_change_device_state() {
        let unit = unit();
        let pwd = Password::new("1234").unwrap();
        unit.connect(Duration::from_secs(1)).await.unwrap();

        for (command, arg) in [
            (Command::SetPower, 0u8),
            (Command::SetSpeed, 42),
            (Command::SetMode, Mode::Exhaust.code()),
            (Command::SetBrightness, 250),
        ] {
            let frame = encode_command(command, &pwd, &[arg]);
            unit.write(Characteristic::DATA, frame.as_ref(), false)
                .await
                .unwrap();
        }

        let state = unit.device_state();
        assert!(!state.power);
        assert_eq!(state.speed, 10);
        assert_eq!(state.mode, Some(Mode::Exhaust));
        assert_eq!(state.brightness, Some(100));
        assert_eq!(unit.written_codes(), vec![0x04, 0x02, 0x03, 0x08]);
    }

    #[tokio::test]
    async fn drop_link_fires_disconnect_handler_once() {
        let unit = unit();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        unit.on_disconnect(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        unit.connect(Duration::from_secs(1)).await.unwrap();
        unit.drop_link();
        unit.drop_link();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!unit.is_connected());

        unit.connect(Duration::from_secs(1)).await.unwrap();
        unit.disconnect().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn connect_faults() {
        let unit = unit();
        unit.set_faults(Faults {
            refuse_connect: true,
            ..Faults::default()
        });
        assert!(matches!(
            unit.connect(Duration::from_secs(1)).await,
            Err(TransportError::Connect { .. })
        ));

        unit.set_faults(Faults {
            connect_delay: Some(Duration::from_millis(50)),
            ..Faults::default()
        });
        assert!(matches!(
            unit.connect(Duration::from_millis(5)).await,
            Err(TransportError::Timeout(_))
        ));
        assert_eq!(unit.connect_count(), 0);
    }

    #[tokio::test]
    async fn write_requires_connection() {
        let unit = unit();
        let frame = encode_command(Command::Auth, &Password::new("1234").unwrap(), &[]);
        let err = unit
            .write(Characteristic::DATA, frame.as_ref(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
        assert!(unit.written().is_empty());
    }
}
