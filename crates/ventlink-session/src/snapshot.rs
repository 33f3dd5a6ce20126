//! Last-known device state with a speculative overlay.
//!
//! The authoritative snapshot is only ever replaced whole. Control commands
//! put an overlay on top of it (the commanded value applied to a copy); the
//! next authoritative snapshot discards the overlay unconditionally.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use ventlink_frame::{DeviceState, Mode};

/// A commanded value, applied speculatively until the unit reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Setpoint {
    Power(bool),
    Speed(u8),
    Mode(Mode),
    Brightness(u8),
    FilterReset,
}

impl Setpoint {
    fn apply(self, state: &mut DeviceState) {
        match self {
            Setpoint::Power(on) => state.power = on,
            Setpoint::Speed(speed) => state.speed = speed,
            Setpoint::Mode(mode) => state.mode = Some(mode),
            Setpoint::Brightness(level) => state.brightness = Some(level),
            Setpoint::FilterReset => state.filter_timer_days = Some(0),
        }
    }
}

#[derive(Default)]
struct Slots {
    authoritative: Option<DeviceState>,
    overlay: Option<DeviceState>,
    // Survives `clear` so an unknown mode code after a reconnect still
    // falls back to the last decoded mode.
    last_mode: Option<Mode>,
    version: u64,
}

#[derive(Default)]
pub(crate) struct StateStore {
    slots: RwLock<Slots>,
}

impl StateStore {
    fn read(&self) -> RwLockReadGuard<'_, Slots> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Slots> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overlay if present, otherwise the authoritative snapshot.
    pub(crate) fn current(&self) -> Option<DeviceState> {
        let slots = self.read();
        slots
            .overlay
            .clone()
            .or_else(|| slots.authoritative.clone())
    }

    pub(crate) fn authoritative(&self) -> Option<DeviceState> {
        self.read().authoritative.clone()
    }

    /// Bumped on every authoritative replace.
    pub(crate) fn version(&self) -> u64 {
        self.read().version
    }

    pub(crate) fn last_mode(&self) -> Option<Mode> {
        self.read().last_mode
    }

    pub(crate) fn replace(&self, state: DeviceState) -> u64 {
        let mut slots = self.write();
        if state.mode.is_some() {
            slots.last_mode = state.mode;
        }
        slots.authoritative = Some(state);
        slots.overlay = None;
        slots.version += 1;
        slots.version
    }

    /// Returns false when there is no authoritative snapshot to overlay.
    pub(crate) fn apply(&self, setpoint: Setpoint) -> bool {
        let mut slots = self.write();
        let Some(mut next) = slots
            .overlay
            .clone()
            .or_else(|| slots.authoritative.clone())
        else {
            return false;
        };
        setpoint.apply(&mut next);
        slots.overlay = Some(next);
        true
    }

    pub(crate) fn clear(&self) {
        let mut slots = self.write();
        slots.authoritative = None;
        slots.overlay = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(speed: u8) -> DeviceState {
        DeviceState {
            power: true,
            speed,
            mode: Some(Mode::Auto),
            winter_mode_active: false,
            auto_mode_active: true,
            temp_in: 20,
            temp_out: 5,
            temp_exhaust: 10,
            temp_supply: 18,
            humidity: Some(40),
            co2: Some(500),
            voc: None,
            filter_timer_days: Some(12),
            brightness: Some(50),
        }
    }

    #[test]
    fn empty_store_has_nothing_to_overlay() {
        let store = StateStore::default();
        assert!(store.current().is_none());
        assert!(!store.apply(Setpoint::Speed(4)));
        assert!(store.current().is_none());
    }

    #[test]
    fn overlay_stacks_on_authoritative() {
        let store = StateStore::default();
        store.replace(state(3));

        assert!(store.apply(Setpoint::Speed(7)));
        assert!(store.apply(Setpoint::FilterReset));
        assert!(store.apply(Setpoint::Power(false)));

        let current = store.current().unwrap();
        assert_eq!(current.speed, 7);
        assert_eq!(current.filter_timer_days, Some(0));
        assert!(!current.power);
        assert_eq!(store.authoritative().unwrap().speed, 3);
    }

    #[test]
    fn authoritative_replace_discards_overlay() {
        let store = StateStore::default();
        store.replace(state(3));
        store.apply(Setpoint::Mode(Mode::Winter));
        store.apply(Setpoint::Brightness(90));

        let v = store.replace(state(2));
        assert_eq!(v, 2);
        let current = store.current().unwrap();
        assert_eq!(current, state(2));
    }

    #[test]
    fn clear_keeps_last_mode() {
        let store = StateStore::default();
        let mut summer = state(1);
        summer.mode = Some(Mode::Summer);
        store.replace(summer);

        let mut unknown = state(1);
        unknown.mode = None;
        store.replace(unknown);

        store.clear();
        assert!(store.current().is_none());
        assert_eq!(store.last_mode(), Some(Mode::Summer));
        assert_eq!(store.version(), 2);
    }
}
