//! GATT identifiers exposed by the unit.
//!
//! The unit advertises a single service and multiplexes write, read and
//! notify over a single characteristic.

use std::fmt;

/// 16-bit UUID of the unit's service.
pub const SERVICE_UUID16: u16 = 0xBABA;

/// A characteristic addressed by its 16-bit UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Characteristic(pub u16);

impl Characteristic {
    /// Read / write / notify characteristic carrying all frames.
    pub const DATA: Characteristic = Characteristic(0xCCCC);

    /// Full 128-bit UUID on the Bluetooth base.
    pub fn uuid(self) -> String {
        uuid16_to_string(self.0)
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uuid())
    }
}

/// Expand a 16-bit UUID onto the Bluetooth base UUID.
pub fn uuid16_to_string(short: u16) -> String {
    format!("0000{short:04x}-0000-1000-8000-00805f9b34fb")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_characteristic_uuid() {
        assert_eq!(
            Characteristic::DATA.uuid(),
            "0000cccc-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            uuid16_to_string(SERVICE_UUID16),
            "0000baba-0000-1000-8000-00805f9b34fb"
        );
    }
}
