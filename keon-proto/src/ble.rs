//! BLE GATT Service Protocol Constants for Keon Device Provisioning
//!
//! This module defines the BLE service UUIDs, command bytes and payload
//! prefixes used for WiFi provisioning over BLE. The device uses 16-bit
//! UUIDs inside the Bluetooth base UUID namespace.

/// Name the device advertises, used for discovery filtering
pub const DEVICE_NAME: &str = "KEON WIFI";

pub const COMPANY_NAME: &str = "Kiiroo";

/// Primary service exposing every Keon characteristic
pub const PRIMARY_SERVICE_UUID: u16 = 0x1900;

/// Firmware Version Characteristic (read, ASCII)
pub const FIRMWARE_VERSION_UUID: u16 = 0x1901;

/// Manufacturer Name Characteristic (read, ASCII)
pub const MANUFACTURER_NAME_UUID: u16 = 0x1902;

/// Serial Number Characteristic (read, ASCII)
pub const SERIAL_NUMBER_UUID: u16 = 0x1903;

/// Provisioning Characteristic (write commands, read status byte)
pub const PROVISIONING_UUID: u16 = 0x2001;

/// Standard Battery Level Characteristic (read, single byte percentage)
pub const BATTERY_LEVEL_UUID: u16 = 0x2a19;

/// Motor Command Characteristic
pub const MOTOR_COMMAND_UUID: u16 = 0x1800;

/// Bluetooth base UUID: 00000000-0000-1000-8000-00805f9b34fb
const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;
const BASE_UUID_MASK: u128 = 0xffff_ffff_ffff_ffff_ffff_ffff;

/// Expand a 16-bit UUID into the full 128-bit Bluetooth UUID
pub const fn full_uuid(short: u16) -> u128 {
    BASE_UUID | ((short as u128) << 96)
}

/// Extract the 16-bit value from a full UUID, if it lives in the Bluetooth
/// base namespace
pub const fn short_uuid(full: u128) -> Option<u16> {
    if full & BASE_UUID_MASK != BASE_UUID & BASE_UUID_MASK || full >> 112 != 0 {
        return None;
    }
    Some((full >> 96) as u16)
}

/// Format a 16-bit UUID as `0000xxxx-0000-1000-8000-00805f9b34fb`
pub fn full_uuid_string(short: u16) -> String {
    format!("0000{short:04x}-0000-1000-8000-00805f9b34fb")
}

/// Provisioning command bytes, written as one-byte payloads
pub mod commands {
    /// Switch the device into WiFi mode
    pub const CHANGE_MODE_WIFI: u8 = 0x01;

    /// Begin a credential transfer
    pub const START: u8 = 0x02;

    /// Commit the transferred credentials
    pub const CRED_CONFIRM: u8 = 0x03;

    /// Revert to the previous credentials. Not part of the handshake.
    pub const REVERT: u8 = 0x04;

    /// Clear the stored network list
    pub const CLEAN_LIST: u8 = 0x05;
}

/// Text prefixes for string payloads
pub mod prefixes {
    pub const SSID: &str = "0";
    pub const PASSWORD: &str = "1";
    pub const TOKEN: &str = "2";
}

/// Status byte the device returns when a stage was accepted
pub const STATUS_ACK: u8 = 17;

/// MTU assumed when the transport does not report one
pub const DEFAULT_MTU_SIZE: usize = 512;

/// Bytes of each write reserved for ATT framing and the payload prefix
pub const FRAMING_OVERHEAD: usize = 12;
