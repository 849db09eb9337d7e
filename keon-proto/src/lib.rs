//! Keon BLE provisioning protocol - constants, payload framing and the
//! handshake state machine

pub mod ble;
pub mod provisioning;

pub use provisioning::{
    Action, EncodeError, ProtocolError, Provisioner, Stage, chunk_token, command, prefixed,
    token_chunk_size,
};

/// Decode a characteristic value as printable ASCII.
///
/// Returns an empty string if any byte falls outside 32..=126.
pub fn printable_ascii(data: &[u8]) -> String {
    if data.iter().all(|b| (32..=126).contains(b)) {
        data.iter().map(|&b| b as char).collect()
    } else {
        String::new()
    }
}
