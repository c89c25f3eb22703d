//! The `I` device info block: player index, serial number, firmware version.

use serde::{Deserialize, Serialize};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::constants::{DEVICE_INFO_SIZE, SERIAL_NUMBER_LEN};
use crate::error::SmxError;

#[derive(FromBytes, KnownLayout, Immutable, Unaligned, Clone, Copy)]
#[repr(C)]
struct RawDeviceInfo {
    cmd: u8,
    packet_size: u8,
    player: u8,
    unused: u8,
    serial: [u8; SERIAL_NUMBER_LEN],
    firmware_version: U16,
    terminator: u8,
}

/// Identity of one connected stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Serial number as an uppercase hex string.
    pub serial: String,
    pub firmware_version: u16,
    /// Player slot, 1 or 2.
    pub player: u8,
}

impl DeviceInfo {
    /// Leading byte of the info response payload.
    pub const ECHO: u8 = b'I';

    pub fn decode(payload: &[u8]) -> Result<Self, SmxError> {
        let raw = RawDeviceInfo::ref_from_bytes(payload).map_err(|_| SmxError::Protocol(format!(
            "device info block must be {DEVICE_INFO_SIZE} bytes, got {}",
            payload.len()
        )))?;

        if raw.cmd != Self::ECHO {
            return Err(SmxError::Protocol(format!(
                "device info block starts with {:#04x}, expected 'I'",
                raw.cmd
            )));
        }

        // The player byte is ASCII: '0' for P1, '1' for P2.
        let player = match raw.player {
            b'0' => 1,
            b'1' => 2,
            other => {
                return Err(SmxError::Protocol(format!(
                    "unrecognized player byte {other:#04x} in device info"
                )));
            }
        };

        Ok(Self {
            serial: hex::encode_upper(raw.serial),
            firmware_version: raw.firmware_version.get(),
            player,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_layout_matches_the_wire_size() {
        assert_eq!(size_of::<RawDeviceInfo>(), DEVICE_INFO_SIZE);
    }

    #[test]
    fn decodes_a_fixed_info_block() {
        let mut block = vec![b'I', 0, b'1', 0];
        block.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF].repeat(4));
        block.extend_from_slice(&5u16.to_le_bytes());
        block.push(b'\n');

        let info = DeviceInfo::decode(&block).unwrap();
        assert_eq!(info.player, 2);
        assert_eq!(info.firmware_version, 5);
        assert_eq!(info.serial, "DEADBEEF".repeat(4));
    }

    #[test]
    fn rejects_a_block_with_the_wrong_leading_byte() {
        let mut block = vec![b'G', 0, b'0', 0];
        block.extend_from_slice(&[0u8; SERIAL_NUMBER_LEN]);
        block.extend_from_slice(&[5, 0, b'\n']);
        assert!(matches!(
            DeviceInfo::decode(&block),
            Err(SmxError::Protocol(_))
        ));
    }
}
