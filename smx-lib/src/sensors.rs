//! Sensor diagnostics: test modes and the per-panel detail blocks the stage
//! reports while a test mode is active.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::constants::{DETAIL_DATA_SIZE, PANEL_COUNT, SENSORS_PER_PANEL};
use crate::error::SmxError;

/// What the per-sensor level readings mean while sensor testing is active.
/// The discriminants are the wire bytes and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SensorTestMode {
    Off = 0,
    /// Raw, uncalibrated value of each sensor.
    UncalibratedValues = b'0',
    /// Calibrated value of each sensor.
    CalibratedValues = b'1',
    /// Sensor noise value.
    Noise = b'2',
    /// Sensor tare value.
    Tare = b'3',
}

/// Panel-side diagnostics mode. Discriminants are the wire bytes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum PanelTestMode {
    Off = b'0',
    PressureTest = b'1',
}

/// Panels in numpad order, the order the protocol reports them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Panel {
    DownLeft = 0,
    Down = 1,
    DownRight = 2,
    Left = 3,
    Center = 4,
    Right = 5,
    UpLeft = 6,
    Up = 7,
    UpRight = 8,
}

/// One panel's 10-byte detail block.
///
/// Byte 0 packs a 3-bit response signature, always `0 1 0`, distinguishing
/// diagnostics data from the player stepping on the panel, plus four
/// bad-sensor bits. Bytes 1-8 are four little-endian `i16` sensor levels.
/// Byte 9 packs the DIP switch nibble and four bad-jumper bits.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DetailData {
    sig1: bool,
    sig2: bool,
    sig3: bool,
    bad_sensor: [bool; SENSORS_PER_PANEL],
    sensors: [i16; SENSORS_PER_PANEL],
    dip: u8,
    bad_jumper: [bool; SENSORS_PER_PANEL],
}

impl DetailData {
    fn decode(data: &[u8]) -> Result<Self, SmxError> {
        if data.len() != DETAIL_DATA_SIZE {
            return Err(SmxError::Protocol(format!(
                "panel detail block must be {DETAIL_DATA_SIZE} bytes, got {}",
                data.len()
            )));
        }

        let bits = data[0];
        let mut sensors = [0i16; SENSORS_PER_PANEL];
        for (i, level) in sensors.iter_mut().enumerate() {
            *level = i16::from_le_bytes([data[1 + i * 2], data[2 + i * 2]]);
        }

        Ok(Self {
            sig1: bits & 0x01 != 0,
            sig2: bits & 0x02 != 0,
            sig3: bits & 0x04 != 0,
            bad_sensor: [
                bits & 0x08 != 0,
                bits & 0x10 != 0,
                bits & 0x20 != 0,
                bits & 0x40 != 0,
            ],
            sensors,
            dip: data[9] & 0x0F,
            bad_jumper: [
                data[9] & 0x10 != 0,
                data[9] & 0x20 != 0,
                data[9] & 0x40 != 0,
                data[9] & 0x80 != 0,
            ],
        })
    }

    fn signature_ok(&self) -> bool {
        !self.sig1 && self.sig2 && !self.sig3
    }
}

/// Aggregated sensor test readings for all nine panels.
///
/// Interpretation of `sensor_level` depends on the mode the data was
/// requested with. Entries stay aligned by panel: a panel that did not answer
/// has `have_data_from_panel` false and zeroed readings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorTestData {
    pub mode: SensorTestMode,
    pub have_data_from_panel: Vec<bool>,
    pub sensor_level: Vec<Vec<i16>>,
    pub bad_sensor_input: Vec<Vec<bool>>,
    /// DIP switch setting on each panel, for diagnostics displays.
    pub dip_switch_per_panel: Vec<u8>,
    /// Bad-sensor selection jumper indication per panel sensor.
    pub bad_jumper: Vec<Vec<bool>>,
}

impl SensorTestData {
    /// Decode the concatenated per-panel detail blocks of a test response.
    pub fn decode(mode: SensorTestMode, data: &[u8]) -> Result<Self, SmxError> {
        if data.len() != PANEL_COUNT * DETAIL_DATA_SIZE {
            return Err(SmxError::Protocol(format!(
                "sensor test data must be {} bytes, got {}",
                PANEL_COUNT * DETAIL_DATA_SIZE,
                data.len()
            )));
        }

        let mut out = Self {
            mode,
            have_data_from_panel: Vec::with_capacity(PANEL_COUNT),
            sensor_level: Vec::with_capacity(PANEL_COUNT),
            bad_sensor_input: Vec::with_capacity(PANEL_COUNT),
            dip_switch_per_panel: Vec::with_capacity(PANEL_COUNT),
            bad_jumper: Vec::with_capacity(PANEL_COUNT),
        };

        for chunk in data.chunks_exact(DETAIL_DATA_SIZE) {
            let detail = DetailData::decode(chunk)?;
            if !detail.signature_ok() {
                out.have_data_from_panel.push(false);
                out.sensor_level.push(vec![0; SENSORS_PER_PANEL]);
                out.bad_sensor_input.push(vec![false; SENSORS_PER_PANEL]);
                out.dip_switch_per_panel.push(0);
                out.bad_jumper.push(vec![false; SENSORS_PER_PANEL]);
                continue;
            }

            out.have_data_from_panel.push(true);
            out.sensor_level.push(detail.sensors.to_vec());
            out.bad_sensor_input.push(detail.bad_sensor.to_vec());
            out.dip_switch_per_panel.push(detail.dip);
            out.bad_jumper.push(detail.bad_jumper.to_vec());
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_block(levels: [i16; 4], dip: u8) -> Vec<u8> {
        let mut block = vec![0x02]; // signature 0 1 0, no bad sensors
        for level in levels {
            block.extend_from_slice(&level.to_le_bytes());
        }
        block.push(dip & 0x0F);
        block
    }

    #[test]
    fn decodes_nine_panels_in_order() {
        let mut data = Vec::new();
        for panel in 0..PANEL_COUNT as i16 {
            data.extend_from_slice(&detail_block([panel, -panel, 100 + panel, 0], panel as u8));
        }

        let test_data = SensorTestData::decode(SensorTestMode::Noise, &data).unwrap();
        assert_eq!(test_data.have_data_from_panel, vec![true; PANEL_COUNT]);
        assert_eq!(test_data.sensor_level[3], vec![3, -3, 103, 0]);
        assert_eq!(test_data.dip_switch_per_panel[8], 8);
    }

    #[test]
    fn panel_with_bad_signature_reads_as_missing() {
        let mut data = Vec::new();
        for panel in 0..PANEL_COUNT {
            let mut block = detail_block([7; 4], 1);
            if panel == 4 {
                // Looks like a player step, not a diagnostics response.
                block[0] = 0x01;
            }
            data.extend_from_slice(&block);
        }

        let test_data = SensorTestData::decode(SensorTestMode::CalibratedValues, &data).unwrap();
        assert!(!test_data.have_data_from_panel[4]);
        assert_eq!(test_data.sensor_level[4], vec![0; SENSORS_PER_PANEL]);
        // Later panels stay aligned to their own slots.
        assert!(test_data.have_data_from_panel[5]);
        assert_eq!(test_data.sensor_level[5], vec![7; SENSORS_PER_PANEL]);
    }

    #[test]
    fn bad_sensor_and_jumper_bits_unpack() {
        let mut block = detail_block([0; 4], 0x0A);
        block[0] |= 0x08 | 0x40; // sensors 0 and 3 bad
        block[9] |= 0x20; // jumper on sensor 1
        let data = block.repeat(PANEL_COUNT);

        let test_data = SensorTestData::decode(SensorTestMode::Tare, &data).unwrap();
        assert_eq!(test_data.bad_sensor_input[0], vec![true, false, false, true]);
        assert_eq!(test_data.bad_jumper[0], vec![false, true, false, false]);
        assert_eq!(test_data.dip_switch_per_panel[0], 0x0A);
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(matches!(
            SensorTestData::decode(SensorTestMode::Noise, &[0u8; 89]),
            Err(SmxError::Protocol(_))
        ));
    }
}
