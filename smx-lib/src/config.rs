//! Pack and unpack of the versioned stage configuration blob.
//!
//! The wire form is a flat 250-byte little-endian structure. Its size is part
//! of the firmware ABI and never changes; new fields are carved out of the
//! trailing padding. Reserved and padding bytes must be echoed back unchanged
//! on writes, so both are carried through the user-facing type.

use serde::{Deserialize, Serialize};
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::constants::*;
use crate::error::SmxError;

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
struct RawSensorSettings {
    load_cell_low_threshold: u8,
    load_cell_high_threshold: u8,
    fsr_low_threshold: [u8; SENSORS_PER_PANEL],
    fsr_high_threshold: [u8; SENSORS_PER_PANEL],
    combined_low_threshold: U16,
    combined_high_threshold: U16,
    reserved: U16,
}

#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned, Clone, Copy, Debug)]
#[repr(C)]
struct RawStageConfig {
    master_version: u8,
    config_version: u8,
    flags: u8,
    debounce_no_delay_ms: U16,
    debounce_delay_ms: U16,
    panel_debounce_us: U16,
    auto_calibration_max_deviation: u8,
    bad_sensor_minimum_delay_seconds: u8,
    auto_calibration_averages_per_update: U16,
    auto_calibration_samples_per_average: U16,
    auto_calibration_max_tare: U16,
    enabled_sensors: [u8; ENABLED_SENSOR_BYTES],
    auto_lights_timeout: u8,
    step_color: [u8; STEP_COLOR_BYTES],
    platform_strip_color: [u8; STRIP_COLOR_BYTES],
    auto_light_panel_mask: U16,
    panel_rotation: u8,
    panel_settings: [RawSensorSettings; PANEL_COUNT],
    pre_details_delay_ms: u8,
    padding: [u8; CONFIG_PADDING_BYTES],
}

/// Threshold settings for the sensors of one panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedSensorSettings {
    pub load_cell_low_threshold: u8,
    pub load_cell_high_threshold: u8,
    /// Per-sensor FSR low thresholds, one value per sensor.
    pub fsr_low_threshold: Vec<u8>,
    /// Per-sensor FSR high thresholds, one value per sensor.
    pub fsr_high_threshold: Vec<u8>,
    pub combined_low_threshold: u16,
    pub combined_high_threshold: u16,
    /// Must be echoed back to the stage unchanged.
    pub reserved: u16,
}

impl Default for PackedSensorSettings {
    fn default() -> Self {
        Self {
            load_cell_low_threshold: 33,
            load_cell_high_threshold: 42,
            fsr_low_threshold: vec![220; SENSORS_PER_PANEL],
            fsr_high_threshold: vec![222; SENSORS_PER_PANEL],
            combined_low_threshold: 0xFFFF,
            combined_high_threshold: 0xFFFF,
            reserved: 0,
        }
    }
}

impl PackedSensorSettings {
    fn to_raw(&self) -> Result<RawSensorSettings, SmxError> {
        Ok(RawSensorSettings {
            load_cell_low_threshold: self.load_cell_low_threshold,
            load_cell_high_threshold: self.load_cell_high_threshold,
            fsr_low_threshold: fixed("fsr_low_threshold", &self.fsr_low_threshold)?,
            fsr_high_threshold: fixed("fsr_high_threshold", &self.fsr_high_threshold)?,
            combined_low_threshold: U16::new(self.combined_low_threshold),
            combined_high_threshold: U16::new(self.combined_high_threshold),
            reserved: U16::new(self.reserved),
        })
    }

    fn from_raw(raw: &RawSensorSettings) -> Self {
        Self {
            load_cell_low_threshold: raw.load_cell_low_threshold,
            load_cell_high_threshold: raw.load_cell_high_threshold,
            fsr_low_threshold: raw.fsr_low_threshold.to_vec(),
            fsr_high_threshold: raw.fsr_high_threshold.to_vec(),
            combined_low_threshold: raw.combined_low_threshold.get(),
            combined_high_threshold: raw.combined_high_threshold.get(),
            reserved: raw.reserved.get(),
        }
    }
}

/// The versioned stage configuration, field-for-field the packed wire layout.
///
/// Panel thresholds are labelled by numpad position: panel 8 is up, panel 4
/// is left, and so on. Fields documented as internal tunables should be read
/// from the stage, left unchanged, and written back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Firmware version of the master controller, as reported by the stage.
    pub master_version: u8,
    /// Version of this config packet. Tells the firmware which fields have
    /// been filled in; unrelated to the firmware version.
    pub config_version: u8,
    /// Packed option flags (master version 4 and up).
    pub flags: u8,
    pub debounce_no_delay_ms: u16,
    pub debounce_delay_ms: u16,
    pub panel_debounce_us: u16,
    pub auto_calibration_max_deviation: u8,
    pub bad_sensor_minimum_delay_seconds: u8,
    pub auto_calibration_averages_per_update: u16,
    pub auto_calibration_samples_per_average: u16,
    /// The maximum tare value to auto-calibrate to (except on startup).
    pub auto_calibration_max_tare: u16,
    /// Which sensors on each panel to enable, packed four sensors and two
    /// panels per byte.
    pub enabled_sensors: Vec<u8>,
    /// How long the master waits for a lights command before resuming
    /// auto-lights, in 128 ms units.
    pub auto_lights_timeout: u8,
    /// Auto-lighting color per panel, RGB, scaled to the 0-170 range.
    pub step_color: Vec<u8>,
    /// Default color for the platform LED strip.
    pub platform_strip_color: Vec<u8>,
    /// Which panels the master's built-in auto-lighting covers.
    pub auto_light_panel_mask: u16,
    /// Stage rotation in 90 degree steps. Unused by current firmware.
    pub panel_rotation: u8,
    /// Per-panel sensor thresholds, one entry per panel.
    pub panel_settings: Vec<PackedSensorSettings>,
    pub pre_details_delay_ms: u8,
    /// Reserved trailing bytes. Echo back whatever the stage reported.
    pub padding: Vec<u8>,
}

impl Default for StageConfig {
    /// The canonical factory configuration: known-good thresholds, all
    /// sensors enabled, platform strip set to the default red.
    fn default() -> Self {
        Self {
            master_version: 0xFF,
            config_version: 0x05,
            flags: 0,
            debounce_no_delay_ms: 0,
            debounce_delay_ms: 0,
            panel_debounce_us: 4000,
            auto_calibration_max_deviation: 100,
            bad_sensor_minimum_delay_seconds: 15,
            auto_calibration_averages_per_update: 60,
            auto_calibration_samples_per_average: 500,
            auto_calibration_max_tare: 0xFFFF,
            enabled_sensors: vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F],
            auto_lights_timeout: (1000_u16 / 128) as u8,
            step_color: vec![MAX_STEP_COLOR; STEP_COLOR_BYTES],
            platform_strip_color: vec![0xFF, 0x00, 0x00],
            auto_light_panel_mask: 0xFFFF,
            panel_rotation: 0,
            panel_settings: vec![PackedSensorSettings::default(); PANEL_COUNT],
            pre_details_delay_ms: 5,
            padding: vec![0xFF; CONFIG_PADDING_BYTES],
        }
    }
}

impl StageConfig {
    /// Decode the packed config blob reported by a stage.
    ///
    /// Stages below firmware version 5 use an older, smaller layout that this
    /// library does not speak; their bytes are never interpreted.
    pub fn decode(firmware_version: u16, data: &[u8]) -> Result<Self, SmxError> {
        if firmware_version < 5 {
            return Err(SmxError::UnsupportedVersion(firmware_version));
        }

        let raw = RawStageConfig::ref_from_bytes(data).map_err(|_| SmxError::ConfigSize {
            expected: CONFIG_SIZE,
            actual: data.len(),
        })?;

        Ok(Self {
            master_version: raw.master_version,
            config_version: raw.config_version,
            flags: raw.flags,
            debounce_no_delay_ms: raw.debounce_no_delay_ms.get(),
            debounce_delay_ms: raw.debounce_delay_ms.get(),
            panel_debounce_us: raw.panel_debounce_us.get(),
            auto_calibration_max_deviation: raw.auto_calibration_max_deviation,
            bad_sensor_minimum_delay_seconds: raw.bad_sensor_minimum_delay_seconds,
            auto_calibration_averages_per_update: raw.auto_calibration_averages_per_update.get(),
            auto_calibration_samples_per_average: raw.auto_calibration_samples_per_average.get(),
            auto_calibration_max_tare: raw.auto_calibration_max_tare.get(),
            enabled_sensors: raw.enabled_sensors.to_vec(),
            auto_lights_timeout: raw.auto_lights_timeout,
            step_color: raw.step_color.to_vec(),
            platform_strip_color: raw.platform_strip_color.to_vec(),
            auto_light_panel_mask: raw.auto_light_panel_mask.get(),
            panel_rotation: raw.panel_rotation,
            panel_settings: raw
                .panel_settings
                .iter()
                .map(PackedSensorSettings::from_raw)
                .collect(),
            pre_details_delay_ms: raw.pre_details_delay_ms,
            padding: raw.padding.to_vec(),
        })
    }

    /// Encode into the packed wire form, validating shape and range first.
    ///
    /// A config with the wrong number of panels, sensors, or color bytes is
    /// rejected rather than truncated or padded, and out-of-range values are
    /// rejected rather than wrapped.
    pub fn encode(&self) -> Result<Vec<u8>, SmxError> {
        if self.panel_settings.len() != PANEL_COUNT {
            return Err(SmxError::ConfigShape {
                field: "panel_settings",
                expected: PANEL_COUNT,
                actual: self.panel_settings.len(),
            });
        }
        for value in &self.step_color {
            if *value > MAX_STEP_COLOR {
                return Err(SmxError::ValueOutOfRange {
                    field: "step_color",
                    value: u32::from(*value),
                    max: u32::from(MAX_STEP_COLOR),
                });
            }
        }

        let mut panel_settings = [RawSensorSettings {
            load_cell_low_threshold: 0,
            load_cell_high_threshold: 0,
            fsr_low_threshold: [0; SENSORS_PER_PANEL],
            fsr_high_threshold: [0; SENSORS_PER_PANEL],
            combined_low_threshold: U16::new(0),
            combined_high_threshold: U16::new(0),
            reserved: U16::new(0),
        }; PANEL_COUNT];
        for (slot, settings) in panel_settings.iter_mut().zip(&self.panel_settings) {
            *slot = settings.to_raw()?;
        }

        let raw = RawStageConfig {
            master_version: self.master_version,
            config_version: self.config_version,
            flags: self.flags,
            debounce_no_delay_ms: U16::new(self.debounce_no_delay_ms),
            debounce_delay_ms: U16::new(self.debounce_delay_ms),
            panel_debounce_us: U16::new(self.panel_debounce_us),
            auto_calibration_max_deviation: self.auto_calibration_max_deviation,
            bad_sensor_minimum_delay_seconds: self.bad_sensor_minimum_delay_seconds,
            auto_calibration_averages_per_update: U16::new(
                self.auto_calibration_averages_per_update,
            ),
            auto_calibration_samples_per_average: U16::new(
                self.auto_calibration_samples_per_average,
            ),
            auto_calibration_max_tare: U16::new(self.auto_calibration_max_tare),
            enabled_sensors: fixed("enabled_sensors", &self.enabled_sensors)?,
            auto_lights_timeout: self.auto_lights_timeout,
            step_color: fixed("step_color", &self.step_color)?,
            platform_strip_color: fixed("platform_strip_color", &self.platform_strip_color)?,
            auto_light_panel_mask: U16::new(self.auto_light_panel_mask),
            panel_rotation: self.panel_rotation,
            panel_settings,
            pre_details_delay_ms: self.pre_details_delay_ms,
            padding: fixed("padding", &self.padding)?,
        };

        Ok(raw.as_bytes().to_vec())
    }
}

/// Length-checked conversion of a config field into its fixed wire width.
fn fixed<const N: usize>(field: &'static str, values: &[u8]) -> Result<[u8; N], SmxError> {
    values.try_into().map_err(|_| SmxError::ConfigShape {
        field,
        expected: N,
        actual: values.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_layout_matches_the_wire_sizes() {
        assert_eq!(size_of::<RawSensorSettings>(), SENSOR_SETTINGS_SIZE);
        assert_eq!(size_of::<RawStageConfig>(), CONFIG_SIZE);
    }

    #[test]
    fn sensor_offset_matches_the_firmware_layout() {
        // The sensor settings array starts at byte 56 of the packed blob;
        // everything after it is one byte of delay plus padding.
        assert_eq!(
            CONFIG_SIZE - CONFIG_PADDING_BYTES - 1 - PANEL_COUNT * SENSOR_SETTINGS_SIZE,
            56
        );
    }
}
