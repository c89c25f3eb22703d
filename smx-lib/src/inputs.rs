//! The unsolicited input-state report: which panels are currently pressed.

use serde::{Deserialize, Serialize};

use crate::constants::REPORT_ID_INPUT;
use crate::error::SmxError;
use crate::sensors::Panel;

/// Pressed state of all nine panels, decoded from one input report.
///
/// The stage streams these continuously; no command is needed to request
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InputState {
    pub down_left: bool,
    pub down: bool,
    pub down_right: bool,
    pub left: bool,
    pub center: bool,
    pub right: bool,
    pub up_left: bool,
    pub up: bool,
    pub up_right: bool,
}

impl InputState {
    /// Decode a report with id 3: two bytes holding a 16-bit little-endian
    /// mask, bits 0-8 in numpad panel order.
    pub fn from_report(report: &[u8]) -> Result<Self, SmxError> {
        match report {
            [REPORT_ID_INPUT, lo, hi, ..] => {
                let mask = u16::from_le_bytes([*lo, *hi]);
                Ok(Self {
                    down_left: mask & (1 << 0) != 0,
                    down: mask & (1 << 1) != 0,
                    down_right: mask & (1 << 2) != 0,
                    left: mask & (1 << 3) != 0,
                    center: mask & (1 << 4) != 0,
                    right: mask & (1 << 5) != 0,
                    up_left: mask & (1 << 6) != 0,
                    up: mask & (1 << 7) != 0,
                    up_right: mask & (1 << 8) != 0,
                })
            }
            _ => Err(SmxError::Protocol(format!(
                "not an input-state report: {:02x?}",
                report.get(..3).unwrap_or(report)
            ))),
        }
    }

    pub fn is_pressed(&self, panel: Panel) -> bool {
        match panel {
            Panel::DownLeft => self.down_left,
            Panel::Down => self.down,
            Panel::DownRight => self.down_right,
            Panel::Left => self.left,
            Panel::Center => self.center,
            Panel::Right => self.right,
            Panel::UpLeft => self.up_left,
            Panel::Up => self.up,
            Panel::UpRight => self.up_right,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_the_nine_panel_bits() {
        // Up (bit 7) and up-right (bit 8) pressed.
        let state = InputState::from_report(&[3, 0x80, 0x01]).unwrap();
        assert!(state.up);
        assert!(state.up_right);
        assert!(!state.center);
        assert!(state.is_pressed(Panel::Up));
        assert!(!state.is_pressed(Panel::DownLeft));
    }

    #[test]
    fn rejects_non_input_reports() {
        assert!(InputState::from_report(&[6, 0x07, 0x00]).is_err());
        assert!(InputState::from_report(&[3]).is_err());
    }
}
