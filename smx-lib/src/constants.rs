// Wire protocol constants for the StepManiaX stage

/// Size of one HID report transfer (64 bytes)
pub const REPORT_SIZE: usize = 64;

/// Report header: report id, flag byte, data size byte
pub const REPORT_HEADER_SIZE: usize = 3;

/// Maximum command data bytes carried by one report
pub const MAX_REPORT_DATA: usize = REPORT_SIZE - REPORT_HEADER_SIZE;

/// Report id for the unsolicited input-state report
pub const REPORT_ID_INPUT: u8 = 3;

/// Report id for host-to-stage command reports
pub const REPORT_ID_HOST_COMMAND: u8 = 5;

/// Report id for stage-to-host command-channel reports
pub const REPORT_ID_COMMAND_DATA: u8 = 6;

/// Flag: last report of a logical frame
pub const FLAG_END_OF_COMMAND: u8 = 0x01;

/// Flag: the stage finished executing the host's previous command
pub const FLAG_HOST_CMD_FINISHED: u8 = 0x02;

/// Flag: first report of a logical frame
pub const FLAG_START_OF_COMMAND: u8 = 0x04;

/// Flag: report belongs to a device-info exchange
pub const FLAG_DEVICE_INFO: u8 = 0x80;

/// Size of the packed stage config blob (config version 5)
pub const CONFIG_SIZE: usize = 250;

/// Size of one packed per-panel sensor settings block
pub const SENSOR_SETTINGS_SIZE: usize = 16;

/// Size of the device info response block
pub const DEVICE_INFO_SIZE: usize = 23;

/// Size of one per-panel sensor detail block
pub const DETAIL_DATA_SIZE: usize = 10;

/// Panels on a stage, in numpad order
pub const PANEL_COUNT: usize = 9;

/// Sensors embedded in each panel
pub const SENSORS_PER_PANEL: usize = 4;

/// LEDs on the platform light strip
pub const LIGHT_STRIP_LEDS: usize = 44;

/// Length of the device serial number in raw bytes
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Packed enabled-sensor bytes in the config (4 sensors, 2 panels per byte)
pub const ENABLED_SENSOR_BYTES: usize = 5;

/// Step color bytes in the config (RGB for each of 9 panels)
pub const STEP_COLOR_BYTES: usize = 27;

/// Platform strip color bytes in the config
pub const STRIP_COLOR_BYTES: usize = 3;

/// Reserved trailing bytes padding the config to a stable ABI size
pub const CONFIG_PADDING_BYTES: usize = 49;

/// Step colors are scaled to this maximum by the firmware
pub const MAX_STEP_COLOR: u8 = 170;
