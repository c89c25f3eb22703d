//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#[allow(unused_imports)]
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use smx_lib::checksum;
#[allow(unused_imports)]
pub use smx_lib::commands::{CommandId, Request, Rgb};
#[allow(unused_imports)]
pub use smx_lib::config::{PackedSensorSettings, StageConfig};
#[allow(unused_imports)]
pub use smx_lib::constants::*;
#[allow(unused_imports)]
pub use smx_lib::device::{SerialOutcome, SmxStage};
#[allow(unused_imports)]
pub use smx_lib::device_info::DeviceInfo;
#[allow(unused_imports)]
pub use smx_lib::error::SmxError;
#[allow(unused_imports)]
pub use smx_lib::packet::{self, Frame, FrameAssembler, FrameError};
#[allow(unused_imports)]
pub use smx_lib::sensors::{PanelTestMode, SensorTestData, SensorTestMode};
#[allow(unused_imports)]
pub use smx_lib::transaction::{Response, RetryPolicy};
#[allow(unused_imports)]
pub use smx_lib::transport::MockTransport;

use std::time::Duration;

/// Route library traces into the test harness, filtered by `RUST_LOG`.
/// Only the first call installs a subscriber; the rest are no-ops.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Retry policy with a short deadline so timeout paths stay fast under the
/// paused tokio clock.
#[allow(dead_code)]
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        retries: 2,
        response_timeout: Duration::from_millis(50),
    }
}

/// A session over a scripted transport, plus the script handle.
#[allow(dead_code)]
pub fn mock_stage() -> (SmxStage<MockTransport>, MockTransport) {
    init_tracing();
    let mock = MockTransport::new();
    let stage = SmxStage::with_policy(mock.clone(), fast_policy());
    (stage, mock)
}

/// A 23-byte device info block: player 1, the given serial bytes, firmware 5.
#[allow(dead_code)]
pub fn device_info_block(serial: &[u8; 16], firmware_version: u16) -> Vec<u8> {
    let mut block = vec![b'I', 0, b'0', 0];
    block.extend_from_slice(serial);
    block.extend_from_slice(&firmware_version.to_le_bytes());
    block.push(b'\n');
    block
}

/// A config response payload: echo, size byte, packed blob, trailing newline.
#[allow(dead_code)]
pub fn config_response(config: &StageConfig) -> Vec<u8> {
    let blob = config.encode().expect("fixture config should encode");
    let mut payload = vec![b'G', blob.len() as u8];
    payload.extend_from_slice(&blob);
    payload.push(b'\n');
    payload
}

/// A sensor-test response payload wrapping nine identical detail blocks.
#[allow(dead_code)]
pub fn sensor_test_response(level: i16) -> Vec<u8> {
    let mut block = vec![0x02];
    for _ in 0..SENSORS_PER_PANEL {
        block.extend_from_slice(&level.to_le_bytes());
    }
    block.push(0);
    assert_eq!(block.len(), DETAIL_DATA_SIZE);

    let data = block.repeat(PANEL_COUNT);
    let mut payload = vec![b't', data.len() as u8];
    payload.extend_from_slice(&data);
    payload
}

/// Reassemble the payloads of every logical frame in a written report
/// stream. Device-info request reports carry no frame body and are skipped.
#[allow(dead_code)]
pub fn written_payloads(reports: &[Vec<u8>]) -> Vec<Vec<u8>> {
    let mut assembler = FrameAssembler::new();
    let mut payloads = Vec::new();
    for report in reports {
        if report[1] & FLAG_DEVICE_INFO != 0 {
            payloads.push(vec![FLAG_DEVICE_INFO]);
            continue;
        }
        // Written reports use the host report id; rewrite so the assembler
        // accepts them.
        let mut inbound = report.clone();
        inbound[0] = REPORT_ID_COMMAND_DATA;
        if let Some(body) = assembler.push_report(&inbound).expect("well-formed report") {
            let payload = checksum::verify(&body).expect("valid checksum").to_vec();
            payloads.push(payload);
        }
    }
    payloads
}
