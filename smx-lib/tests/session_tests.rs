//! End-to-end session tests against a scripted transport.

mod common;

use common::*;

const SERIAL: [u8; 16] = [
    0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE, 0xEF, 0xDE, 0xAD, 0xBE,
    0xEF,
];

#[tokio::test]
async fn get_device_info_decodes_a_fixed_block() {
    let (stage, mock) = mock_stage();
    mock.queue_response(&device_info_block(&SERIAL, 5));

    let info = stage.get_device_info().await.unwrap();
    assert_eq!(info.player, 1);
    assert_eq!(info.firmware_version, 5);
    assert_eq!(info.serial, "DEADBEEF".repeat(4));

    // The request is the single flagged device-info report.
    let writes = mock.written_reports();
    assert_eq!(writes.len(), 1);
    assert_eq!(&writes[0][..3], &[REPORT_ID_HOST_COMMAND, FLAG_DEVICE_INFO, 0]);
}

#[tokio::test]
async fn get_stage_config_roundtrips_through_the_wire() {
    let (stage, mock) = mock_stage();
    let mut config = StageConfig::default();
    config.auto_light_panel_mask = 186;

    mock.queue_response(&device_info_block(&SERIAL, 5));
    mock.queue_response(&config_response(&config));

    let read_back = stage.get_stage_config().await.unwrap();
    assert_eq!(read_back, config);

    // Second write burst is the single-byte 'G' command.
    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1], vec![b'G']);
}

#[tokio::test]
async fn get_stage_config_refuses_old_firmware() {
    let (stage, mock) = mock_stage();
    mock.queue_response(&device_info_block(&SERIAL, 4));

    assert!(matches!(
        stage.get_stage_config().await,
        Err(SmxError::UnsupportedVersion(4))
    ));
}

#[tokio::test]
async fn write_config_sends_the_blob_and_takes_the_ack() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();

    let config = StageConfig::default();
    stage.write_stage_config(&config).await.unwrap();

    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0][0], b'W');
    assert_eq!(&payloads[0][1..], config.encode().unwrap().as_slice());
}

#[tokio::test]
async fn misshapen_config_fails_before_any_transport_write() {
    let (stage, mock) = mock_stage();

    let mut config = StageConfig::default();
    config.panel_settings.truncate(7);

    assert!(matches!(
        stage.write_stage_config(&config).await,
        Err(SmxError::ConfigShape {
            field: "panel_settings",
            ..
        })
    ));
    assert_eq!(mock.write_count(), 0, "no bytes may reach the wire");
}

#[tokio::test]
async fn caller_mutation_after_initiating_a_write_has_no_effect() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();

    let mut config = StageConfig::default();
    let snapshot = config.encode().unwrap();
    stage.write_stage_config(&config).await.unwrap();
    config.flags = 0xFF;

    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(&payloads[0][1..], snapshot.as_slice());
}

#[tokio::test(start_paused = true)]
async fn timeout_releases_the_slot_for_the_next_command() {
    let (stage, mock) = mock_stage();

    // Nothing queued: every attempt times out.
    assert!(matches!(
        stage.force_recalibration().await,
        Err(SmxError::Timeout(_))
    ));

    // The slot is free again; a scripted ack completes the next command.
    mock.queue_ack();
    stage.force_recalibration().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn corrupt_checksum_retries_up_to_the_limit_then_surfaces() {
    let (stage, mock) = mock_stage();

    // Three attempts (1 + 2 retries), three corrupt responses.
    for _ in 0..3 {
        let payload = device_info_block(&SERIAL, 5);
        let mut reports = packet::encode_response_frames(&payload);
        let last = reports.len() - 1;
        // Flip one bit of the checksum byte, which sits right after the
        // payload data in the final report.
        let offset = REPORT_HEADER_SIZE + (payload.len() % MAX_REPORT_DATA);
        reports[last][offset] ^= 0x01;
        for report in reports {
            mock.queue_report(report);
        }
    }

    assert!(matches!(
        stage.get_device_info().await,
        Err(SmxError::ChecksumMismatch { .. })
    ));
    // One device-info request written per attempt, no more.
    assert_eq!(mock.write_count(), 3);
    assert_eq!(mock.unread_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn one_corrupt_response_is_recovered_by_retry() {
    let (stage, mock) = mock_stage();

    let payload = device_info_block(&SERIAL, 5);
    let mut reports = packet::encode_response_frames(&payload);
    let last = reports.len() - 1;
    let offset = REPORT_HEADER_SIZE + (payload.len() % MAX_REPORT_DATA);
    reports[last][offset] ^= 0x80;
    for report in reports {
        mock.queue_report(report);
    }
    mock.queue_response(&payload);

    let info = stage.get_device_info().await.unwrap();
    assert_eq!(info.firmware_version, 5);
    assert_eq!(mock.write_count(), 2);
}

#[tokio::test]
async fn set_serial_number_applied_when_the_stage_takes_it() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();
    mock.queue_response(&device_info_block(&SERIAL, 5));

    let outcome = stage.set_serial_number(&SERIAL).await.unwrap();
    assert_eq!(outcome, SerialOutcome::Applied);
}

#[tokio::test]
async fn set_serial_number_surfaces_the_device_noop() {
    let (stage, mock) = mock_stage();
    let existing = [0x11u8; 16];
    // The stage acknowledges the write but keeps its existing serial.
    mock.queue_ack();
    mock.queue_response(&device_info_block(&existing, 5));

    let outcome = stage.set_serial_number(&SERIAL).await.unwrap();
    assert_eq!(
        outcome,
        SerialOutcome::AlreadySet {
            current: "11".repeat(16)
        }
    );
}

#[tokio::test]
async fn set_serial_number_validates_length_first() {
    let (stage, mock) = mock_stage();
    assert!(matches!(
        stage.set_serial_number(&[1, 2, 3]).await,
        Err(SmxError::InvalidArgument(_))
    ));
    assert_eq!(mock.write_count(), 0);
}

#[tokio::test]
async fn factory_reset_writes_defaults_then_lights() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();
    mock.queue_ack();

    stage.factory_reset().await.unwrap();

    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0][0], b'W');
    assert_eq!(&payloads[0][1..], StageConfig::default().encode().unwrap().as_slice());

    let lights = &payloads[1];
    assert_eq!(&lights[..3], &[b'L', 0, LIGHT_STRIP_LEDS as u8]);
    assert_eq!(lights.len(), 3 + 3 * LIGHT_STRIP_LEDS);
    // Default platform strip color, repeated per LED.
    assert_eq!(&lights[3..6], &[0xFF, 0x00, 0x00]);
}

#[tokio::test]
async fn light_strip_arg_error_reaches_no_wire() {
    let (stage, mock) = mock_stage();
    let result = stage.set_light_strip(&[Rgb::new(0, 170, 255); 43]).await;
    assert!(matches!(result, Err(SmxError::InvalidArgument(_))));
    assert_eq!(mock.write_count(), 0);
}

#[tokio::test]
async fn sensor_test_data_decodes_per_panel_blocks() {
    let (stage, mock) = mock_stage();
    mock.queue_response(&sensor_test_response(512));

    let data = stage
        .get_sensor_test_data(SensorTestMode::CalibratedValues)
        .await
        .unwrap();
    assert_eq!(data.mode, SensorTestMode::CalibratedValues);
    assert_eq!(data.have_data_from_panel, vec![true; PANEL_COUNT]);
    assert_eq!(data.sensor_level[0], vec![512; SENSORS_PER_PANEL]);

    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(payloads[0], vec![b't', b'1']);
}

#[tokio::test]
async fn panel_test_mode_commands_are_acknowledged() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();
    stage
        .set_panel_test_mode(PanelTestMode::PressureTest)
        .await
        .unwrap();

    let payloads = written_payloads(&mock.written_reports());
    assert_eq!(payloads[0], vec![b'P', b'1']);
}

#[tokio::test]
async fn input_reports_interleave_with_command_responses() {
    let (stage, mock) = mock_stage();
    // An input report arrives mid-exchange and must not disturb the ack.
    mock.queue_report(vec![REPORT_ID_INPUT, 0x10, 0x00]);
    mock.queue_ack();

    stage.force_recalibration().await.unwrap();
}

#[tokio::test]
async fn get_inputs_reads_the_panel_mask() {
    let (stage, mock) = mock_stage();
    // A stray command-channel ack first, then the input report.
    mock.queue_ack();
    mock.queue_report(vec![REPORT_ID_INPUT, 0x90, 0x00]);

    let state = stage.get_inputs().await.unwrap();
    assert!(state.center);
    assert!(state.up);
    assert!(!state.down);
    assert_eq!(mock.write_count(), 0);
}

#[tokio::test]
async fn concurrent_callers_share_one_in_flight_slot() {
    let (stage, mock) = mock_stage();
    mock.queue_ack();
    mock.queue_ack();

    let stage = std::sync::Arc::new(stage);
    let first = tokio::spawn({
        let stage = stage.clone();
        async move { stage.force_recalibration().await }
    });
    let second = tokio::spawn({
        let stage = stage.clone();
        async move { stage.force_recalibration().await }
    });

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    assert_eq!(mock.write_count(), 2);
}
