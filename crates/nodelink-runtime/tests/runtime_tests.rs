//! Integration tests for the session runtime against a mock central

use std::sync::{Arc, Mutex};
use std::time::Duration;

use nodelink_core::{
    AppEvent, CommandEnvelope, EndpointRole, LogEntry, RadioState, SessionState, TransportError,
};
use nodelink_runtime::{RuntimeBuilder, RuntimeConfig, RuntimeError, RuntimeHandle, SessionConfig};
use tokio::sync::mpsc;

use test_utils::{expect_event, expect_log, expect_state, MockCentral, MockChannel};

fn start(central: MockCentral, session: SessionConfig) -> (RuntimeHandle, mpsc::Receiver<AppEvent>) {
    let mut runtime = RuntimeBuilder::new(central)
        .with_session_config(session)
        .with_runtime_config(RuntimeConfig::testing())
        .build_and_start()
        .expect("Failed to start runtime");
    let events = runtime
        .take_app_event_receiver()
        .expect("Failed to get app event receiver");
    (runtime, events)
}

/// Connected runtime with every endpoint subscribed
async fn ready_runtime() -> (RuntimeHandle, mpsc::Receiver<AppEvent>, MockCentral, MockChannel) {
    let central = MockCentral::new();
    let channel = MockChannel::node("node-1");
    central.add_peripheral(channel.clone());
    let (runtime, mut events) = start(central.clone(), SessionConfig::default());

    runtime.connect("node-1").await.unwrap();
    expect_state(&mut events, SessionState::Ready).await;
    channel.wait_subscribed(EndpointRole::Filename).await;
    channel.wait_subscribed(EndpointRole::FileTransfer).await;
    (runtime, events, central, channel)
}

#[tokio::test]
async fn test_scan_discovers_then_times_out() {
    let central = MockCentral::new();
    let config = SessionConfig::new().with_scan_timeout(Duration::from_millis(150));
    let (mut runtime, mut events) = start(central.clone(), config);

    runtime.start_scan().await.unwrap();
    expect_state(&mut events, SessionState::Scanning).await;
    central.wait_scanning().await;
    assert!(central.discover("node-1", Some("Node One"), Some(-55)));

    let discovered = expect_event(&mut events, |e| matches!(e, AppEvent::DeviceDiscovered { .. })).await;
    match discovered {
        AppEvent::DeviceDiscovered { handle, rssi, new } => {
            assert_eq!(handle.display_name(), "Node One");
            assert_eq!(rssi, Some(-55));
            assert!(new);
        }
        other => panic!("unexpected event {:?}", other),
    }

    expect_log(&mut events, "Scan timed out").await;
    central.wait_stops(1).await;
    assert_eq!(central.scan_count(), 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_refused_while_radio_off() {
    let central = MockCentral::new();
    central.set_radio(RadioState::PoweredOff);
    let (mut runtime, mut events) = start(central.clone(), SessionConfig::default());

    runtime.start_scan().await.unwrap();

    let message = expect_log(&mut events, "radio not ready").await;
    assert_eq!(message, "Bluetooth radio not ready (powered off)");
    assert_eq!(central.scan_count(), 0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_failure_is_logged_and_ends_scan() {
    let central = MockCentral::new();
    central.fail_scans(TransportError::ScanFailed("adapter busy".to_string()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);
    let mut runtime = RuntimeBuilder::new(central.clone())
        .with_runtime_config(RuntimeConfig::testing())
        .with_log_sink(move |entry: &LogEntry| {
            recorded.lock().unwrap().push(entry.message.clone());
        })
        .build_and_start()
        .unwrap();
    let mut events = runtime.take_app_event_receiver().unwrap();

    runtime.start_scan().await.unwrap();
    expect_state(&mut events, SessionState::Scanning).await;

    expect_state(&mut events, SessionState::Idle).await;
    let message = expect_log(&mut events, "Scan failed").await;
    assert_eq!(message, "Scan failed: Failed to scan: adapter busy");
    assert!(seen.lock().unwrap().contains(&message));
    assert_eq!(central.scan_count(), 0);

    // Idle again, so a retry is accepted
    runtime.start_scan().await.unwrap();
    expect_state(&mut events, SessionState::Scanning).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_slow_scan_stop_does_not_stall_the_driver() {
    let central = MockCentral::new();
    central.set_stop_delay(Duration::from_millis(300));
    let (mut runtime, mut events) = start(central.clone(), SessionConfig::default());

    runtime.start_scan().await.unwrap();
    central.wait_scanning().await;
    let requested = tokio::time::Instant::now();
    runtime.stop_scan().await.unwrap();
    expect_log(&mut events, "Scan stopped").await;
    assert!(requested.elapsed() < Duration::from_millis(250));

    // The restart waits for the pending stop, so the new scan stays live
    runtime.start_scan().await.unwrap();
    expect_state(&mut events, SessionState::Scanning).await;
    central.wait_stops(1).await;
    central.wait_scanning().await;
    assert_eq!(central.scan_count(), 2);
    assert!(central.discover("node-2", Some("Node Two"), None));
    expect_event(&mut events, |e| matches!(e, AppEvent::DeviceDiscovered { .. })).await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_connect_while_scanning_stops_scan() {
    let central = MockCentral::new();
    let channel = MockChannel::node("node-1");
    central.add_peripheral(channel.clone());
    let (mut runtime, mut events) = start(central.clone(), SessionConfig::default());

    runtime.start_scan().await.unwrap();
    central.wait_scanning().await;
    central.discover("node-1", Some("Node One"), Some(-40));
    expect_event(&mut events, |e| matches!(e, AppEvent::DeviceDiscovered { .. })).await;

    runtime.connect("node-1").await.unwrap();
    expect_state(&mut events, SessionState::Ready).await;

    central.wait_stops(1).await;
    assert!(!central.discover("node-2", None, None));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_gateway_commands_reach_the_node() {
    let (mut runtime, _events, _central, channel) = ready_runtime().await;

    runtime
        .send(CommandEnvelope::SetOperatingMode { mode: 1 })
        .await
        .unwrap();
    runtime.send(CommandEnvelope::RequestFilenameList).await.unwrap();

    let writes = channel.wait_writes(2).await;
    assert_eq!(
        writes,
        vec![
            (EndpointRole::GatewayCommand.uuid(), r#"{"operatingMode":1}"#.to_string()),
            (EndpointRole::GatewayCommand.uuid(), r#"{"sendFilenames": true}"#.to_string()),
        ]
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_filename_listing_round_trip() {
    let (mut runtime, mut events, _central, channel) = ready_runtime().await;

    runtime.send(CommandEnvelope::RequestFilenameNotify).await.unwrap();
    channel.wait_writes(1).await;
    assert!(channel.notify(EndpointRole::Filename, b"a.txt|120;b.txt|340;EOF"));

    let listing = expect_event(&mut events, |e| matches!(e, AppEvent::FilenamesReceived { .. })).await;
    assert_eq!(
        listing,
        AppEvent::FilenamesReceived {
            filenames: vec!["a.txt".to_string(), "b.txt".to_string()],
            first: Some("a.txt".to_string()),
        }
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_file_transfer_reassembly() {
    let (mut runtime, mut events, _central, channel) = ready_runtime().await;

    runtime
        .send(CommandEnvelope::RequestFileTransfer {
            filename: "b.txt".to_string(),
        })
        .await
        .unwrap();
    expect_event(&mut events, |e| matches!(e, AppEvent::TransferStarted { .. })).await;

    for chunk in [&[0xDE, 0xAD][..], &[0xBE, 0xEF][..], &[0x01][..]] {
        assert!(channel.notify(EndpointRole::FileTransfer, chunk));
    }
    expect_event(&mut events, |e| {
        matches!(e, AppEvent::FileBytesAppended { total_len: 5, .. })
    })
    .await;

    runtime.finish_transfer().await.unwrap();
    let finished = expect_event(&mut events, |e| matches!(e, AppEvent::TransferFinished { .. })).await;
    assert_eq!(
        finished,
        AppEvent::TransferFinished {
            filename: Some("b.txt".to_string()),
            bytes: vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01],
            hex: "DEADBEEF01".to_string(),
        }
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_unknown_peripheral_connect_fails() {
    let central = MockCentral::new();
    let (mut runtime, mut events) = start(central, SessionConfig::default());

    runtime.connect("ghost").await.unwrap();

    expect_state(&mut events, SessionState::Connecting).await;
    let message = expect_log(&mut events, "Failed to connect").await;
    assert!(message.contains("ghost"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_link_loss_clears_endpoints() {
    let (mut runtime, mut events, central, _channel) = ready_runtime().await;

    central.drop_link("node-1");
    expect_state(&mut events, SessionState::Idle).await;

    runtime.send(CommandEnvelope::ClearMemory).await.unwrap();
    expect_log(&mut events, "Characteristic not available: gateway-command").await;

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_releases_channel() {
    let (mut runtime, mut events, _central, channel) = ready_runtime().await;

    runtime.disconnect().await.unwrap();

    expect_state(&mut events, SessionState::Idle).await;
    channel.wait_disconnected().await;
    assert!(!channel.notify(EndpointRole::FileTransfer, &[0x01]));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_disconnects_and_stops() {
    let (mut runtime, _events, _central, channel) = ready_runtime().await;

    tokio_test::assert_ok!(runtime.shutdown().await);

    channel.wait_disconnected().await;
    assert!(!runtime.is_running());
    assert_eq!(runtime.start_scan().await, Err(RuntimeError::Stopped));
}

#[tokio::test]
async fn test_log_sink_sees_session_entries() {
    let central = MockCentral::new();
    central.set_radio(RadioState::PoweredOff);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&seen);

    let mut runtime = RuntimeBuilder::new(central)
        .with_runtime_config(RuntimeConfig::testing())
        .with_log_sink(move |entry: &LogEntry| {
            recorded.lock().unwrap().push(entry.message.clone());
        })
        .build_and_start()
        .unwrap();
    let mut events = runtime.take_app_event_receiver().unwrap();

    runtime.start_scan().await.unwrap();
    expect_log(&mut events, "radio not ready").await;

    let seen = seen.lock().unwrap().clone();
    assert!(seen.iter().any(|m| m.contains("radio not ready")));

    runtime.shutdown().await.unwrap();
}

#[test]
fn test_invalid_config_rejected() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();

    let config = RuntimeConfig {
        command_buffer_size: 0,
        ..RuntimeConfig::testing()
    };
    let result = RuntimeBuilder::new(MockCentral::new())
        .with_runtime_config(config)
        .build_and_start();

    assert!(matches!(result, Err(RuntimeError::Configuration { .. })));
}
