//! End-to-end tests of the CLI app against a simulated node

use nodelink_cli::{CliError, NodeApp};
use nodelink_core::{AppEvent, CommandEnvelope, EndpointRole, PeripheralId, SessionState};

mod test_utils;
use test_utils::{test_config, SimulatedCentral, SimulatedNode};

async fn ready_app() -> (NodeApp, SimulatedNode) {
    let node = SimulatedNode::new("node-1", "Field Node");
    let mut app = NodeApp::with_central(test_config(), SimulatedCentral::with_node(node.clone()))
        .expect("Failed to start app");

    app.connect_ready(node.id()).await.expect("node never became ready");
    node.wait_subscribed().await;
    (app, node)
}

#[tokio::test]
async fn test_connect_ready_scans_then_connects() {
    let (app, node) = ready_app().await;

    assert_eq!(app.state.session_state, SessionState::Ready);
    assert_eq!(app.state.directory.len(), 1);
    assert_eq!(
        app.state.directory.get_index(0).unwrap().handle.display_name(),
        "Field Node"
    );
    assert!(app.state.render_directory().starts_with("[1] Field Node (node-1)"));

    app.stop().await.unwrap();
    node.wait_disconnected().await;
}

#[tokio::test]
async fn test_download_reassembles_file() {
    let (mut app, node) = ready_app().await;

    let file = tokio_test::assert_ok!(app.download("b.txt", test_config().cli.transfer_idle()).await);

    assert_eq!(file.filename.as_deref(), Some("b.txt"));
    assert_eq!(file.bytes, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01]);
    assert_eq!(file.hex, "DEADBEEF01");
    assert_eq!(
        node.written_text(),
        vec![(EndpointRole::Filename.uuid(), "b.txt".to_string())]
    );

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_download_of_empty_file_finishes_on_idle() {
    let (mut app, _node) = ready_app().await;

    let file = app.download("a.txt", test_config().cli.transfer_idle()).await.unwrap();

    assert!(file.bytes.is_empty());
    assert_eq!(file.hex, "");
    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_download_of_text_file_keeps_every_chunk() {
    let (mut app, _node) = ready_app().await;

    let file = app.download("notes.txt", test_config().cli.transfer_idle()).await.unwrap();

    assert_eq!(file.bytes, b"hello,world\n".to_vec());
    assert_eq!(file.hex, "68656C6C6F2C776F726C640A");
    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_filename_listing() {
    let (mut app, _node) = ready_app().await;

    app.send(CommandEnvelope::RequestFilenameNotify).await.unwrap();
    let limit = app.config.cli.response_timeout();
    let listing = app
        .wait_for("listing", limit, |event| {
            matches!(event, AppEvent::FilenamesReceived { .. })
        })
        .await
        .unwrap();

    assert_eq!(
        listing,
        AppEvent::FilenamesReceived {
            filenames: vec!["a.txt".to_string(), "b.txt".to_string()],
            first: Some("a.txt".to_string()),
        }
    );
    assert_eq!(app.state.filenames, vec!["a.txt", "b.txt"]);

    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_gateway_command_is_logged_as_sent() {
    let (mut app, node) = ready_app().await;

    app.send(CommandEnvelope::SetOperatingMode { mode: 1 }).await.unwrap();
    let limit = app.config.cli.response_timeout();
    app.wait_for("mode", limit, |event| {
        matches!(event, AppEvent::Log(entry) if entry.message.starts_with("Sent SetOperatingMode"))
    })
    .await
    .unwrap();

    let writes = node.wait_writes(1).await;
    assert_eq!(
        writes,
        vec![(EndpointRole::GatewayCommand.uuid(), r#"{"operatingMode":1}"#.to_string())]
    );
    app.stop().await.unwrap();
}

#[tokio::test]
async fn test_missing_device_times_out() {
    let node = SimulatedNode::new("node-1", "Field Node");
    let mut app = NodeApp::with_central(test_config(), SimulatedCentral::with_node(node)).unwrap();

    let result = app.connect_ready(&PeripheralId::new("node-9")).await;

    assert!(matches!(result, Err(CliError::Timeout(what)) if what == "device node-9"));
    app.stop().await.unwrap();
}
