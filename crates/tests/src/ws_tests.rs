use crate::fixtures::test_app::TestApp;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect(app: &TestApp) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(app.ws_url())
        .await
        .expect("ws connect failed");
    ws
}

async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for server event")
            .expect("connection closed")
            .expect("ws error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn send_join(ws: &mut WsClient, meeting_id: &str, name: &str) {
    let join = serde_json::json!({
        "action": "join",
        "meetingId": meeting_id,
        "attendeeId": format!("att-{name}"),
        "attendeeName": name,
        "spokenLanguage": "en-US",
        "targetLanguage": "es-US",
    });
    ws.send(Message::text(join.to_string())).await.unwrap();
}

#[tokio::test]
async fn join_is_acknowledged_with_connection_id() {
    let app = TestApp::spawn().await;
    let mut ws = connect(&app).await;

    send_join(&mut ws, "meeting-1", "Ada").await;
    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "joined");
    assert!(!event["connectionId"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn third_join_gets_error_and_close() {
    let app = TestApp::spawn().await;

    let mut a = connect(&app).await;
    send_join(&mut a, "meeting-full", "Ada").await;
    assert_eq!(next_json(&mut a).await["type"], "joined");

    let mut b = connect(&app).await;
    send_join(&mut b, "meeting-full", "Grace").await;
    assert_eq!(next_json(&mut b).await["type"], "joined");

    let mut c = connect(&app).await;
    send_join(&mut c, "meeting-full", "Eve").await;
    let event = next_json(&mut c).await;
    assert_eq!(event["type"], "error");
    assert_eq!(event["message"], "meeting is full");

    // The server closes the refused connection.
    let closing = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match c.next().await {
                None | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
                Some(Err(_)) => break,
            }
        }
    })
    .await;
    assert!(closing.is_ok(), "connection was not closed");
}

#[tokio::test]
async fn slot_freed_by_disconnect_can_be_rejoined() {
    let app = TestApp::spawn().await;

    let mut a = connect(&app).await;
    send_join(&mut a, "meeting-2", "Ada").await;
    assert_eq!(next_json(&mut a).await["type"], "joined");

    let mut b = connect(&app).await;
    send_join(&mut b, "meeting-2", "Grace").await;
    assert_eq!(next_json(&mut b).await["type"], "joined");

    b.close(None).await.unwrap();
    // Give the server a beat to run its disconnect cleanup.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut c = connect(&app).await;
    send_join(&mut c, "meeting-2", "Eve").await;
    assert_eq!(next_json(&mut c).await["type"], "joined");
}

#[tokio::test]
async fn malformed_control_frame_keeps_connection_open() {
    let app = TestApp::spawn().await;
    let mut ws = connect(&app).await;

    ws.send(Message::text("{not json")).await.unwrap();
    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "error");

    ws.send(Message::text(r#"{"action":"dance"}"#)).await.unwrap();
    let event = next_json(&mut ws).await;
    assert_eq!(event["type"], "error");

    // Still usable afterwards.
    send_join(&mut ws, "meeting-3", "Ada").await;
    assert_eq!(next_json(&mut ws).await["type"], "joined");
}

#[tokio::test]
async fn control_actions_before_join_are_protocol_errors() {
    let app = TestApp::spawn().await;
    let mut ws = connect(&app).await;

    for action in ["mic_on", "mic_off", "stop"] {
        ws.send(Message::text(format!(r#"{{"action":"{action}"}}"#)))
            .await
            .unwrap();
        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "error");
        assert_eq!(event["message"], "not joined");
    }
}

#[tokio::test]
async fn audio_frames_are_accepted_silently() {
    let app = TestApp::spawn().await;
    let mut ws = connect(&app).await;

    // Binary before join is ignored outright.
    ws.send(Message::binary(vec![0u8; 320])).await.unwrap();

    send_join(&mut ws, "meeting-4", "Ada").await;
    assert_eq!(next_json(&mut ws).await["type"], "joined");

    // In-range and oversized frames both produce no reply; the oversized
    // one is dropped server-side without closing the connection.
    ws.send(Message::binary(vec![0u8; 65_536])).await.unwrap();
    ws.send(Message::binary(vec![0u8; 65_537])).await.unwrap();

    // The connection still answers control traffic.
    ws.send(Message::text("junk")).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "error");
}

#[tokio::test]
async fn mic_controls_after_join_produce_no_errors() {
    let app = TestApp::spawn().await;
    let mut ws = connect(&app).await;

    send_join(&mut ws, "meeting-5", "Ada").await;
    assert_eq!(next_json(&mut ws).await["type"], "joined");

    for action in ["mic_off", "mic_on", "stop"] {
        ws.send(Message::text(format!(r#"{{"action":"{action}"}}"#)))
            .await
            .unwrap();
    }

    // None of those produce a reply; verify the connection is healthy.
    ws.send(Message::text("junk")).await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "error");
}
