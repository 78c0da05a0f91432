use crate::fixtures::test_app::TestApp;
use serde_json::Value;

#[tokio::test]
async fn create_meeting_returns_meeting_and_attendee() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/meetings"))
        .json(&serde_json::json!({ "attendeeName": "Ada" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert!(!json["meeting"]["meetingId"].as_str().unwrap().is_empty());
    assert!(!json["meeting"]["externalMeetingId"].as_str().unwrap().is_empty());
    assert_eq!(json["attendee"]["name"], "Ada");
    assert_eq!(
        json["attendee"]["meetingId"],
        json["meeting"]["meetingId"]
    );
}

#[tokio::test]
async fn add_attendee_to_existing_meeting() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/meetings"))
        .json(&serde_json::json!({ "attendeeName": "Ada" }))
        .send()
        .await
        .unwrap();
    let created: Value = resp.json().await.unwrap();
    let meeting_id = created["meeting"]["meetingId"].as_str().unwrap();

    let resp = app
        .client
        .post(app.url(&format!("/api/meetings/{meeting_id}/attendees")))
        .json(&serde_json::json!({ "attendeeName": "Grace" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["attendee"]["name"], "Grace");
    assert_eq!(json["meeting"]["meetingId"], meeting_id);
    assert_ne!(
        json["attendee"]["attendeeId"],
        created["attendee"]["attendeeId"]
    );
}

#[tokio::test]
async fn add_attendee_to_unknown_meeting_is_404() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/meetings/does-not-exist/attendees"))
        .json(&serde_json::json!({ "attendeeName": "Grace" }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 404);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn blank_attendee_name_is_rejected() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/api/meetings"))
        .json(&serde_json::json!({ "attendeeName": "   " }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn health_reports_ok_with_timestamp() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/api/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(!json["timestamp"].as_str().unwrap().is_empty());
}
