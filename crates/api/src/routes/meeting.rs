use axum::{Json, extract::Path, extract::State};
use lingolive_db::{Attendee, Meeting};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub attendee_name: String,
}

/// Join shape the frontend hands to the conferencing SDK.
#[derive(Debug, Serialize)]
pub struct JoinInfo {
    pub meeting: Meeting,
    pub attendee: Attendee,
}

/// POST /api/meetings — creates a meeting and its first attendee.
pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<JoinInfo>, ApiError> {
    if req.attendee_name.trim().is_empty() {
        return Err(ApiError::BadRequest("attendeeName is required".to_string()));
    }

    let meeting = Meeting::new();
    state.store.put_meeting(&meeting).await?;

    let attendee = Attendee::new(&meeting.meeting_id, req.attendee_name.trim());
    state.store.put_attendee(&attendee).await?;

    info!(
        meeting_id = %meeting.meeting_id,
        attendee_name = %attendee.name,
        "meeting created"
    );

    Ok(Json(JoinInfo { meeting, attendee }))
}

/// POST /api/meetings/{meeting_id}/attendees — adds an attendee to an
/// existing meeting; 404 when the meeting is unknown.
pub async fn add_attendee(
    State(state): State<AppState>,
    Path(meeting_id): Path<String>,
    Json(req): Json<CreateRequest>,
) -> Result<Json<JoinInfo>, ApiError> {
    if req.attendee_name.trim().is_empty() {
        return Err(ApiError::BadRequest("attendeeName is required".to_string()));
    }

    let meeting = state
        .store
        .get_meeting(&meeting_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Meeting not found".to_string()))?;

    let attendee = Attendee::new(&meeting.meeting_id, req.attendee_name.trim());
    state.store.put_attendee(&attendee).await?;

    info!(
        meeting_id = %meeting.meeting_id,
        attendee_name = %attendee.name,
        "attendee added"
    );

    Ok(Json(JoinInfo { meeting, attendee }))
}
