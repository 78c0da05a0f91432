use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub attendee_id: String,
    pub meeting_id: String,
    pub name: String,
    pub join_token: String,
}

impl Attendee {
    pub fn new(meeting_id: &str, name: &str) -> Self {
        Self {
            attendee_id: Uuid::new_v4().to_string(),
            meeting_id: meeting_id.to_string(),
            name: name.to_string(),
            join_token: Uuid::new_v4().simple().to_string(),
        }
    }
}
