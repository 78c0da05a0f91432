use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub meeting_id: String,
    /// Caller-visible identifier, distinct from the provider-issued one.
    pub external_meeting_id: String,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    pub fn new() -> Self {
        let meeting_id = Uuid::new_v4().to_string();
        Self {
            external_meeting_id: format!("lingolive-{}", &meeting_id[..8]),
            meeting_id,
            created_at: Utc::now(),
        }
    }
}

impl Default for Meeting {
    fn default() -> Self {
        Self::new()
    }
}
