use anyhow::{Context, anyhow};
use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::{MeetingStore, StoreError};
use crate::models::{Attendee, Meeting};

/// Single-table DynamoDB layout:
/// `pk = meeting_id`, `sk = "MEETING"` for the meeting item and
/// `sk = "ATTENDEE#<attendee_id>"` for each attendee.
pub struct DynamoMeetingStore {
    client: aws_sdk_dynamodb::Client,
    table_name: String,
}

impl DynamoMeetingStore {
    pub fn new(sdk_config: &aws_config::SdkConfig, table_name: &str) -> Self {
        Self {
            client: aws_sdk_dynamodb::Client::new(sdk_config),
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl MeetingStore for DynamoMeetingStore {
    async fn put_meeting(&self, meeting: &Meeting) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("pk", AttributeValue::S(meeting.meeting_id.clone()))
            .item("sk", AttributeValue::S("MEETING".to_string()))
            .item(
                "externalMeetingId",
                AttributeValue::S(meeting.external_meeting_id.clone()),
            )
            .item(
                "createdAt",
                AttributeValue::S(meeting.created_at.to_rfc3339()),
            )
            .send()
            .await
            .map_err(|e| anyhow!(e).context("put_meeting"))?;

        debug!(meeting_id = %meeting.meeting_id, "meeting persisted");
        Ok(())
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, StoreError> {
        let out = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("pk", AttributeValue::S(meeting_id.to_string()))
            .key("sk", AttributeValue::S("MEETING".to_string()))
            .send()
            .await
            .map_err(|e| anyhow!(e).context("get_meeting"))?;

        let Some(item) = out.item else {
            return Ok(None);
        };

        let external_meeting_id = string_attr(&item, "externalMeetingId")?;
        let created_at = string_attr(&item, "createdAt")?
            .parse::<DateTime<Utc>>()
            .context("createdAt timestamp")?;

        Ok(Some(Meeting {
            meeting_id: meeting_id.to_string(),
            external_meeting_id,
            created_at,
        }))
    }

    async fn put_attendee(&self, attendee: &Attendee) -> Result<(), StoreError> {
        self.client
            .put_item()
            .table_name(&self.table_name)
            .item("pk", AttributeValue::S(attendee.meeting_id.clone()))
            .item(
                "sk",
                AttributeValue::S(format!("ATTENDEE#{}", attendee.attendee_id)),
            )
            .item("name", AttributeValue::S(attendee.name.clone()))
            .item("joinToken", AttributeValue::S(attendee.join_token.clone()))
            .send()
            .await
            .map_err(|e| anyhow!(e).context("put_attendee"))?;

        debug!(
            meeting_id = %attendee.meeting_id,
            attendee_id = %attendee.attendee_id,
            "attendee persisted"
        );
        Ok(())
    }
}

fn string_attr(
    item: &std::collections::HashMap<String, AttributeValue>,
    name: &str,
) -> Result<String, StoreError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| StoreError::Backend(anyhow!("missing attribute `{name}`")))
}
