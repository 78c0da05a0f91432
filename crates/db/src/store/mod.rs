pub mod dynamo;
pub mod memory;

pub use dynamo::DynamoMeetingStore;
pub use memory::MemoryMeetingStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Attendee, Meeting};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("meeting not found")]
    MeetingNotFound,
    #[error("store backend error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// Meeting metadata persistence. Only the REST surface touches this;
/// the translation plane never does.
#[async_trait]
pub trait MeetingStore: Send + Sync + 'static {
    async fn put_meeting(&self, meeting: &Meeting) -> Result<(), StoreError>;

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, StoreError>;

    async fn put_attendee(&self, attendee: &Attendee) -> Result<(), StoreError>;
}
