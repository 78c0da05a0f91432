use async_trait::async_trait;
use dashmap::DashMap;

use super::{MeetingStore, StoreError};
use crate::models::{Attendee, Meeting};

/// In-process fallback store used when no DynamoDB table is configured.
#[derive(Default)]
pub struct MemoryMeetingStore {
    meetings: DashMap<String, Meeting>,
    attendees: DashMap<String, Vec<Attendee>>,
}

impl MemoryMeetingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MeetingStore for MemoryMeetingStore {
    async fn put_meeting(&self, meeting: &Meeting) -> Result<(), StoreError> {
        self.meetings
            .insert(meeting.meeting_id.clone(), meeting.clone());
        Ok(())
    }

    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, StoreError> {
        Ok(self.meetings.get(meeting_id).map(|m| m.clone()))
    }

    async fn put_attendee(&self, attendee: &Attendee) -> Result<(), StoreError> {
        self.attendees
            .entry(attendee.meeting_id.clone())
            .or_default()
            .push(attendee.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_and_get_meeting() {
        let store = MemoryMeetingStore::new();
        let meeting = Meeting::new();
        store.put_meeting(&meeting).await.unwrap();

        let found = store.get_meeting(&meeting.meeting_id).await.unwrap();
        assert_eq!(found.unwrap().meeting_id, meeting.meeting_id);
    }

    #[tokio::test]
    async fn unknown_meeting_is_none() {
        let store = MemoryMeetingStore::new();
        assert!(store.get_meeting("nope").await.unwrap().is_none());
    }
}
