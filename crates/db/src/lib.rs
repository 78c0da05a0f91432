pub mod models;
pub mod store;

pub use models::{Attendee, Meeting};
pub use store::{DynamoMeetingStore, MemoryMeetingStore, MeetingStore, StoreError};
