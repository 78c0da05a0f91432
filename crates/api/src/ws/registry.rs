use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use lingolive_translation::{Participant, PartnerDirectory, PartnerPeer};
use thiserror::Error;
use tokio::sync::Mutex;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("meeting is full")]
    MeetingFull,
}

/// One joined connection: the pipeline-facing participant plus the
/// transport handle events are written to.
pub struct ParticipantSession {
    pub participant: Participant,
    pub sender: WsSender,
    open: AtomicBool,
}

impl ParticipantSession {
    pub fn new(participant: Participant, sender: WsSender) -> Arc<Self> {
        Arc::new(Self {
            participant,
            sender,
            open: AtomicBool::new(true),
        })
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Flipped as soon as the socket loop observes the close, so events
    /// racing the disconnect are dropped instead of written to a dead
    /// transport.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Process-global index of open client sessions. Meetings hold at most
/// two live members; a third join is refused.
pub struct ConnectionRegistry {
    connections: DashMap<String, Arc<ParticipantSession>>,
    meetings: DashMap<String, Vec<String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            meetings: DashMap::new(),
        }
    }

    /// Registers a session. The membership check and insert happen under
    /// the meeting's map entry, so two racing joins cannot both pass the
    /// cap.
    pub fn add(&self, session: Arc<ParticipantSession>) -> Result<(), RegistryError> {
        let meeting_id = session.participant.meeting_id.clone();
        let connection_id = session.participant.connection_id.clone();

        let mut members = self.meetings.entry(meeting_id).or_default();
        members.retain(|id| {
            self.connections
                .get(id)
                .is_some_and(|existing| existing.is_open())
        });
        if members.len() >= 2 {
            return Err(RegistryError::MeetingFull);
        }
        members.push(connection_id.clone());
        drop(members);

        self.connections.insert(connection_id, session);
        Ok(())
    }

    pub fn remove(&self, connection_id: &str) {
        let Some((_, session)) = self.connections.remove(connection_id) else {
            return;
        };
        session.mark_closed();

        let meeting_id = &session.participant.meeting_id;
        if let Some(mut members) = self.meetings.get_mut(meeting_id) {
            members.retain(|id| id != connection_id);
            if members.is_empty() {
                drop(members);
                self.meetings.remove(meeting_id);
            }
        }
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<ParticipantSession>> {
        self.connections
            .get(connection_id)
            .map(|entry| Arc::clone(&*entry))
    }

    /// The other live member of the meeting, if any.
    pub fn partner(&self, meeting_id: &str, connection_id: &str) -> Option<Arc<ParticipantSession>> {
        let members = self.meetings.get(meeting_id)?;
        members
            .iter()
            .filter(|id| id.as_str() != connection_id)
            .filter_map(|id| self.get(id))
            .find(|session| session.is_open())
    }

    /// All live members of a meeting.
    pub fn broadcast(&self, meeting_id: &str) -> Vec<Arc<ParticipantSession>> {
        let Some(members) = self.meetings.get(meeting_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|session| session.is_open())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PartnerDirectory for ConnectionRegistry {
    fn partner_of(&self, meeting_id: &str, connection_id: &str) -> Option<PartnerPeer> {
        self.partner(meeting_id, connection_id).map(|session| PartnerPeer {
            connection_id: session.participant.connection_id.clone(),
            spoken_locale: session.participant.spoken_locale.clone(),
        })
    }
}
