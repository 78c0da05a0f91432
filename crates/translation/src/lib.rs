pub mod asr;
pub mod config;
pub mod engine;
pub mod languages;
pub mod protocol;
pub mod translate;
pub mod tts;
pub mod worker;

pub use asr::{AsrProvider, AsrSession, AsrSessionConfig, TranscriptSegment};
pub use config::PipelineConfig;
pub use engine::TranslationEngine;
pub use protocol::{ClientMessage, ServerEvent};
pub use translate::{TranslateBackend, Translator};
pub use tts::{Synthesizer, TtsBackend};

/// One joined client connection, as the pipeline sees it.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Unique per WebSocket connection, process-wide.
    pub connection_id: String,
    pub meeting_id: String,
    /// Provider-issued attendee identifier.
    pub attendee_id: String,
    pub display_name: String,
    /// Canonical locale the participant speaks (e.g. "en-US").
    pub spoken_locale: String,
    /// Locale the participant declared they want to receive, used only
    /// until a partner is present.
    pub target_locale: String,
}

/// The other live member of a two-party meeting.
#[derive(Debug, Clone)]
pub struct PartnerPeer {
    pub connection_id: String,
    pub spoken_locale: String,
}

/// Lookup seam between the pipeline and the connection registry.
/// Implemented by the transport layer; queried on every transcript.
pub trait PartnerDirectory: Send + Sync + 'static {
    fn partner_of(&self, meeting_id: &str, connection_id: &str) -> Option<PartnerPeer>;
}

/// A server event addressed to one connection. Pipelines push these to
/// a single dispatcher task, which preserves per-speaker emission order.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub connection_id: String,
    pub event: ServerEvent,
}
