//! Wire frames exchanged with the client over the duplex connection.
//! Binary frames carry raw PCM16 LE mono @ 16 kHz and have no framing
//! beyond the transport's; everything else is JSON, discriminated by
//! `action` (client) or `type` (server).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Join {
        meeting_id: String,
        attendee_id: String,
        attendee_name: String,
        spoken_language: String,
        target_language: String,
    },
    MicOn,
    MicOff,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    Joined { connection_id: String },
    #[serde(rename_all = "camelCase")]
    Caption {
        speaker_attendee_id: String,
        speaker_name: String,
        original_text: String,
        translated_text: String,
        is_final: bool,
        detected_language: String,
        target_language: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_time_ms: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time_ms: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    Audio {
        speaker_attendee_id: String,
        /// Base64-encoded opaque blob (MP3 or WAV, per the synthesizer).
        audio_data: String,
        target_language: String,
    },
    Error { message: String },
}
