use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::asr::TranscriptSegment;
use crate::config::PipelineConfig;
use crate::languages;
use crate::protocol::ServerEvent;
use crate::translate::Translator;
use crate::tts::Synthesizer;
use crate::{OutboundEvent, Participant, PartnerDirectory, PartnerPeer};

pub(crate) enum PipelineControl {
    /// Hard-clears utterance state (mic stop / graceful finish done).
    Reset,
}

/// Speculative synthesis started on a partial. The handle is simply
/// dropped when the slot is replaced or invalidated; the abandoned audio
/// is never awaited.
struct PreSynth {
    translated: String,
    audio: JoinHandle<Option<Vec<u8>>>,
}

/// Mutable per-utterance state. Everything here is owned by the worker
/// task, so partial/final ordering needs no locks.
#[derive(Default)]
struct UtteranceState {
    /// When the last partial caption was emitted; partials arriving
    /// within the throttle window of this are dropped whole.
    last_partial_emit: Option<Instant>,
    /// (original, translated) of the last partial, reused when the final
    /// text is identical.
    partial_cache: Option<(String, String)>,
    pre_synth: Option<PreSynth>,
    /// Wall-clock throttle for speculative synthesis. Survives utterance
    /// boundaries: the spacing guarantee is per connection, not per
    /// utterance.
    last_pre_synth: Option<Instant>,
    stale_deadline: Option<Instant>,
    /// Translated text the stale-partial timer would speak.
    latest_partial: Option<String>,
    /// Interim audio went out for the current utterance; the final's
    /// audio is suppressed so the two never overlap at the listener.
    interim_sent: bool,
}

/// Per-connection pipeline worker: consumes transcripts, timer fires,
/// and control messages from a single input loop, which is what keeps
/// caption ordering and timer cancellation trivially correct.
pub(crate) struct PipelineWorker {
    participant: Participant,
    directory: Arc<dyn PartnerDirectory>,
    translator: Arc<Translator>,
    tts: Arc<Synthesizer>,
    config: PipelineConfig,
    outbound: mpsc::Sender<OutboundEvent>,
    state: UtteranceState,
}

impl PipelineWorker {
    pub(crate) fn new(
        participant: Participant,
        directory: Arc<dyn PartnerDirectory>,
        translator: Arc<Translator>,
        tts: Arc<Synthesizer>,
        config: PipelineConfig,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        Self {
            participant,
            directory,
            translator,
            tts,
            config,
            outbound,
            state: UtteranceState::default(),
        }
    }

    pub(crate) async fn run(
        mut self,
        mut transcript_rx: mpsc::Receiver<TranscriptSegment>,
        mut control_rx: mpsc::Receiver<PipelineControl>,
    ) {
        info!(
            connection_id = %self.participant.connection_id,
            meeting_id = %self.participant.meeting_id,
            speaker = %self.participant.display_name,
            spoken = %self.participant.spoken_locale,
            "translation pipeline started"
        );

        loop {
            let stale_at = self.state.stale_deadline;
            tokio::select! {
                // Transcripts first: a graceful mic-off queues terminal
                // transcripts ahead of its Reset, and they must win.
                biased;
                segment = transcript_rx.recv() => match segment {
                    Some(segment) => self.on_transcript(segment).await,
                    None => break,
                },
                control = control_rx.recv() => match control {
                    Some(PipelineControl::Reset) => self.reset(),
                    None => break,
                },
                _ = sleep_until(stale_at.unwrap_or_else(Instant::now)), if stale_at.is_some() => {
                    self.on_stale_partial().await;
                }
            }
        }

        debug!(
            connection_id = %self.participant.connection_id,
            "translation pipeline stopped"
        );
    }

    async fn on_transcript(&mut self, segment: TranscriptSegment) {
        if segment.text.is_empty() {
            // Recognizers emit empty finals when an utterance dissolves;
            // close out the utterance without producing events.
            if segment.is_final {
                self.clear_utterance();
            }
            return;
        }

        let src_mt = languages::mt_from_asr(&segment.source_lang);
        let partner = self
            .directory
            .partner_of(&self.participant.meeting_id, &self.participant.connection_id);
        let dst_mt = match &partner {
            Some(peer) => languages::mt(&peer.spoken_locale),
            None => languages::mt(&self.participant.target_locale),
        };

        let now = Instant::now();
        if !segment.is_final {
            if let Some(last) = self.state.last_partial_emit {
                if now.duration_since(last) < self.config.partial_throttle {
                    return;
                }
            }
            self.state.last_partial_emit = Some(now);
        }

        let translated = self.translate_segment(&segment, src_mt, dst_mt).await;

        if segment.is_final {
            self.state.partial_cache = None;
        } else {
            self.state.partial_cache = Some((segment.text.clone(), translated.clone()));
        }

        if let Some(peer) = &partner {
            self.emit(
                &peer.connection_id,
                ServerEvent::Caption {
                    speaker_attendee_id: self.participant.attendee_id.clone(),
                    speaker_name: self.participant.display_name.clone(),
                    original_text: segment.text.clone(),
                    translated_text: translated.clone(),
                    is_final: segment.is_final,
                    detected_language: src_mt.to_string(),
                    target_language: dst_mt.to_string(),
                    start_time_ms: Some(segment.start_ms),
                    end_time_ms: Some(segment.end_ms),
                },
            )
            .await;
        }

        if segment.is_final {
            self.on_final(partner.as_ref(), &translated).await;
        } else if let Some(peer) = &partner {
            self.on_partial_audio_work(peer, &translated, now);
        }
    }

    async fn translate_segment(
        &mut self,
        segment: &TranscriptSegment,
        src_mt: &str,
        dst_mt: &str,
    ) -> String {
        if src_mt == dst_mt {
            return segment.text.clone();
        }
        if segment.is_final {
            if let Some((original, translated)) = &self.state.partial_cache {
                if *original == segment.text {
                    return translated.clone();
                }
            }
        }
        match self
            .translator
            .translate(&segment.text, src_mt, dst_mt)
            .await
        {
            Ok(translated) => translated,
            Err(e) => {
                warn!(
                    connection_id = %self.participant.connection_id,
                    meeting_id = %self.participant.meeting_id,
                    %e,
                    "translation failed, captioning original text"
                );
                segment.text.clone()
            }
        }
    }

    /// Partial-side audio work: speculative synthesis and stale-partial
    /// scheduling. Both require a partner and a translation long enough
    /// to be worth speaking.
    fn on_partial_audio_work(&mut self, peer: &PartnerPeer, translated: &str, now: Instant) {
        if translated.chars().count() <= self.config.pre_synth_min_chars {
            return;
        }

        let due = self
            .state
            .last_pre_synth
            .is_none_or(|last| now.duration_since(last) >= self.config.pre_synth_throttle);
        if due {
            self.state.last_pre_synth = Some(now);
            let tts = Arc::clone(&self.tts);
            let text = translated.to_string();
            let locale = peer.spoken_locale.clone();
            let connection_id = self.participant.connection_id.clone();
            let audio = tokio::spawn(async move {
                match tts.synthesize(&text, &locale).await {
                    Ok(audio) => audio,
                    Err(e) => {
                        debug!(%connection_id, %e, "speculative synthesis failed");
                        None
                    }
                }
            });
            // Replacing the slot drops the previous handle; that synth is
            // abandoned, never awaited.
            self.state.pre_synth = Some(PreSynth {
                translated: translated.to_string(),
                audio,
            });
        }

        if !self.state.interim_sent {
            self.state.latest_partial = Some(translated.to_string());
            self.state.stale_deadline = Some(now + self.config.stale_partial_after);
        }
    }

    /// The utterance kept producing partials without a final for the
    /// stale threshold: speak the newest translation now so the listener
    /// is not left waiting, and remember that we did.
    async fn on_stale_partial(&mut self) {
        self.state.stale_deadline = None;
        let Some(text) = self.state.latest_partial.take() else {
            return;
        };
        let Some(peer) = self
            .directory
            .partner_of(&self.participant.meeting_id, &self.participant.connection_id)
        else {
            return;
        };

        if let Some(audio) = self.synthesize(&text, &peer.spoken_locale).await {
            // Only an interim that was actually delivered suppresses the
            // final's audio.
            self.state.interim_sent = true;
            self.emit_audio(&peer, audio).await;
        }
    }

    async fn on_final(&mut self, partner: Option<&PartnerPeer>, translated: &str) {
        self.state.stale_deadline = None;
        self.state.latest_partial = None;
        self.state.last_partial_emit = None;
        let pre_synth = self.state.pre_synth.take();
        let interim_sent = std::mem::take(&mut self.state.interim_sent);

        let Some(peer) = partner else {
            return;
        };

        if interim_sent {
            // The interim audio already covered this utterance; a second
            // clip would overlap it at the listener.
            return;
        }

        let audio = match pre_synth {
            Some(slot) if slot.translated == translated => match slot.audio.await {
                Ok(Some(audio)) => Some(audio),
                _ => self.synthesize(translated, &peer.spoken_locale).await,
            },
            _ => self.synthesize(translated, &peer.spoken_locale).await,
        };

        if let Some(audio) = audio {
            self.emit_audio(peer, audio).await;
        }
    }

    async fn synthesize(&self, text: &str, locale: &str) -> Option<Vec<u8>> {
        match self.tts.synthesize(text, locale).await {
            Ok(audio) => audio,
            Err(e) => {
                warn!(
                    connection_id = %self.participant.connection_id,
                    meeting_id = %self.participant.meeting_id,
                    %e,
                    "synthesis failed, skipping audio"
                );
                None
            }
        }
    }

    async fn emit_audio(&self, peer: &PartnerPeer, audio: Vec<u8>) {
        self.emit(
            &peer.connection_id,
            ServerEvent::Audio {
                speaker_attendee_id: self.participant.attendee_id.clone(),
                audio_data: BASE64.encode(audio),
                target_language: languages::mt(&peer.spoken_locale).to_string(),
            },
        )
        .await;
    }

    async fn emit(&self, connection_id: &str, event: ServerEvent) {
        if self
            .outbound
            .send(OutboundEvent {
                connection_id: connection_id.to_string(),
                event,
            })
            .await
            .is_err()
        {
            debug!("outbound channel closed, dropping event");
        }
    }

    /// Utterance-scoped state only; the speculative-synthesis throttle
    /// clock survives finals.
    fn clear_utterance(&mut self) {
        self.state.last_partial_emit = None;
        self.state.partial_cache = None;
        self.state.pre_synth = None;
        self.state.stale_deadline = None;
        self.state.latest_partial = None;
        self.state.interim_sent = false;
    }

    fn reset(&mut self) {
        self.clear_utterance();
        self.state.last_pre_synth = None;
        debug!(
            connection_id = %self.participant.connection_id,
            "pipeline state reset"
        );
    }
}
