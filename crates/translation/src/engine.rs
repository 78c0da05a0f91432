use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::asr::{AsrProvider, AsrSession, TranscriptSegment};
use crate::config::PipelineConfig;
use crate::languages;
use crate::translate::Translator;
use crate::tts::Synthesizer;
use crate::worker::{PipelineControl, PipelineWorker};
use crate::{OutboundEvent, Participant, PartnerDirectory};

/// Manages one translation pipeline per client connection.
///
/// Created once at startup and shared via `Arc`. Events addressed to
/// partner connections come out of the receiver returned by [`new`];
/// the transport layer drains it with a single dispatcher task so
/// per-speaker ordering survives the hop.
///
/// [`new`]: TranslationEngine::new
pub struct TranslationEngine {
    asr: Arc<dyn AsrProvider>,
    translator: Arc<Translator>,
    tts: Arc<Synthesizer>,
    directory: Arc<dyn PartnerDirectory>,
    config: PipelineConfig,
    pipelines: DashMap<String, Arc<PipelineHandle>>,
    outbound_tx: mpsc::Sender<OutboundEvent>,
}

struct PipelineHandle {
    participant: Participant,
    transcript_tx: mpsc::Sender<TranscriptSegment>,
    control_tx: mpsc::Sender<PipelineControl>,
    /// Replaced atomically on restart; None while the recognizer is down.
    asr_session: Mutex<Option<AsrSession>>,
    abort: tokio::task::AbortHandle,
}

impl TranslationEngine {
    /// Returns `(engine, outbound_receiver)`.
    pub fn new(
        asr: Arc<dyn AsrProvider>,
        translator: Arc<Translator>,
        tts: Arc<Synthesizer>,
        directory: Arc<dyn PartnerDirectory>,
        config: PipelineConfig,
    ) -> (Arc<Self>, mpsc::Receiver<OutboundEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(256);

        info!(provider = asr.name(), "translation engine created");

        let engine = Arc::new(Self {
            asr,
            translator,
            tts,
            directory,
            config,
            pipelines: DashMap::new(),
            outbound_tx,
        });

        (engine, outbound_rx)
    }

    /// Starts the pipeline for a joined participant: spawns the worker
    /// and opens the initial recognizer session. A recognizer connect
    /// failure is not fatal here; the dead session is replaced
    /// transparently on the next audio frame.
    pub async fn start_pipeline(&self, participant: Participant) {
        let key = participant.connection_id.clone();

        if self.pipelines.contains_key(&key) {
            info!(connection_id = %key, "replacing existing pipeline");
            self.stop_pipeline(&key).await;
        }

        let (transcript_tx, transcript_rx) = mpsc::channel(64);
        let (control_tx, control_rx) = mpsc::channel(8);

        let worker = PipelineWorker::new(
            participant.clone(),
            Arc::clone(&self.directory),
            Arc::clone(&self.translator),
            Arc::clone(&self.tts),
            self.config.clone(),
            self.outbound_tx.clone(),
        );
        let task = tokio::spawn(worker.run(transcript_rx, control_rx));

        let asr_code = languages::resolve(&participant.spoken_locale).asr_code;
        let session = match self.asr.open_session(asr_code, transcript_tx.clone()).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(
                    connection_id = %key,
                    meeting_id = %participant.meeting_id,
                    %e,
                    "recognizer connect failed; will retry on the next audio frame"
                );
                None
            }
        };

        self.pipelines.insert(
            key.clone(),
            Arc::new(PipelineHandle {
                participant,
                transcript_tx,
                control_tx,
                asr_session: Mutex::new(session),
                abort: task.abort_handle(),
            }),
        );

        debug!(connection_id = %key, "pipeline registered");
    }

    /// Forwards one client audio frame into the recognizer. Oversized
    /// frames are dropped without a reply; a dead or missing recognizer
    /// session is replaced in place so no frame is lost to a session
    /// that merely died.
    pub async fn ingest_audio(&self, connection_id: &str, frame: Vec<u8>) {
        if frame.len() > self.config.max_frame_bytes {
            debug!(
                connection_id,
                bytes = frame.len(),
                "oversized audio frame dropped"
            );
            return;
        }

        let Some(handle) = self.handle(connection_id) else {
            return;
        };

        let mut slot = handle.asr_session.lock().await;
        if slot.as_ref().is_none_or(|session| !session.alive()) {
            let asr_code = languages::resolve(&handle.participant.spoken_locale).asr_code;
            match self
                .asr
                .open_session(asr_code, handle.transcript_tx.clone())
                .await
            {
                Ok(session) => {
                    info!(connection_id, "recognizer session restarted");
                    *slot = Some(session);
                }
                Err(e) => {
                    warn!(connection_id, %e, "recognizer restart failed, dropping frame");
                    *slot = None;
                    return;
                }
            }
        }

        if let Some(session) = slot.as_ref() {
            session.push(frame);
        }
    }

    /// Graceful mic-off: lets the recognizer flush buffered audio and
    /// deliver terminal transcripts, then clears pipeline state.
    pub async fn mic_off(&self, connection_id: &str) {
        let Some(handle) = self.handle(connection_id) else {
            return;
        };

        let session = handle.asr_session.lock().await.take();
        if let Some(session) = session {
            session.finish().await;
        }
        let _ = handle.control_tx.send(PipelineControl::Reset).await;
        debug!(connection_id, "mic off, recognizer finished");
    }

    /// (Re)starts the recognizer session for an open connection.
    pub async fn mic_on(&self, connection_id: &str) {
        let Some(handle) = self.handle(connection_id) else {
            return;
        };

        let mut slot = handle.asr_session.lock().await;
        if let Some(old) = slot.take() {
            old.stop();
        }
        let asr_code = languages::resolve(&handle.participant.spoken_locale).asr_code;
        *slot = match self
            .asr
            .open_session(asr_code, handle.transcript_tx.clone())
            .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(connection_id, %e, "recognizer connect failed on mic on");
                None
            }
        };
    }

    /// Hard stop: kills the recognizer and clears pipeline state, but
    /// keeps the connection's pipeline alive for a later mic-on.
    pub async fn stop(&self, connection_id: &str) {
        let Some(handle) = self.handle(connection_id) else {
            return;
        };

        if let Some(session) = handle.asr_session.lock().await.take() {
            session.stop();
        }
        let _ = handle.control_tx.send(PipelineControl::Reset).await;
        debug!(connection_id, "pipeline hard-stopped");
    }

    /// Disconnect: tears down the worker, the recognizer session, and
    /// the pipeline entry.
    pub async fn stop_pipeline(&self, connection_id: &str) {
        if let Some((_, handle)) = self.pipelines.remove(connection_id) {
            if let Some(session) = handle.asr_session.lock().await.take() {
                session.stop();
            }
            handle.abort.abort();
            debug!(connection_id, "pipeline stopped");
        }
    }

    pub fn active_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    fn handle(&self, connection_id: &str) -> Option<Arc<PipelineHandle>> {
        self.pipelines
            .get(connection_id)
            .map(|entry| Arc::clone(&*entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::SessionCommand;
    use crate::translate::TranslateBackend;
    use crate::tts::TtsBackend;
    use crate::languages::TtsEngine;
    use crate::{PartnerPeer, protocol::ServerEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoTranslate;

    #[async_trait]
    impl TranslateBackend for EchoTranslate {
        async fn translate_text(
            &self,
            text: &str,
            _src: &str,
            dst: &str,
        ) -> anyhow::Result<String> {
            Ok(format!("{text}|{dst}"))
        }
    }

    struct SilentTts;

    #[async_trait]
    impl TtsBackend for SilentTts {
        async fn synthesize(
            &self,
            text: &str,
            _voice: &str,
            _engine: TtsEngine,
        ) -> anyhow::Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }
    }

    struct FixedDirectory(Option<PartnerPeer>);

    impl PartnerDirectory for FixedDirectory {
        fn partner_of(&self, _meeting_id: &str, _connection_id: &str) -> Option<PartnerPeer> {
            self.0.clone()
        }
    }

    /// Scripted recognizer: records opens and pushed frames, and can be
    /// flipped dead to exercise the transparent-restart path.
    struct ScriptedAsr {
        opens: AtomicUsize,
        frames: Arc<SyncMutex<Vec<Vec<u8>>>>,
        current_alive: SyncMutex<Option<Arc<AtomicBool>>>,
        /// Final transcript text flushed on a graceful finish.
        flush_on_finish: Option<String>,
    }

    impl ScriptedAsr {
        fn new(flush_on_finish: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                opens: AtomicUsize::new(0),
                frames: Arc::new(SyncMutex::new(Vec::new())),
                current_alive: SyncMutex::new(None),
                flush_on_finish: flush_on_finish.map(str::to_string),
            })
        }

        fn kill_current(&self) {
            if let Some(alive) = self.current_alive.lock().as_ref() {
                alive.store(false, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl AsrProvider for ScriptedAsr {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn open_session(
            &self,
            asr_code: &str,
            transcripts: mpsc::Sender<TranscriptSegment>,
        ) -> anyhow::Result<AsrSession> {
            self.opens.fetch_add(1, Ordering::SeqCst);

            let alive = Arc::new(AtomicBool::new(true));
            *self.current_alive.lock() = Some(Arc::clone(&alive));

            let (cmd_tx, mut cmd_rx) = mpsc::channel(64);
            let sink = Arc::clone(&self.frames);
            let flush = self.flush_on_finish.clone();
            let lang = asr_code.to_string();
            let task_alive = Arc::clone(&alive);

            let task = tokio::spawn(async move {
                while let Some(cmd) = cmd_rx.recv().await {
                    match cmd {
                        SessionCommand::Frame(frame) => {
                            sink.lock().push(frame);
                        }
                        SessionCommand::Finish => {
                            if let Some(text) = &flush {
                                let _ = transcripts
                                    .send(TranscriptSegment {
                                        text: text.clone(),
                                        is_final: true,
                                        source_lang: lang.clone(),
                                        start_ms: 0,
                                        end_ms: 100,
                                    })
                                    .await;
                            }
                            break;
                        }
                    }
                }
                task_alive.store(false, Ordering::SeqCst);
            });

            Ok(AsrSession { cmd_tx, alive, task })
        }
    }

    fn participant() -> Participant {
        Participant {
            connection_id: "conn-a".into(),
            meeting_id: "meeting-1".into(),
            attendee_id: "attendee-a".into(),
            display_name: "Ada".into(),
            spoken_locale: "en-US".into(),
            target_locale: "es-US".into(),
        }
    }

    fn build_engine(
        asr: Arc<ScriptedAsr>,
        partner: Option<PartnerPeer>,
    ) -> (Arc<TranslationEngine>, mpsc::Receiver<OutboundEvent>) {
        TranslationEngine::new(
            asr,
            Arc::new(Translator::new(Arc::new(EchoTranslate))),
            Arc::new(Synthesizer::new(Arc::new(SilentTts))),
            Arc::new(FixedDirectory(partner)),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn join_then_disconnect_tracks_pipeline_count() {
        let asr = ScriptedAsr::new(None);
        let (engine, _outbound) = build_engine(asr.clone(), None);

        engine.start_pipeline(participant()).await;
        assert_eq!(engine.active_pipeline_count(), 1);
        assert_eq!(asr.opens.load(Ordering::SeqCst), 1);

        engine.stop_pipeline("conn-a").await;
        assert_eq!(engine.active_pipeline_count(), 0);
    }

    #[tokio::test]
    async fn dead_session_is_replaced_on_next_frame() {
        let asr = ScriptedAsr::new(None);
        let (engine, _outbound) = build_engine(asr.clone(), None);

        engine.start_pipeline(participant()).await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 1);

        engine.ingest_audio("conn-a", vec![1; 320]).await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 1);

        // Session dies; the very next frame must reach a fresh session.
        asr.kill_current();
        engine.ingest_audio("conn-a", vec![2; 320]).await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 2);

        engine.ingest_audio("conn-a", vec![3; 320]).await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn frame_size_gate_is_exact() {
        let asr = ScriptedAsr::new(None);
        let (engine, _outbound) = build_engine(asr.clone(), None);

        engine.start_pipeline(participant()).await;

        // Exactly at the limit: accepted (and delivered to the session).
        engine.ingest_audio("conn-a", vec![0; 65_536]).await;
        // One byte over: silently dropped.
        engine.ingest_audio("conn-a", vec![0; 65_537]).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        let frames = asr.frames.lock();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].len(), 65_536);
        // The oversized frame never triggered a restart either.
        assert_eq!(asr.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn mic_off_flushes_terminal_transcript() {
        let asr = ScriptedAsr::new(Some("goodbye everyone"));
        let partner = PartnerPeer {
            connection_id: "conn-b".into(),
            spoken_locale: "es-US".into(),
        };
        let (engine, mut outbound) = build_engine(asr.clone(), Some(partner));

        engine.start_pipeline(participant()).await;
        engine.mic_off("conn-a").await;

        // The terminal transcript produced by the graceful finish still
        // reaches the partner as a final caption.
        let event = tokio::time::timeout(Duration::from_secs(5), outbound.recv())
            .await
            .expect("no event after mic off")
            .expect("outbound closed");
        assert_eq!(event.connection_id, "conn-b");
        match event.event {
            ServerEvent::Caption {
                original_text,
                is_final,
                ..
            } => {
                assert_eq!(original_text, "goodbye everyone");
                assert!(is_final);
            }
            other => panic!("expected caption, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mic_on_opens_a_fresh_session() {
        let asr = ScriptedAsr::new(None);
        let (engine, _outbound) = build_engine(asr.clone(), None);

        engine.start_pipeline(participant()).await;
        engine.stop("conn-a").await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 1);

        engine.mic_on("conn-a").await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_connection_is_ignored() {
        let asr = ScriptedAsr::new(None);
        let (engine, _outbound) = build_engine(asr.clone(), None);

        engine.ingest_audio("nobody", vec![0; 8]).await;
        engine.mic_off("nobody").await;
        engine.stop("nobody").await;
        assert_eq!(asr.opens.load(Ordering::SeqCst), 0);
    }
}
