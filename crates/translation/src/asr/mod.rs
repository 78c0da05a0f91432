pub mod deepgram;
pub mod transcribe;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Expected client audio: raw PCM16 LE, mono.
pub const SAMPLE_RATE_HZ: i32 = 16_000;

/// One recognizer result. For a given utterance the recognizer emits
/// zero or more partials with growing text, then exactly one final (or
/// nothing, if the session is aborted).
#[derive(Debug, Clone)]
pub struct TranscriptSegment {
    pub text: String,
    pub is_final: bool,
    /// Recognizer dialect code the session was opened with.
    pub source_lang: String,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Session behavior shared by all recognizer providers.
#[derive(Debug, Clone)]
pub struct AsrSessionConfig {
    /// Bounded frame FIFO depth; overflow drops frames (audio is
    /// real-time, stale frames are worthless).
    pub frame_queue: usize,
    /// Reconnect attempts before the session is declared dead.
    pub max_connect_attempts: u32,
    /// Initial reconnect backoff, scaled linearly per attempt.
    pub retry_initial: Duration,
    /// Ping spacing during silence, for providers that require it.
    pub keepalive: Duration,
    /// Hard idle cutoff on the streaming connection.
    pub idle_timeout: Duration,
    /// Proactive stream refresh, kept under the provider's session cap.
    pub refresh_after: Option<Duration>,
}

impl Default for AsrSessionConfig {
    fn default() -> Self {
        Self {
            frame_queue: 64,
            max_connect_attempts: 5,
            retry_initial: Duration::from_secs(1),
            keepalive: Duration::from_secs(8),
            idle_timeout: Duration::from_secs(600),
            refresh_after: Some(Duration::from_secs(420)),
        }
    }
}

pub(crate) enum SessionCommand {
    Frame(Vec<u8>),
    /// Flush buffered audio, deliver terminal transcripts, then close.
    Finish,
}

/// Why a single recognizer stream ended; drives the session's outer
/// retry/refresh loop.
pub(crate) enum StreamEnd {
    /// Graceful finish completed; terminal transcripts were delivered.
    Finished,
    /// The session handle went away; nothing left to do.
    Closed,
    /// Provider session cap approaching; reconnect without counting an attempt.
    Refresh,
    /// No audio for the idle cutoff; give up the connection.
    IdleTimeout,
    Error(anyhow::Error),
}

/// Handle to one streaming recognizer session. The session task owns
/// the provider connection, retries transient failures with backoff,
/// and pushes transcripts into the channel it was opened with.
pub struct AsrSession {
    pub(crate) cmd_tx: mpsc::Sender<SessionCommand>,
    pub(crate) alive: Arc<AtomicBool>,
    pub(crate) task: JoinHandle<()>,
}

impl AsrSession {
    /// Forwards one audio frame. Returns false when the session is dead
    /// and the caller should open a fresh one.
    pub fn push(&self, frame: Vec<u8>) -> bool {
        if !self.alive() {
            return false;
        }
        match self.cmd_tx.try_send(SessionCommand::Frame(frame)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("ASR frame FIFO full, dropping frame");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Graceful termination: asks the recognizer to flush buffered audio
    /// and waits until its terminal transcripts have been delivered.
    pub async fn finish(self) {
        let _ = self.cmd_tx.send(SessionCommand::Finish).await;
        let _ = self.task.await;
    }

    /// Hard close; buffered audio and pending transcripts are discarded.
    pub fn stop(self) {
        self.alive.store(false, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Streaming recognizer factory. A connect failure inside
/// `open_session` surfaces as `Err`; the pipeline treats that session
/// slot as dead and retries on the next audio frame.
#[async_trait]
pub trait AsrProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn open_session(
        &self,
        asr_code: &str,
        transcripts: mpsc::Sender<TranscriptSegment>,
    ) -> anyhow::Result<AsrSession>;
}

/// Discards frames that queued up while the stream was down. Audio that
/// arrived during a reconnect gap is intentionally lost. Returns true
/// when a Finish command was among the drained messages.
pub(crate) fn drain_gap_frames(cmd_rx: &mut mpsc::Receiver<SessionCommand>) -> bool {
    let mut finish_seen = false;
    while let Ok(cmd) = cmd_rx.try_recv() {
        if matches!(cmd, SessionCommand::Finish) {
            finish_seen = true;
        }
    }
    finish_seen
}

/// Linear backoff: `retry_initial * attempt`, attempt being 1-based.
pub(crate) fn backoff_for(config: &AsrSessionConfig, attempt: u32) -> Duration {
    config.retry_initial.saturating_mul(attempt.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_scales_linearly() {
        let config = AsrSessionConfig::default();
        assert_eq!(backoff_for(&config, 1), Duration::from_secs(1));
        assert_eq!(backoff_for(&config, 3), Duration::from_secs(3));
        assert_eq!(backoff_for(&config, 0), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn drain_discards_frames_and_flags_finish() {
        let (tx, mut rx) = mpsc::channel(8);
        tx.send(SessionCommand::Frame(vec![0; 4])).await.unwrap();
        tx.send(SessionCommand::Finish).await.unwrap();
        tx.send(SessionCommand::Frame(vec![0; 4])).await.unwrap();

        assert!(drain_gap_frames(&mut rx));
        assert!(rx.try_recv().is_err());
    }
}
