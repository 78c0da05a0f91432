//! AWS Transcribe streaming recognizer. The frame FIFO is bridged into
//! the SDK's event-stream input; closing that input is the graceful
//! flush signal, after which Transcribe emits its terminal results and
//! ends the output stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_transcribestreaming::Client;
use aws_sdk_transcribestreaming::operation::start_stream_transcription::StartStreamTranscriptionOutput;
use aws_sdk_transcribestreaming::primitives::Blob;
use aws_sdk_transcribestreaming::types::{
    AudioEvent, AudioStream, LanguageCode, MediaEncoding, TranscriptResultStream,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{
    AsrProvider, AsrSession, AsrSessionConfig, SAMPLE_RATE_HZ, SessionCommand, StreamEnd,
    TranscriptSegment, backoff_for, drain_gap_frames,
};

pub struct TranscribeProvider {
    client: Client,
    config: AsrSessionConfig,
}

impl TranscribeProvider {
    pub fn new(sdk_config: &aws_config::SdkConfig, config: AsrSessionConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
            config,
        }
    }
}

#[async_trait]
impl AsrProvider for TranscribeProvider {
    fn name(&self) -> &str {
        "aws"
    }

    async fn open_session(
        &self,
        asr_code: &str,
        transcripts: mpsc::Sender<TranscriptSegment>,
    ) -> anyhow::Result<AsrSession> {
        let initial = open_stream(&self.client, asr_code, self.config.frame_queue).await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.frame_queue);
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_session(
            self.client.clone(),
            asr_code.to_string(),
            self.config.clone(),
            cmd_rx,
            transcripts,
            Arc::clone(&alive),
            initial,
        ));

        Ok(AsrSession { cmd_tx, alive, task })
    }
}

type OpenedStream = (mpsc::Sender<Vec<u8>>, StartStreamTranscriptionOutput);

async fn open_stream(
    client: &Client,
    asr_code: &str,
    queue: usize,
) -> anyhow::Result<OpenedStream> {
    let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(queue);

    let audio_stream = async_stream::stream! {
        while let Some(chunk) = audio_rx.recv().await {
            let event = AudioEvent::builder().audio_chunk(Blob::new(chunk)).build();
            yield Ok(AudioStream::AudioEvent(event));
        }
    };

    let output = client
        .start_stream_transcription()
        .language_code(LanguageCode::from(asr_code))
        .media_encoding(MediaEncoding::Pcm)
        .media_sample_rate_hertz(SAMPLE_RATE_HZ)
        .audio_stream(audio_stream.into())
        .send()
        .await?;

    Ok((audio_tx, output))
}

async fn run_session(
    client: Client,
    asr_code: String,
    config: AsrSessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    transcripts: mpsc::Sender<TranscriptSegment>,
    alive: Arc<AtomicBool>,
    initial: OpenedStream,
) {
    let mut current = Some(initial);
    let mut attempt: u32 = 0;

    loop {
        let opened = match current.take() {
            Some(opened) => opened,
            None => match open_stream(&client, &asr_code, config.frame_queue).await {
                Ok(opened) => {
                    attempt = 0;
                    opened
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= config.max_connect_attempts {
                        warn!(%e, attempt, "recognizer reconnect failed, giving up");
                        break;
                    }
                    warn!(%e, attempt, "recognizer reconnect failed, backing off");
                    tokio::time::sleep(backoff_for(&config, attempt)).await;
                    if drain_gap_frames(&mut cmd_rx) {
                        break;
                    }
                    continue;
                }
            },
        };

        match stream_once(opened, &config, &mut cmd_rx, &transcripts, &asr_code).await {
            StreamEnd::Finished | StreamEnd::Closed => break,
            StreamEnd::IdleTimeout => {
                debug!("recognizer connection idle cutoff reached");
                break;
            }
            StreamEnd::Refresh => {
                debug!("refreshing recognizer stream ahead of the provider session cap");
            }
            StreamEnd::Error(e) => {
                attempt += 1;
                if attempt >= config.max_connect_attempts {
                    warn!(%e, attempt, "recognizer stream failed, giving up");
                    break;
                }
                warn!(%e, attempt, "recognizer stream failed, retrying");
                tokio::time::sleep(backoff_for(&config, attempt)).await;
            }
        }

        // Fresh FIFO per attempt: audio queued during the gap is lost.
        if drain_gap_frames(&mut cmd_rx) {
            break;
        }
    }

    alive.store(false, Ordering::SeqCst);
}

async fn stream_once(
    opened: OpenedStream,
    config: &AsrSessionConfig,
    cmd_rx: &mut mpsc::Receiver<SessionCommand>,
    transcripts: &mpsc::Sender<TranscriptSegment>,
    asr_code: &str,
) -> StreamEnd {
    let (audio_tx, output) = opened;
    let mut results = output.transcript_result_stream;

    let started = Instant::now();
    let refresh_at = config.refresh_after.map(|d| started + d);
    let mut idle_at = started + config.idle_timeout;
    // Some while streaming; dropped on Finish to flush terminal results.
    let mut audio_tx = Some(audio_tx);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if audio_tx.is_some() => match cmd {
                Some(SessionCommand::Frame(frame)) => {
                    idle_at = Instant::now() + config.idle_timeout;
                    let sending = audio_tx.as_ref().map(|tx| tx.try_send(frame));
                    if let Some(Err(mpsc::error::TrySendError::Closed(_))) = sending {
                        return StreamEnd::Error(anyhow!("audio stream rejected a frame"));
                    }
                }
                Some(SessionCommand::Finish) => {
                    audio_tx = None;
                }
                None => return StreamEnd::Closed,
            },
            event = results.recv() => match event {
                Ok(Some(TranscriptResultStream::TranscriptEvent(transcript_event))) => {
                    for segment in extract_segments(transcript_event, asr_code) {
                        if transcripts.send(segment).await.is_err() {
                            return StreamEnd::Closed;
                        }
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    return if audio_tx.is_none() {
                        StreamEnd::Finished
                    } else {
                        StreamEnd::Error(anyhow!("recognizer ended the stream"))
                    };
                }
                Err(e) => return StreamEnd::Error(e.into()),
            },
            _ = tokio::time::sleep_until(refresh_at.unwrap_or(idle_at)),
                if refresh_at.is_some() && audio_tx.is_some() =>
            {
                return StreamEnd::Refresh;
            }
            _ = tokio::time::sleep_until(idle_at) => {
                return StreamEnd::IdleTimeout;
            }
        }
    }
}

fn extract_segments(
    event: aws_sdk_transcribestreaming::types::TranscriptEvent,
    source_lang: &str,
) -> Vec<TranscriptSegment> {
    let Some(transcript) = event.transcript else {
        return Vec::new();
    };

    let mut segments = Vec::new();
    for result in transcript.results.unwrap_or_default() {
        let is_final = !result.is_partial;
        let start_ms = (result.start_time * 1000.0) as u64;
        let end_ms = (result.end_time * 1000.0) as u64;

        let Some(alternative) = result
            .alternatives
            .unwrap_or_default()
            .into_iter()
            .next()
        else {
            continue;
        };

        let text = alternative.transcript.unwrap_or_default();
        if text.is_empty() && !is_final {
            continue;
        }

        segments.push(TranscriptSegment {
            text,
            is_final,
            source_lang: source_lang.to_string(),
            start_ms,
            end_ms,
        });
    }

    segments
}
