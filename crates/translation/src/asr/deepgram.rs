//! Deepgram streaming recognizer over a raw WebSocket. Audio goes up as
//! binary frames; results come back as JSON text frames. Deepgram wants
//! a `KeepAlive` text frame during silence and honors `CloseStream` as
//! the graceful flush signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{
    AsrProvider, AsrSession, AsrSessionConfig, SAMPLE_RATE_HZ, SessionCommand, StreamEnd,
    TranscriptSegment, backoff_for, drain_gap_frames,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct DeepgramProvider {
    api_key: String,
    config: AsrSessionConfig,
}

impl DeepgramProvider {
    pub fn new(api_key: impl Into<String>, config: AsrSessionConfig) -> Self {
        Self {
            api_key: api_key.into(),
            config,
        }
    }
}

#[async_trait]
impl AsrProvider for DeepgramProvider {
    fn name(&self) -> &str {
        "deepgram"
    }

    async fn open_session(
        &self,
        asr_code: &str,
        transcripts: mpsc::Sender<TranscriptSegment>,
    ) -> anyhow::Result<AsrSession> {
        if self.api_key.is_empty() {
            bail!("Deepgram API key is not configured");
        }

        // Connect before spawning so a connect failure surfaces to the
        // caller as a dead session instead of a silently failing task.
        let ws = connect(&self.api_key, asr_code).await?;

        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.frame_queue);
        let alive = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_session(
            ws,
            self.api_key.clone(),
            asr_code.to_string(),
            self.config.clone(),
            cmd_rx,
            transcripts,
            Arc::clone(&alive),
        ));

        Ok(AsrSession { cmd_tx, alive, task })
    }
}

fn listen_url(asr_code: &str) -> String {
    format!(
        "wss://api.deepgram.com/v1/listen\
         ?model=nova-2&language={asr_code}&encoding=linear16\
         &sample_rate={SAMPLE_RATE_HZ}&channels=1\
         &interim_results=true&punctuate=true"
    )
}

async fn connect(api_key: &str, asr_code: &str) -> anyhow::Result<WsStream> {
    let mut request = listen_url(asr_code).into_client_request()?;
    request.headers_mut().insert(
        AUTHORIZATION,
        format!("Token {api_key}")
            .parse()
            .map_err(|_| anyhow!("API key is not a valid header value"))?,
    );

    let (ws, _) = tokio_tungstenite::connect_async(request).await?;
    Ok(ws)
}

async fn run_session(
    initial_ws: WsStream,
    api_key: String,
    asr_code: String,
    config: AsrSessionConfig,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    transcripts: mpsc::Sender<TranscriptSegment>,
    alive: Arc<AtomicBool>,
) {
    let mut ws = Some(initial_ws);
    let mut attempt: u32 = 0;

    loop {
        let stream = match ws.take() {
            Some(stream) => stream,
            None => match connect(&api_key, &asr_code).await {
                Ok(stream) => {
                    attempt = 0;
                    stream
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

        match stream_once(stream, &config, &mut cmd_rx, &transcripts, &asr_code).await {
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

        // Fresh FIFO per attempt: whatever audio queued while the stream
        // was down is discarded, not replayed.
        if drain_gap_frames(&mut cmd_rx) {
            break;
        }
    }

    alive.store(false, Ordering::SeqCst);
}

async fn stream_once(
    ws: WsStream,
    config: &AsrSessionConfig,
    cmd_rx: &mut mpsc::Receiver<SessionCommand>,
    transcripts: &mpsc::Sender<TranscriptSegment>,
    asr_code: &str,
) -> StreamEnd {
    let (mut sink, mut source) = ws.split();

    let started = Instant::now();
    let mut keepalive = tokio::time::interval_at(started + config.keepalive, config.keepalive);
    let refresh_at = config.refresh_after.map(|d| started + d);
    let mut idle_at = started + config.idle_timeout;
    let mut finishing = false;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !finishing => match cmd {
                Some(SessionCommand::Frame(frame)) => {
                    idle_at = Instant::now() + config.idle_timeout;
                    if let Err(e) = sink.send(Message::binary(frame)).await {
                        return StreamEnd::Error(e.into());
                    }
                }
                Some(SessionCommand::Finish) => {
                    finishing = true;
                    if sink.send(Message::text(r#"{"type":"CloseStream"}"#)).await.is_err() {
                        // Stream already torn down; nothing left to flush.
                        return StreamEnd::Finished;
                    }
                }
                None => return StreamEnd::Closed,
            },
            msg = source.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    for segment in parse_results(text.as_str(), asr_code) {
                        if transcripts.send(segment).await.is_err() {
                            return StreamEnd::Closed;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return if finishing {
                        StreamEnd::Finished
                    } else {
                        StreamEnd::Error(anyhow!("recognizer closed the stream"))
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return StreamEnd::Error(e.into()),
            },
            _ = keepalive.tick(), if !finishing => {
                if sink.send(Message::text(r#"{"type":"KeepAlive"}"#)).await.is_err() {
                    return StreamEnd::Error(anyhow!("keep-alive send failed"));
                }
            }
            _ = tokio::time::sleep_until(refresh_at.unwrap_or(idle_at)),
                if refresh_at.is_some() && !finishing =>
            {
                return StreamEnd::Refresh;
            }
            _ = tokio::time::sleep_until(idle_at) => {
                return StreamEnd::IdleTimeout;
            }
        }
    }
}

/// Maps one Deepgram `Results` message to transcript segments. Empty
/// partials are noise and are dropped here; empty finals pass through so
/// the pipeline can close out the utterance.
fn parse_results(raw: &str, source_lang: &str) -> Vec<TranscriptSegment> {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return Vec::new();
    };
    if value.get("type").and_then(|t| t.as_str()) != Some("Results") {
        return Vec::new();
    }

    let text = value
        .pointer("/channel/alternatives/0/transcript")
        .and_then(|t| t.as_str())
        .unwrap_or_default();
    let is_final = value
        .get("is_final")
        .and_then(|f| f.as_bool())
        .unwrap_or(false);
    if text.is_empty() && !is_final {
        return Vec::new();
    }

    let start = value.get("start").and_then(|s| s.as_f64()).unwrap_or(0.0);
    let duration = value
        .get("duration")
        .and_then(|d| d.as_f64())
        .unwrap_or(0.0);

    vec![TranscriptSegment {
        text: text.to_string(),
        is_final,
        source_lang: source_lang.to_string(),
        start_ms: (start * 1000.0) as u64,
        end_ms: ((start + duration) * 1000.0) as u64,
    }]
}
