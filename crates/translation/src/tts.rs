use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_polly::types::{Engine, OutputFormat, VoiceId};

use crate::languages::{self, TtsEngine};

/// Raw speech synthesis against a concrete voice.
#[async_trait]
pub trait TtsBackend: Send + Sync + 'static {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        engine: TtsEngine,
    ) -> anyhow::Result<Vec<u8>>;
}

pub struct PollyBackend {
    client: aws_sdk_polly::Client,
}

impl PollyBackend {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_polly::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl TtsBackend for PollyBackend {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        engine: TtsEngine,
    ) -> anyhow::Result<Vec<u8>> {
        let engine = match engine {
            TtsEngine::Neural => Engine::Neural,
            TtsEngine::Standard => Engine::Standard,
        };

        let output = self
            .client
            .synthesize_speech()
            .output_format(OutputFormat::Mp3)
            .voice_id(VoiceId::from(voice))
            .engine(engine)
            .text(text)
            .send()
            .await?;

        let audio = output.audio_stream.collect().await?;
        Ok(audio.into_bytes().to_vec())
    }
}

/// Locale-level synthesis. Resolves the voice through the language
/// table; locales without a voice are legal text-only targets and yield
/// `None` rather than an error.
pub struct Synthesizer {
    backend: Arc<dyn TtsBackend>,
}

impl Synthesizer {
    pub fn new(backend: Arc<dyn TtsBackend>) -> Self {
        Self { backend }
    }

    pub async fn synthesize(&self, text: &str, locale: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let spec = languages::resolve(locale);
        let Some(voice) = spec.tts_voice else {
            return Ok(None);
        };
        let audio = self.backend.synthesize(text, voice, spec.tts_engine).await?;
        Ok(Some(audio))
    }
}
