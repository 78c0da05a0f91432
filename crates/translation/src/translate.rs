use std::sync::Arc;

use async_trait::async_trait;

use crate::languages::PIVOT_LANG;

/// Single-hop machine translation between two translate-dialect codes.
#[async_trait]
pub trait TranslateBackend: Send + Sync + 'static {
    async fn translate_text(&self, text: &str, src: &str, dst: &str) -> anyhow::Result<String>;
}

pub struct AwsTranslateBackend {
    client: aws_sdk_translate::Client,
}

impl AwsTranslateBackend {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_translate::Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl TranslateBackend for AwsTranslateBackend {
    async fn translate_text(&self, text: &str, src: &str, dst: &str) -> anyhow::Result<String> {
        let output = self
            .client
            .translate_text()
            .text(text)
            .source_language_code(src)
            .target_language_code(dst)
            .send()
            .await?;
        Ok(output.translated_text().to_string())
    }
}

/// Pivot-routing translator. Language pairs that include English go
/// direct; everything else hops through the English pivot, which is the
/// reliable axis for the model family underneath. No retries here: a
/// failed hop surfaces to the caller, which falls back to the original
/// text.
pub struct Translator {
    backend: Arc<dyn TranslateBackend>,
}

impl Translator {
    pub fn new(backend: Arc<dyn TranslateBackend>) -> Self {
        Self { backend }
    }

    pub async fn translate(&self, text: &str, src: &str, dst: &str) -> anyhow::Result<String> {
        if src == dst || text.is_empty() {
            return Ok(text.to_string());
        }
        if src == PIVOT_LANG || dst == PIVOT_LANG {
            return self.backend.translate_text(text, src, dst).await;
        }
        let pivoted = self.backend.translate_text(text, src, PIVOT_LANG).await?;
        self.backend
            .translate_text(&pivoted, PIVOT_LANG, dst)
            .await
    }
}
