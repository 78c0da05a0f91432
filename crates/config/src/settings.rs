use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub aws: AwsSettings,
    pub database: DatabaseSettings,
    pub asr: AsrSettings,
    pub tls: TlsSettings,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AwsSettings {
    pub region: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    /// DynamoDB table for meeting metadata. None = in-memory store.
    pub table_name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AsrSettings {
    /// Streaming recognizer to use: "deepgram" or "aws".
    pub provider: String,
    pub deepgram_api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsSettings {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Pipeline tunables. These are part of the wire contract (they are
/// observable as caption/audio timing at the client), so they are
/// configurable but ship with the canonical defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Minimum spacing between emitted partial captions.
    pub partial_throttle_ms: u64,
    /// Minimum spacing between speculative synthesis starts.
    pub pre_synth_throttle_ms: u64,
    /// Translated text must exceed this length before any interim audio work.
    pub pre_synth_min_chars: usize,
    /// How long a partial may stay unresolved before interim audio fires.
    pub stale_partial_ms: u64,
    /// Client audio frames above this size are dropped.
    pub max_frame_bytes: usize,
    /// ASR reconnect attempts before the session is declared dead.
    pub asr_max_connect_attempts: u32,
    /// Initial ASR reconnect backoff; scaled linearly per attempt.
    pub asr_retry_initial_ms: u64,
    /// Keep-alive ping spacing during silence (Deepgram).
    pub asr_keepalive_secs: u64,
    /// Idle cutoff on a streaming recognizer connection.
    pub asr_idle_timeout_secs: u64,
    /// Proactive stream refresh, kept under the provider's session cap.
    pub asr_refresh_secs: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("LINGOLIVE"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3001)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("aws.region", "us-east-1")?
            .set_default("database.table_name", None::<String>)?
            .set_default("asr.provider", "deepgram")?
            .set_default("asr.deepgram_api_key", None::<String>)?
            .set_default("tls.cert_path", None::<String>)?
            .set_default("tls.key_path", None::<String>)?
            .set_default("pipeline.partial_throttle_ms", 100)?
            .set_default("pipeline.pre_synth_throttle_ms", 1000)?
            .set_default("pipeline.pre_synth_min_chars", 10)?
            .set_default("pipeline.stale_partial_ms", 5000)?
            .set_default("pipeline.max_frame_bytes", 65536)?
            .set_default("pipeline.asr_max_connect_attempts", 5)?
            .set_default("pipeline.asr_retry_initial_ms", 1000)?
            .set_default("pipeline.asr_keepalive_secs", 8)?
            .set_default("pipeline.asr_idle_timeout_secs", 600)?
            .set_default("pipeline.asr_refresh_secs", 420)?
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_well_known_env();
        Ok(settings)
    }

    /// Applies the bare environment variables the deployment recognizes
    /// (PORT, AWS_REGION, ...) on top of whatever the file/prefixed-env
    /// sources produced.
    fn apply_well_known_env(&mut self) {
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse() {
                self.app.port = port;
            }
        }
        if let Ok(region) = std::env::var("AWS_REGION") {
            self.aws.region = region;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGIN") {
            self.app.cors_origins = parse_origin_list(&origins);
        }
        if let Ok(table) = std::env::var("DYNAMODB_TABLE_NAME") {
            if !table.is_empty() {
                self.database.table_name = Some(table);
            }
        }
        if let Ok(provider) = std::env::var("ASR_PROVIDER") {
            self.asr.provider = provider;
        }
        if let Ok(key) = std::env::var("DEEPGRAM_API_KEY") {
            if !key.is_empty() {
                self.asr.deepgram_api_key = Some(key);
            }
        }
        if let Ok(cert) = std::env::var("SSL_CERT_PATH") {
            if !cert.is_empty() {
                self.tls.cert_path = Some(cert);
            }
        }
        if let Ok(key) = std::env::var("SSL_KEY_PATH") {
            if !key.is_empty() {
                self.tls.key_path = Some(key);
            }
        }
    }
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_list_splits_and_trims() {
        let origins = parse_origin_list("https://a.example, https://b.example ,");
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn origin_list_empty_input() {
        assert!(parse_origin_list("").is_empty());
    }
}
