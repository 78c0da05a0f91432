use std::sync::Arc;

use lingolive_config::Settings;
use lingolive_db::{DynamoMeetingStore, MemoryMeetingStore, MeetingStore};
use lingolive_translation::asr::deepgram::DeepgramProvider;
use lingolive_translation::asr::transcribe::TranscribeProvider;
use lingolive_translation::{
    AsrProvider, AsrSessionConfig, PartnerDirectory, PipelineConfig, Synthesizer,
    TranslationEngine, Translator,
};
use lingolive_translation::translate::AwsTranslateBackend;
use lingolive_translation::tts::PollyBackend;
use std::time::Duration;

use crate::ws::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub store: Arc<dyn MeetingStore>,
    pub registry: Arc<ConnectionRegistry>,
    pub engine: Arc<TranslationEngine>,
}

impl AppState {
    /// Builds shared provider clients, the connection registry, and the
    /// translation engine, and spawns the outbound event dispatcher.
    pub async fn new(settings: Settings) -> anyhow::Result<Self> {
        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(settings.aws.region.clone()))
            .load()
            .await;

        let store: Arc<dyn MeetingStore> = match &settings.database.table_name {
            Some(table) => {
                tracing::info!(table, "using DynamoDB meeting store");
                Arc::new(DynamoMeetingStore::new(&sdk_config, table))
            }
            None => {
                tracing::info!("no DynamoDB table configured, using in-memory meeting store");
                Arc::new(MemoryMeetingStore::new())
            }
        };

        let registry = Arc::new(ConnectionRegistry::new());

        let asr_config = AsrSessionConfig {
            max_connect_attempts: settings.pipeline.asr_max_connect_attempts,
            retry_initial: Duration::from_millis(settings.pipeline.asr_retry_initial_ms),
            keepalive: Duration::from_secs(settings.pipeline.asr_keepalive_secs),
            idle_timeout: Duration::from_secs(settings.pipeline.asr_idle_timeout_secs),
            refresh_after: Some(Duration::from_secs(settings.pipeline.asr_refresh_secs)),
            ..AsrSessionConfig::default()
        };

        let asr: Arc<dyn AsrProvider> = match settings.asr.provider.as_str() {
            "aws" => Arc::new(TranscribeProvider::new(&sdk_config, asr_config.clone())),
            other => {
                if other != "deepgram" {
                    tracing::warn!(provider = other, "unknown ASR provider, using deepgram");
                }
                Arc::new(DeepgramProvider::new(
                    settings.asr.deepgram_api_key.clone().unwrap_or_default(),
                    asr_config.clone(),
                ))
            }
        };

        let pipeline_config = PipelineConfig {
            partial_throttle: Duration::from_millis(settings.pipeline.partial_throttle_ms),
            pre_synth_throttle: Duration::from_millis(settings.pipeline.pre_synth_throttle_ms),
            pre_synth_min_chars: settings.pipeline.pre_synth_min_chars,
            stale_partial_after: Duration::from_millis(settings.pipeline.stale_partial_ms),
            max_frame_bytes: settings.pipeline.max_frame_bytes,
            asr: asr_config,
        };

        let translator = Arc::new(Translator::new(Arc::new(AwsTranslateBackend::new(
            &sdk_config,
        ))));
        let tts = Arc::new(Synthesizer::new(Arc::new(PollyBackend::new(&sdk_config))));

        let (engine, outbound_rx) = TranslationEngine::new(
            asr,
            translator,
            tts,
            Arc::clone(&registry) as Arc<dyn PartnerDirectory>,
            pipeline_config,
        );

        tokio::spawn(crate::ws::dispatcher::run(
            Arc::clone(&registry),
            outbound_rx,
        ));

        Ok(Self {
            settings,
            store,
            registry,
            engine,
        })
    }
}
