use std::time::Duration;

/// Tunables for the per-connection pipeline. The timing values are part
/// of the wire contract: they are observable as caption/audio latency.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum spacing between emitted partial captions.
    pub partial_throttle: Duration,
    /// Minimum spacing between speculative synthesis starts.
    pub pre_synth_throttle: Duration,
    /// Translated text must exceed this length before interim audio work.
    pub pre_synth_min_chars: usize,
    /// How long a partial may stay unresolved before interim audio fires.
    pub stale_partial_after: Duration,
    /// Client audio frames above this size are dropped.
    pub max_frame_bytes: usize,
    /// Recognizer session behavior (FIFO depth, retries, keep-alive).
    pub asr: crate::asr::AsrSessionConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            partial_throttle: Duration::from_millis(100),
            pre_synth_throttle: Duration::from_millis(1000),
            pre_synth_min_chars: 10,
            stale_partial_after: Duration::from_millis(5000),
            max_frame_bytes: 65_536,
            asr: crate::asr::AsrSessionConfig::default(),
        }
    }
}
