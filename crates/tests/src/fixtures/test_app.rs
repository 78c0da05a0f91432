use lingolive_api::{build_router, state::AppState};
use lingolive_config::{
    AppSettings, AsrSettings, AwsSettings, DatabaseSettings, PipelineSettings, Settings,
    TlsSettings,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A running test server on an ephemeral port, backed by the in-memory
/// meeting store. No recognizer credentials are configured, so ASR
/// sessions are born dead; the join/caption plumbing works regardless.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub client: reqwest::Client,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let settings = test_settings();

        let app_state = AppState::new(settings.clone())
            .await
            .expect("Failed to create AppState");
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base_url = format!("http://{}", addr);
        let client = reqwest::Client::new();

        Self {
            addr,
            base_url,
            settings,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

fn test_settings() -> Settings {
    Settings {
        app: AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        aws: AwsSettings {
            region: "us-east-1".to_string(),
        },
        database: DatabaseSettings { table_name: None },
        asr: AsrSettings {
            provider: "deepgram".to_string(),
            deepgram_api_key: None,
        },
        tls: TlsSettings {
            cert_path: None,
            key_path: None,
        },
        pipeline: PipelineSettings {
            partial_throttle_ms: 100,
            pre_synth_throttle_ms: 1000,
            pre_synth_min_chars: 10,
            stale_partial_ms: 5000,
            max_frame_bytes: 65_536,
            asr_max_connect_attempts: 5,
            asr_retry_initial_ms: 1000,
            asr_keepalive_secs: 8,
            asr_idle_timeout_secs: 600,
            asr_refresh_secs: 420,
        },
    }
}
