use std::net::SocketAddr;

use lingolive_api::{build_router, state::AppState};
use lingolive_config::Settings;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "lingolive_api=debug,lingolive_translation=debug,lingolive_db=debug,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;
    info!(
        "Starting LingoLive API on {}:{}",
        settings.app.host, settings.app.port
    );

    let app_state = AppState::new(settings.clone()).await?;
    let app = build_router(app_state);

    // Optional parallel TLS listener when cert material is configured.
    if let (Some(cert), Some(key)) = (&settings.tls.cert_path, &settings.tls.key_path) {
        let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
        let tls_app = app.clone();
        let tls_addr = SocketAddr::from(([0, 0, 0, 0], 443));
        info!("TLS listener on {}", tls_addr);
        tokio::spawn(async move {
            if let Err(e) = axum_server::bind_rustls(tls_addr, tls_config)
                .serve(tls_app.into_make_service())
                .await
            {
                error!(%e, "TLS listener failed");
            }
        });
    }

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
