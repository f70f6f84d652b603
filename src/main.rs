use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use live_room_monitor::config::Settings;
use live_room_monitor::context::MonitorContext;
use live_room_monitor::credential::{
    AnonymousCredentialProvider, CredentialProvider, JwtCredentialProvider,
};
use live_room_monitor::directory::StaticRoomDirectory;
use live_room_monitor::player::PlayerFactory;
use live_room_monitor::server::{create_app, AppState};
use live_room_monitor::telemetry::init_tracing;
use live_room_monitor::transport::LOOPBACK_TYPE;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;
    init_tracing(&settings.logging)?;
    tracing::info!("Configuration loaded");

    let factory = Arc::new(PlayerFactory::with_defaults());
    if settings.directory.rooms.is_empty() {
        tracing::warn!("No rooms configured under directory.rooms; the window will stay empty");
    }
    let directory = Arc::new(StaticRoomDirectory::new(settings.directory.rooms.clone()));
    let credentials = credential_provider(&settings);

    let context = Arc::new(
        MonitorContext::init(settings.clone(), factory, directory, credentials).await?,
    );
    context.health().on_report(|report| {
        tracing::info!(
            healthy = report.healthy,
            issues = report.issues.len(),
            total = report.stats.total,
            connected = report.stats.connected,
            playing = report.stats.playing,
            "Health report"
        );
    });

    if settings.monitor.auto_start {
        match context.window().start().await {
            Ok(report) => tracing::info!(monitored = report.monitored.len(), "Initial window applied"),
            Err(e) => tracing::warn!(error = %e, "Initial window could not be applied"),
        }
    }

    let app = create_app(AppState::new(context.clone()));

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    context.shutdown("server stopped").await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Signed credentials when configured; the loopback transport also runs
/// without them
fn credential_provider(settings: &Settings) -> Arc<dyn CredentialProvider> {
    let jwt = JwtCredentialProvider::new(&settings.credential);
    if !jwt.is_configured() && settings.player.default_type == LOOPBACK_TYPE {
        tracing::warn!("Credentials not configured, issuing anonymous credentials for loopback handles");
        return Arc::new(AnonymousCredentialProvider);
    }
    Arc::new(jwt)
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
