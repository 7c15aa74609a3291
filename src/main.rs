use clap::Parser;
use dotenvy::dotenv;
use ledger_upload_backend::config::AppConfig;
use ledger_upload_backend::infrastructure::{ledger, storage};
use ledger_upload_backend::services::pipeline::{PipelineOptions, UploadPipeline};
use ledger_upload_backend::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory for staged uploads (overrides STAGING_DIR)
    #[arg(long)]
    staging_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledger_upload_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Ledger Upload Backend...");

    let mut config = AppConfig::from_env();
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(dir) = args.staging_dir {
        config.staging_dir = dir;
    }
    info!(
        "🛡️  Limits: Max Size={}MB, Transfer Timeout={:?}, Ledger Timeout={:?}, Rollback Primary={}",
        config.max_file_size / 1024 / 1024,
        config.transfer_timeout,
        config.ledger_timeout,
        config.rollback_primary_on_failure
    );

    // 2. Ledger first: no deployment, no server
    let ledger = ledger::setup_ledger(&config.ledger).await?;

    // 3. Staging and remote stores
    let stager = storage::setup_staging(&config).await?;
    let (primary, replica) = storage::setup_remote_stores(&config);

    let pipeline = Arc::new(UploadPipeline::new(
        stager,
        primary,
        replica,
        ledger,
        PipelineOptions {
            ledger_timeout: config.ledger_timeout,
            rollback_primary_on_failure: config.rollback_primary_on_failure,
        },
    ));

    let state = AppState {
        pipeline,
        config: config.clone(),
    };

    // 4. Serve
    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Server ready at http://localhost:{}", config.port);
    info!("📖 Swagger UI: http://localhost:{}/swagger-ui", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
