//! nimbusd - Nimbus Control Plane daemon
//!
//! Serves the HTTP API and runs the task worker in one process. Settings
//! come from the environment; the flags below override them.

mod http;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use nimbus_config::{QueueBackend, Settings};
use nimbus_controlplane::ControlPlane;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nimbusd")]
#[command(about = "Nimbus Control Plane daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// 待ち受けアドレス
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,

    /// 待ち受けポート
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// SQLite データベースのパス
    #[arg(long, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    /// タスクキュー (sqlite | memory | none)
    #[arg(long, env = "TASK_QUEUE")]
    queue: Option<QueueBackend>,

    /// ログを JSON で出力
    #[arg(long, env = "NIMBUS_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = &self.database {
            settings.database_path = path.clone();
        }
        if let Some(queue) = self.queue {
            settings.task_queue = queue;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut settings = Settings::from_env().context("failed to load settings")?;
    cli.apply(&mut settings);

    if settings.uses_default_jwt_secret() {
        tracing::warn!("JWT_SECRET is not set, using the development secret");
    }

    let plane = ControlPlane::from_settings(&settings).context("failed to start control plane")?;
    tracing::info!(
        database = %settings.database_path.display(),
        queue = %settings.task_queue,
        "control plane ready"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = plane.worker();
    let worker_handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    let addr = settings.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, http::router(http::AppState::new(plane)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "worker task panicked");
    }
    tracing::info!("stopped");
    Ok(())
}
