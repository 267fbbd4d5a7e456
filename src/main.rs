use anyhow::Result;
use procstats::*;
use tokio::sync::{mpsc, oneshot};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;
    if app_config.worker.suppress_console {
        tracing::info!("Running in silent mode");
    }

    let history = log_history::LogHistory::generate(&app_config.analytics.logs_dir);
    let aggregator = aggregator::Aggregator::new(
        app_config.aggregator_config(),
        history,
        Box::new(statistics::StdNoise::from_os_rng()),
        chrono::Local::now(),
    )?;
    let query = aggregator.query();

    let (packet_tx, packet_rx) = mpsc::channel(aggregator::PACKET_CHANNEL_CAPACITY);
    let launcher = supervisor::ProcessLauncher {
        command: app_config.worker.command.clone(),
        args: app_config.worker.args.clone(),
    };
    let mut supervisor =
        supervisor::Supervisor::new(app_config.supervisor_config(), launcher, packet_tx);
    supervisor
        .spawn_worker()
        .map_err(|e| anyhow::anyhow!("worker spawn: {}", e))?;
    let supervisor_handle = supervisor.handle();

    let (aggregator_shutdown_tx, aggregator_shutdown_rx) = oneshot::channel();
    let (supervisor_shutdown_tx, supervisor_shutdown_rx) = oneshot::channel();
    let aggregator_task = aggregator::spawn(aggregator, packet_rx, aggregator_shutdown_rx);
    let supervisor_task = supervisor::spawn(supervisor, supervisor_shutdown_rx);

    let app = routes::app(query, supervisor_handle, app_config.api.clone());
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("Received shutdown signal");
            let _ = supervisor_shutdown_tx.send(());
            let _ = aggregator_shutdown_tx.send(());
            let _ = supervisor_task.await;
            let _ = aggregator_task.await;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
