use std::{sync::Arc, time::Duration};

use robloxstudio_mcp::{
    bridge::BridgeService,
    build_app,
    config::Config,
    logging,
    mcp::{stdio, McpState},
    scheduler::{run_scheduler, SchedulerConfig},
    AppState,
};
use tokio::{io::BufReader, runtime::Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// `tokio::io::stdin` reads on a blocking thread that cannot be interrupted, so
// teardown must not wait for it after an interrupt with stdin still open.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run());
    shutdown_runtime(runtime);
    result
}

fn shutdown_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bridge = Arc::new(BridgeService::new(config.request_timeout));
    let listener = tokio::net::TcpListener::bind(config.bind_target()).await?;
    bridge.mark_transport_listening().await;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        request_timeout_secs = config.request_timeout.as_secs(),
        "HTTP server listening for Studio plugin"
    );

    let shutdown = CancellationToken::new();
    let app = build_app(AppState::new(bridge.clone()));
    let http_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }
    });

    let scheduler_task = tokio::spawn(run_scheduler(
        bridge.clone(),
        SchedulerConfig {
            status_interval: config.status_interval,
            sweep_interval: config.sweep_interval,
            plugin_idle_timeout: config.plugin_idle_timeout,
        },
        shutdown.clone(),
    ));

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received");
                shutdown.cancel();
            }
        }
    });

    let mcp_state = McpState::new(bridge.clone());
    bridge.mark_tool_protocol_active().await;
    info!("Roblox Studio MCP server running on stdio");

    let served = stdio::serve(
        mcp_state,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    let cancelled = bridge.cancel_all("server shutting down").await;
    info!(cancelled, "shutting down");

    let writer_task = served?;
    if let Err(err) = writer_task.await? {
        warn!(error = %err, "stdout writer stopped with an error");
    }
    scheduler_task.await?;
    http_task.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{
        sync::mpsc,
        time::{Duration, Instant},
    };

    use super::shutdown_runtime;

    #[test]
    fn shutdown_does_not_wait_for_a_stuck_blocking_read() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let (stdin_open, stdin_reader) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel::<()>();
        runtime.spawn_blocking(move || {
            let _ = started_tx.send(());
            // Stands in for a read on stdin that never sees EOF.
            let _ = stdin_reader.recv();
        });
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("blocking task should start");

        let started = Instant::now();
        shutdown_runtime(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));

        drop(stdin_open);
    }
}
