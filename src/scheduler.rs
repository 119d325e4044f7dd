//! Recurring background work: the status log line and the stale-request sweep.

use std::sync::Arc;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bridge::BridgeService;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub status_interval: Duration,
    pub sweep_interval: Duration,
    pub plugin_idle_timeout: Option<Duration>,
}

/// Runs both timers until `shutdown` fires.
pub async fn run_scheduler(
    bridge: Arc<BridgeService>,
    config: SchedulerConfig,
    shutdown: CancellationToken,
) {
    let mut status_tick = interval(config.status_interval);
    let mut sweep_tick = interval(config.sweep_interval);
    status_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("scheduler stopping");
                break;
            }
            _ = status_tick.tick() => log_status(&bridge).await,
            _ = sweep_tick.tick() => sweep(&bridge, config.plugin_idle_timeout).await,
        }
    }
}

async fn log_status(bridge: &BridgeService) {
    if let Some(message) = bridge.snapshot().await.waiting_message() {
        info!("{message}");
    }
}

async fn sweep(bridge: &BridgeService, plugin_idle_timeout: Option<Duration>) {
    bridge.cleanup_old_requests().await;
    if let Some(idle) = plugin_idle_timeout {
        bridge.expire_idle_remote(idle).await;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::bridge::{BridgeError, RequestSender};

    #[tokio::test(start_paused = true)]
    async fn sweep_expires_requests_and_idle_plugin() {
        let bridge = Arc::new(BridgeService::new(Duration::from_secs(10)));
        bridge.mark_tool_protocol_active().await;
        bridge.mark_remote_ready().await;
        let shutdown = CancellationToken::new();

        let caller = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.send_request("/api/place-info", json!({})).await })
        };
        let scheduler = tokio::spawn(run_scheduler(
            bridge.clone(),
            SchedulerConfig {
                status_interval: Duration::from_secs(5),
                sweep_interval: Duration::from_secs(5),
                plugin_idle_timeout: Some(Duration::from_secs(12)),
            },
            shutdown.clone(),
        ));

        let result = caller.await.expect("caller task");
        assert!(matches!(result, Err(BridgeError::Timeout { .. })));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!bridge.snapshot().await.remote_connected);

        shutdown.cancel();
        scheduler.await.expect("scheduler task");
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_stops_on_cancellation() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        run_scheduler(
            Arc::new(BridgeService::default()),
            SchedulerConfig {
                status_interval: Duration::from_secs(5),
                sweep_interval: Duration::from_secs(5),
                plugin_idle_timeout: None,
            },
            shutdown,
        )
        .await;
    }
}
