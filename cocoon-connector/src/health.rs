// Copyright (c) 2023 The Cocoon Authors

use crate::cocoon_code::CocoonCodeClient;
use crate::config::HealthCheckConfig;
use crate::error::ConnectorError;
use crate::events::{LifecycleEvent, TaskHandle};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Periodically checks that the cocoon code answers
pub struct HealthChecker {
    client: Box<dyn CocoonCodeClient>,
    config: HealthCheckConfig,
}

impl HealthChecker {
    /// Checker calling `client`
    pub fn new(client: Box<dyn CocoonCodeClient>, config: HealthCheckConfig) -> Self {
        HealthChecker { client, config }
    }

    /// One check: up to `attempts` calls, `retry_delay` apart
    pub async fn check(&self) -> Result<(), ConnectorError> {
        let mut remaining = self.config.attempts.max(1);
        loop {
            match self.client.health_check(self.config.timeout).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    remaining -= 1;
                    warn!(
                        "health checker: check not passed ({}). Retries remaining: {}",
                        err, remaining
                    );
                    if remaining == 0 {
                        return Err(ConnectorError::HealthCheckFailed);
                    }
                    sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// Checks after the warmup, then every interval. The first failed check
    /// sends [`LifecycleEvent::CocoonDead`] and ends the task.
    pub fn start(self, events: mpsc::UnboundedSender<LifecycleEvent>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let join = tokio::spawn(async move {
            let start = Instant::now() + self.config.warmup;
            let mut ticker = interval_at(start, self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("health checker started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop_rx => break,
                }
                let res = tokio::select! {
                    res = self.check() => res,
                    _ = &mut stop_rx => break,
                };
                if let Err(err) = res {
                    error!("health checker: {}", err);
                    let _ = events.send(LifecycleEvent::CocoonDead);
                    break;
                }
            }
            info!("health checker stopped");
        });
        TaskHandle::new(stop_tx, join)
    }
}
