// Copyright (c) 2023 The Cocoon Authors

use crate::container::{ContainerRuntime, ContainerStats};
use crate::events::{LifecycleEvent, TaskHandle};
use cocoon_models::cocoon::ResourceUsage;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

/// Samples the disk and network usage of the cocoon container
#[derive(Clone)]
pub struct Monitor {
    runtime: Box<dyn ContainerRuntime>,
    interval: Duration,
    disk_limit: u64,
    last: Arc<Mutex<ContainerStats>>,
}

impl Monitor {
    /// Monitor of containers of `runtime`, sampled every `interval`
    pub fn new(runtime: Box<dyn ContainerRuntime>, interval: Duration, disk_limit: u64) -> Self {
        Monitor {
            runtime,
            interval,
            disk_limit,
            last: Default::default(),
        }
    }

    /// Latest sample
    pub fn last_report(&self) -> ContainerStats {
        *self.last.lock()
    }

    /// Disk limit in bytes
    pub fn disk_limit(&self) -> u64 {
        self.disk_limit
    }

    /// Samples `container_id` until stopped. Exceeding the disk limit sends
    /// [`LifecycleEvent::DiskLimitExceeded`] and ends the task.
    pub fn start(&self, container_id: &str, events: mpsc::UnboundedSender<LifecycleEvent>) -> TaskHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let monitor = self.clone();
        let container_id = container_id.to_string();
        let join = tokio::spawn(async move {
            let mut ticker = interval(monitor.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("monitor started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut stop_rx => break,
                }
                let stats = match monitor.runtime.stats(&container_id).await {
                    Ok(stats) => stats,
                    Err(err) => {
                        error!("monitor: {}", err);
                        continue;
                    }
                };
                debug!("monitor report: {:?}", stats);
                *monitor.last.lock() = stats;
                if monitor.disk_limit > 0 && stats.disk_usage > monitor.disk_limit {
                    let _ = events.send(LifecycleEvent::DiskLimitExceeded {
                        usage: stats.disk_usage,
                        limit: monitor.disk_limit,
                    });
                    break;
                }
            }
            info!("monitor stopped");
        });
        TaskHandle::new(stop_tx, join)
    }
}

/// Adds the latest network counters of a run to the usage stored on the cocoon.
///
/// Counters restart from zero with a new container: a sample lower than the
/// stored value is added to it, a higher one replaces it.
pub fn accumulate_net_usage(stored: ResourceUsage, sample: ContainerStats) -> ResourceUsage {
    let merge = |stored: u64, latest: u64| {
        if latest < stored {
            stored.saturating_add(latest)
        } else {
            latest
        }
    };
    ResourceUsage {
        net_in: merge(stored.net_in, sample.net_rx),
        net_out: merge(stored.net_out, sample.net_tx),
    }
}
