//! TTL heartbeat scheduler
//!
//! Services registered with a TTL check must report in before the TTL
//! expires. The scheduler keeps one background task per service that marks
//! the service check as passing on a fixed interval.

use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use sidecar_consul_client::ConsulClient;

pub struct TtlScheduler {
    client: ConsulClient,
    interval: Duration,
    heartbeats: DashMap<String, JoinHandle<()>>,
}

impl TtlScheduler {
    pub fn new(client: ConsulClient, interval: Duration) -> Self {
        Self {
            client,
            interval,
            heartbeats: DashMap::new(),
        }
    }

    /// Start heartbeats for a service, replacing any existing schedule
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, instance_id: &str) {
        let client = self.client.clone();
        let interval = self.interval;
        let check_id = format!("service:{}", instance_id);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match client.agent_check_pass(&check_id, None).await {
                    Ok(()) => debug!(check_id = %check_id, "Sent TTL heartbeat"),
                    Err(e) => warn!(check_id = %check_id, "Failed to send TTL heartbeat: {}", e),
                }
            }
        });

        if let Some(previous) = self.heartbeats.insert(instance_id.to_string(), handle) {
            previous.abort();
        }
        info!(
            instance_id,
            interval = ?self.interval,
            "Scheduled TTL heartbeat"
        );
    }

    /// Stop heartbeats for a service
    pub fn remove(&self, instance_id: &str) {
        if let Some((_, handle)) = self.heartbeats.remove(instance_id) {
            handle.abort();
            info!(instance_id, "Stopped TTL heartbeat");
        }
    }

    pub fn is_scheduled(&self, instance_id: &str) -> bool {
        self.heartbeats.contains_key(instance_id)
    }

    pub fn len(&self) -> usize {
        self.heartbeats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heartbeats.is_empty()
    }
}

impl Drop for TtlScheduler {
    fn drop(&mut self) {
        for entry in self.heartbeats.iter() {
            entry.value().abort();
        }
    }
}
