use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::gateway::QueueGateway,
    models::{
        health::{ComponentHealth, HealthCheckResponse, HealthStatus},
        status::{PollerState, QueuePollerStatus},
    },
    services::{correlation::InstructionRepository, poller::QueueStateRegistry},
};

pub const DATABASE_CHECK: &str = "database";
pub const BROKER_CHECK: &str = "message_broker";
pub const POLLERS_CHECK: &str = "status_pollers";

/// Probes the instruction store, the broker and the status pollers.
pub struct HealthChecker {
    repository: Arc<dyn InstructionRepository>,
    gateway: Arc<dyn QueueGateway>,
    registry: Arc<QueueStateRegistry>,
}

impl HealthChecker {
    pub fn new(
        repository: Arc<dyn InstructionRepository>,
        gateway: Arc<dyn QueueGateway>,
        registry: Arc<QueueStateRegistry>,
    ) -> Self {
        Self {
            repository,
            gateway,
            registry,
        }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let pollers = self.registry.snapshot();

        let checks = HashMap::from([
            (DATABASE_CHECK.to_string(), self.probe_repository().await),
            (BROKER_CHECK.to_string(), self.probe_broker().await),
            (POLLERS_CHECK.to_string(), pollers_health(&pollers)),
        ]);

        HealthCheckResponse {
            status: overall_status(&checks),
            timestamp: Utc::now(),
            checks,
            pollers,
        }
    }

    async fn probe_repository(&self) -> ComponentHealth {
        let start = Instant::now();

        match self.repository.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Instruction store reachable");
                ComponentHealth::up(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Instruction store health check failed");
                ComponentHealth::down(format!("Instruction store unreachable: {}", e))
            }
        }
    }

    async fn probe_broker(&self) -> ComponentHealth {
        let start = Instant::now();

        if self.gateway.is_healthy().await {
            ComponentHealth::up(start.elapsed().as_millis() as u64)
        } else {
            warn!("Message broker connection is not open");
            ComponentHealth::down("Broker connection closed")
        }
    }
}

fn pollers_health(pollers: &[QueuePollerStatus]) -> ComponentHealth {
    let stopped: Vec<&str> = pollers
        .iter()
        .filter(|poller| poller.enabled && poller.state == PollerState::Stopped)
        .map(|poller| poller.queue_name.as_str())
        .collect();

    if stopped.is_empty() {
        ComponentHealth::up(0)
    } else {
        ComponentHealth::degraded(format!("Stopped status queues: {}", stopped.join(", ")))
    }
}

/// The worst status among the checks; healthy when there are none.
pub fn overall_status(checks: &HashMap<String, ComponentHealth>) -> HealthStatus {
    checks
        .values()
        .map(|check| check.status)
        .max()
        .unwrap_or(HealthStatus::Healthy)
}
