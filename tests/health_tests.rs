mod common;

use std::sync::Arc;

use anyhow::Result;
use settlement_service::{
    clients::health::HealthChecker,
    config::StatusQueueConfig,
    models::health::HealthStatus,
    services::poller::QueueStateRegistry,
};

use common::harness;

fn registry() -> Arc<QueueStateRegistry> {
    Arc::new(QueueStateRegistry::new(&[
        StatusQueueConfig {
            name: "csd.status.sese".to_string(),
            enabled: true,
        },
        StatusQueueConfig {
            name: "csd.status.colr".to_string(),
            enabled: false,
        },
    ]))
}

/// Test: All dependencies up and enabled pollers running is healthy
#[tokio::test]
async fn test_healthy_when_everything_running() -> Result<()> {
    let h = harness().await;
    let checker = HealthChecker::new(h.repository.clone(), h.gateway.clone(), registry());

    let health = checker.check_all().await;

    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.pollers.len(), 2);
    assert!(health.checks.contains_key("database"));
    assert!(health.checks.contains_key("message_broker"));

    Ok(())
}

/// Test: A stopped enabled poller degrades the service
#[tokio::test]
async fn test_stopped_poller_degrades() -> Result<()> {
    let h = harness().await;
    let registry = registry();
    let checker = HealthChecker::new(h.repository.clone(), h.gateway.clone(), Arc::clone(&registry));

    registry.stop("csd.status.sese")?;

    let health = checker.check_all().await;

    assert_eq!(health.status, HealthStatus::Degraded);
    assert_eq!(
        health.checks["status_pollers"].status,
        HealthStatus::Degraded
    );

    Ok(())
}

/// Test: A lost broker connection makes the service unhealthy
#[tokio::test]
async fn test_broker_down_is_unhealthy() -> Result<()> {
    let h = harness().await;
    let checker = HealthChecker::new(h.repository.clone(), h.gateway.clone(), registry());

    h.gateway.set_healthy(false);

    let health = checker.check_all().await;

    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert!(health.checks["message_broker"].detail.is_some());

    Ok(())
}
