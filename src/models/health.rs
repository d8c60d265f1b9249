use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::status::QueuePollerStatus;

/// Ordered from best to worst, so the overall status is the maximum of the checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HashMap<String, ComponentHealth>,
    pub pollers: Vec<QueuePollerStatus>,
}

/// Result of probing one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ComponentHealth {
    pub fn up(response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Healthy,
            response_time_ms: Some(response_time_ms),
            detail: None,
        }
    }

    pub fn down(detail: impl Into<String>) -> Self {
        Self::impaired(HealthStatus::Unhealthy, detail)
    }

    pub fn degraded(detail: impl Into<String>) -> Self {
        Self::impaired(HealthStatus::Degraded, detail)
    }

    fn impaired(status: HealthStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            response_time_ms: None,
            detail: Some(detail.into()),
        }
    }
}
