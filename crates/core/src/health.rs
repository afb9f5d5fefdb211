//! Health check types shared across ShopGraph services
//!
//! Each subsystem exposes a probe that produces a [`ComponentHealth`];
//! services aggregate those into an [`AggregatedHealth`]. The platform
//! keeps serving while degraded: a dependency outage empties the affected
//! recommendation sources instead of failing requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All systems operational
    Healthy,
    /// Some dependencies failing; serving with reduced sources
    Degraded,
    /// Every dependency failing
    Unhealthy,
}

impl HealthStatus {
    /// Whether the service should keep accepting traffic
    pub fn is_ready(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Component name ("graph", "vector", "broker")
    pub name: String,
    pub status: HealthStatus,
    /// Optional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Component-specific detail (queue depths, point counts, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ComponentHealth {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            error: None,
            detail: None,
        }
    }

    pub fn unhealthy(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            error: Some(error.into()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Aggregated health status for a service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedHealth {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

impl AggregatedHealth {
    /// Aggregate component probes: healthy only when every component is,
    /// unhealthy only when none is, degraded otherwise.
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let healthy = components
            .iter()
            .filter(|c| c.status == HealthStatus::Healthy)
            .count();
        let status = if healthy == components.len() {
            HealthStatus::Healthy
        } else if healthy == 0 && !components.is_empty() {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            components,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_healthy() {
        let health = AggregatedHealth::from_components(vec![
            ComponentHealth::healthy("graph"),
            ComponentHealth::healthy("vector"),
        ]);
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.status.is_ready());
    }

    #[test]
    fn test_partial_outage_is_degraded() {
        let health = AggregatedHealth::from_components(vec![
            ComponentHealth::healthy("graph"),
            ComponentHealth::unhealthy("vector", "connection refused"),
        ]);
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health.status.is_ready());
    }

    #[test]
    fn test_total_outage_is_unhealthy() {
        let health = AggregatedHealth::from_components(vec![
            ComponentHealth::unhealthy("graph", "down"),
            ComponentHealth::unhealthy("vector", "down"),
        ]);
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert!(!health.status.is_ready());
    }

    #[test]
    fn test_serialization_uses_lowercase_status() {
        let health = AggregatedHealth::from_components(vec![ComponentHealth::healthy("broker")
            .with_detail(serde_json::json!({"queues": {"events.graph": {"messages": 0}}}))]);
        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["components"][0]["name"], "broker");
    }
}
