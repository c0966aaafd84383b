//! Fire-and-continue alerting.
//!
//! Alerts are observability signals, never control flow: a sink that fails
//! to deliver logs the failure and nothing else. Tasks await `notify` but
//! can never be failed by it.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone)]
pub enum AlertKind {
    LockFailed { market: Address },
    SettleFailed { market: Address },
    HighGasPrice { suggested: u128, ceiling: u128 },
}

impl AlertKind {
    fn event(&self) -> &'static str {
        match self {
            AlertKind::LockFailed { .. } => "lock_failed",
            AlertKind::SettleFailed { .. } => "settle_failed",
            AlertKind::HighGasPrice { .. } => "high_gas_price",
        }
    }
}

/// A severity-tagged alert event with a correlation id.
#[derive(Debug, Clone)]
pub struct Alert {
    pub id: Uuid,
    pub severity: Severity,
    pub kind: AlertKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    fn new(severity: Severity, kind: AlertKind, message: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            kind,
            message,
            raised_at: Utc::now(),
        }
    }

    pub fn lock_failed(market: Address, err: &anyhow::Error) -> Self {
        Self::new(
            Severity::Critical,
            AlertKind::LockFailed { market },
            format!("failed to lock market {market}: {err:#}"),
        )
    }

    pub fn settle_failed(market: Address, err: &anyhow::Error) -> Self {
        Self::new(
            Severity::Critical,
            AlertKind::SettleFailed { market },
            format!("failed to settle market {market}: {err:#}"),
        )
    }

    pub fn high_gas_price(suggested: u128, ceiling: u128) -> Self {
        Self::new(
            Severity::Warning,
            AlertKind::HighGasPrice { suggested, ceiling },
            format!("suggested gas price {suggested} wei exceeds ceiling {ceiling} wei"),
        )
    }
}

/// Delivery seam for alerts. Implementations must swallow their own errors.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert) -> BoxFuture<'_, ()>;
}

/// Sink that only writes alerts to the log stream.
pub struct LogAlerter;

impl AlertSink for LogAlerter {
    fn notify(&self, alert: Alert) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            info!(
                "🔔 alert [{}] {} id={} — {}",
                alert.severity.as_str(),
                alert.kind.event(),
                alert.id,
                alert.message,
            );
        })
    }
}

/// Sink that POSTs alerts as JSON to a webhook endpoint.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlerter {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

impl AlertSink for WebhookAlerter {
    fn notify(&self, alert: Alert) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let body = json!({
                "id": alert.id.to_string(),
                "severity": alert.severity.as_str(),
                "event": alert.kind.event(),
                "message": alert.message,
                "raisedAt": alert.raised_at.to_rfc3339(),
            });

            let sent = self.client.post(&self.url).json(&body).send().await;
            match sent {
                Ok(resp) if resp.status().is_success() => {}
                Ok(resp) => {
                    warn!(
                        "🔔 alert webhook rejected {} (status {}) — continuing",
                        alert.id,
                        resp.status(),
                    );
                }
                Err(err) => {
                    warn!("🔔 alert webhook delivery failed for {}: {err:?} — continuing", alert.id);
                }
            }
        })
    }
}
