use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::{error, info, warn};

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
}

/// One operator-facing notification, append-only for the life of a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub message: String,
    pub phase_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, message: impl Into<String>, phase_id: Option<&str>) -> Self {
        Self {
            severity,
            message: message.into(),
            phase_id: phase_id.map(str::to_string),
            timestamp: Utc::now(),
        }
    }
}

/// Notification channel for alerts emitted by the progress tracker.
/// ---
/// Implementations must not block; the tracker calls `notify` outside
/// of its state lock but on the caller's thread.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Default sink writing alerts through `tracing` at the mapped level.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &Alert) {
        let phase = alert.phase_id.as_deref().unwrap_or("-");
        match alert.severity {
            AlertSeverity::Info => info!(phase_id = phase, "{}", alert.message),
            AlertSeverity::Warning => warn!(phase_id = phase, "{}", alert.message),
            AlertSeverity::Error => error!(phase_id = phase, "{}", alert.message),
        }
    }
}
