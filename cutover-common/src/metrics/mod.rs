use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest observed metrics for a migration run.
/// ---
/// Overwritten in place by `merge`; the tracker persists successive
/// snapshots as part of the run document if history is required.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_data_migrated_bytes: u64,
    pub migration_speed_bps: f64,
    pub error_rate_pct: f64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub average_operation_time_ms: f64,
    pub resource_utilization: ResourceUtilization,
    pub cost_metrics: CostMetrics,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ResourceUtilization {
    pub cpu_pct: f64,
    pub memory_pct: f64,
    pub network_bps: f64,
    pub storage_bytes: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CostMetrics {
    pub estimated_usd: f64,
    pub actual_usd: f64,
    pub per_gb_usd: f64,
}

/// Partial metrics update, merged last-write-wins per field.
/// ---
/// Nested objects merge shallowly: a provided nested struct replaces
/// the stored one wholesale.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MetricsUpdate {
    pub total_data_migrated_bytes: Option<u64>,
    pub migration_speed_bps: Option<f64>,
    pub error_rate_pct: Option<f64>,
    pub successful_operations: Option<u64>,
    pub failed_operations: Option<u64>,
    pub average_operation_time_ms: Option<f64>,
    pub resource_utilization: Option<ResourceUtilization>,
    pub cost_metrics: Option<CostMetrics>,
}

impl MetricsSnapshot {
    pub fn merge(&mut self, update: MetricsUpdate) {
        if let Some(v) = update.total_data_migrated_bytes {
            self.total_data_migrated_bytes = v;
        }
        if let Some(v) = update.migration_speed_bps {
            self.migration_speed_bps = v;
        }
        if let Some(v) = update.error_rate_pct {
            self.error_rate_pct = v;
        }
        if let Some(v) = update.successful_operations {
            self.successful_operations = v;
        }
        if let Some(v) = update.failed_operations {
            self.failed_operations = v;
        }
        if let Some(v) = update.average_operation_time_ms {
            self.average_operation_time_ms = v;
        }
        if let Some(v) = update.resource_utilization {
            self.resource_utilization = v;
        }
        if let Some(v) = update.cost_metrics {
            self.cost_metrics = v;
        }
        self.updated_at = Some(Utc::now());
    }
}
