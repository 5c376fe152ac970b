use super::record::CallRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Popup-style history search. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Substring of the phone number.
    pub phone: Option<String>,
    /// Exact region, case-insensitive.
    pub region: Option<String>,
    /// Inclusive lower bound on the finalization time.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the finalization time.
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn matches(&self, record: &CallRecord) -> bool {
        if let Some(phone) = self.phone.as_deref().filter(|p| !p.is_empty()) {
            if !record.phone.contains(phone) {
                return false;
            }
        }
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            if record.region.to_lowercase() != region.to_lowercase() {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.timestamp < from.timestamp_millis() {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.timestamp > to.timestamp_millis() {
                return false;
            }
        }
        true
    }
}

/// Aggregates shown on the popup's statistics tab.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total: usize,
    pub today: usize,
    pub average_duration_secs: u64,
}
