use crate::capture::duration::DurationSource;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Phone value for calls where no participant number was ever visible.
pub const UNKNOWN_PHONE: &str = "unknown";

/// Region value for calls where the account variable was never visible.
pub const UNSPECIFIED_REGION: &str = "unspecified";

/// One finalized call, as persisted under the `callHistory` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub phone: String,

    /// `HH:MM:SS`
    pub duration: String,

    pub region: String,

    /// Finalization instant, epoch milliseconds.
    pub timestamp: i64,

    pub source: DurationSource,

    /// Finalization instant, RFC 3339.
    pub completed_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_start_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_end_time: Option<i64>,

    /// Self-timed duration, kept even when the interface value won.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculated_duration: Option<String>,
}

impl CallRecord {
    /// Builds a record finalized at `at`, applying the sentinel fallbacks.
    pub fn new(
        phone: Option<String>,
        region: Option<String>,
        duration: String,
        source: DurationSource,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            phone: phone.unwrap_or_else(|| UNKNOWN_PHONE.to_string()),
            duration,
            region: region.unwrap_or_else(|| UNSPECIFIED_REGION.to_string()),
            timestamp: at.timestamp_millis(),
            source,
            completed_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            call_start_time: None,
            call_end_time: None,
            calculated_duration: None,
        }
    }

    pub fn with_call_window(
        mut self,
        started_at: DateTime<Utc>,
        ended_at: Option<DateTime<Utc>>,
        calculated_duration: Option<String>,
    ) -> Self {
        self.call_start_time = Some(started_at.timestamp_millis());
        self.call_end_time = ended_at.map(|t| t.timestamp_millis());
        self.calculated_duration = calculated_duration;
        self
    }

    /// Duration in seconds, when the stored text is a valid clock.
    pub fn duration_secs(&self) -> Option<u64> {
        crate::capture::duration::parse_clock(&self.duration)
    }
}
