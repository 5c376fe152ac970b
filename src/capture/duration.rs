//! Duration Reconciler
//!
//! Turns call-start/call-end instants into an `HH:MM:SS` string and decides
//! whether a timer string scraped from the agent desktop can be trusted.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Seconds below which an interface timer is treated as a stale placeholder.
pub const DEFAULT_MIN_INTERFACE_SECS: u64 = 10;

/// Value emitted when neither the interface nor the computed duration exists.
pub const ZERO_DURATION: &str = "00:00:00";

static CLOCK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2}):(\d{2}):(\d{2})$").expect("static clock regex"));

/// Provenance of a finalized call duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationSource {
    /// Read from the host page's call timer.
    FromInterface,
    /// Self-timed from the observed status transitions.
    Computed,
}

/// Formats a whole number of seconds as zero-padded `HH:MM:SS`.
///
/// Hours are not wrapped, so anything past 99 hours gets a wider hour field.
pub fn format_clock(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// Elapsed time between two epoch-millisecond instants, floored to seconds.
///
/// An end before the start saturates to `00:00:00`.
pub fn compute_elapsed(start_ms: i64, end_ms: i64) -> String {
    let elapsed_ms = end_ms.saturating_sub(start_ms).max(0) as u64;
    format_clock(elapsed_ms / 1000)
}

/// [`compute_elapsed`] over chrono instants.
pub fn elapsed_between(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    compute_elapsed(start.timestamp_millis(), end.timestamp_millis())
}

/// Decodes an exact `HH:MM:SS` string into total seconds.
pub fn parse_clock(text: &str) -> Option<u64> {
    let caps = CLOCK_PATTERN.captures(text)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
    Some(field(1)? * 3600 + field(2)? * 60 + field(3)?)
}

/// Decides which duration a finalized call record carries.
#[derive(Debug, Clone, Copy)]
pub struct DurationReconciler {
    min_interface_secs: u64,
}

impl Default for DurationReconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERFACE_SECS)
    }
}

impl DurationReconciler {
    pub fn new(min_interface_secs: u64) -> Self {
        Self { min_interface_secs }
    }

    /// True iff `text` is `HH:MM:SS` and at least the configured threshold.
    pub fn is_plausible_interface_duration(&self, text: &str) -> bool {
        parse_clock(text).is_some_and(|secs| secs >= self.min_interface_secs)
    }

    /// Picks the interface value when plausible, else the computed one, else zero.
    pub fn reconcile(
        &self,
        interface: Option<&str>,
        computed: Option<&str>,
    ) -> (String, DurationSource) {
        match interface {
            Some(text) if self.is_plausible_interface_duration(text) => {
                (text.to_string(), DurationSource::FromInterface)
            }
            _ => (
                computed.unwrap_or(ZERO_DURATION).to_string(),
                DurationSource::Computed,
            ),
        }
    }
}

/// Plausibility check with the default 10 second threshold.
pub fn is_plausible_interface_duration(text: &str) -> bool {
    DurationReconciler::default().is_plausible_interface_duration(text)
}
