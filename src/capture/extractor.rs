//! Call Snapshot Extractor
//!
//! Reads phone, duration and region from the host document through ordered
//! strategy lists. The lists are the adaptation point when the agent desktop
//! ships new markup.

use super::probe::{HostDocument, Probe};
use crate::config::SelectorSettings;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One way of locating a field's text in the host document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldStrategy {
    /// Trimmed text of the first element matching a CSS selector.
    Selector(String),
    /// First leaf element whose entire text is `HH:MM:SS`.
    ClockScan,
}

impl FieldStrategy {
    pub fn selector(css: impl Into<String>) -> Self {
        FieldStrategy::Selector(css.into())
    }

    pub fn apply(&self, doc: &HostDocument) -> Option<String> {
        match self {
            FieldStrategy::Selector(css) => doc.text(css).map(str::to_string),
            FieldStrategy::ClockScan => doc.clock_texts.first().cloned(),
        }
    }

    fn add_to(&self, probe: Probe) -> Probe {
        match self {
            FieldStrategy::Selector(css) => probe.with_selector(css.clone()),
            FieldStrategy::ClockScan => probe.with_clock_scan(),
        }
    }
}

/// First non-empty result of `strategies`, tried in order.
pub fn first_match(strategies: &[FieldStrategy], doc: &HostDocument) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy.apply(doc))
}

pub(crate) fn probe_for(strategies: &[FieldStrategy]) -> Probe {
    strategies
        .iter()
        .fold(Probe::new(), |probe, strategy| strategy.add_to(probe))
}

/// Call metadata as visible on the host page at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSnapshot {
    pub phone: Option<String>,
    pub duration_text: Option<String>,
    pub region: Option<String>,
    pub sampled_at: DateTime<Utc>,
}

impl CallSnapshot {
    pub fn empty(sampled_at: DateTime<Utc>) -> Self {
        Self {
            phone: None,
            duration_text: None,
            region: None,
            sampled_at,
        }
    }

    /// Overlays the fields present in `newer`; absent fields keep their last value.
    pub fn merge(&mut self, newer: CallSnapshot) {
        if newer.phone.is_some() {
            self.phone = newer.phone;
        }
        if newer.duration_text.is_some() {
            self.duration_text = newer.duration_text;
        }
        if newer.region.is_some() {
            self.region = newer.region;
        }
        self.sampled_at = newer.sampled_at;
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotExtractor {
    phone: Vec<FieldStrategy>,
    duration: Vec<FieldStrategy>,
    region: Vec<FieldStrategy>,
    phone_digits_only: bool,
}

impl Default for SnapshotExtractor {
    fn default() -> Self {
        Self::from_settings(&SelectorSettings::default())
    }
}

impl SnapshotExtractor {
    pub fn new(
        phone: Vec<FieldStrategy>,
        duration: Vec<FieldStrategy>,
        region: Vec<FieldStrategy>,
    ) -> Self {
        Self {
            phone,
            duration,
            region,
            phone_digits_only: false,
        }
    }

    pub fn from_settings(settings: &SelectorSettings) -> Self {
        let selectors =
            |list: &[String]| list.iter().map(FieldStrategy::selector).collect::<Vec<_>>();

        let mut duration = selectors(&settings.duration);
        if settings.duration_clock_scan {
            duration.push(FieldStrategy::ClockScan);
        }

        Self {
            phone: selectors(&settings.phone),
            duration,
            region: selectors(&settings.region),
            phone_digits_only: settings.phone_digits_only,
        }
    }

    /// Keep only digits (and a leading `+`) in extracted phone numbers.
    pub fn with_phone_digits_only(mut self, enabled: bool) -> Self {
        self.phone_digits_only = enabled;
        self
    }

    /// Everything the page must report for [`extract`](Self::extract).
    pub fn probe(&self) -> Probe {
        probe_for(&self.phone)
            .merge(&probe_for(&self.duration))
            .merge(&probe_for(&self.region))
    }

    /// Builds a snapshot; each field is `None` when all its strategies miss.
    pub fn extract(&self, doc: &HostDocument, sampled_at: DateTime<Utc>) -> CallSnapshot {
        let phone = first_match(&self.phone, doc).and_then(|raw| {
            if self.phone_digits_only {
                normalize_phone(&raw)
            } else {
                Some(raw)
            }
        });

        CallSnapshot {
            phone,
            duration_text: first_match(&self.duration, doc),
            region: first_match(&self.region, doc),
            sampled_at,
        }
    }
}

/// Strips everything but digits, keeping a leading `+`. Empty results are a miss.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if trimmed.starts_with('+') {
        Some(format!("+{}", digits))
    } else {
        Some(digits)
    }
}
