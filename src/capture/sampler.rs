//! Status Sampler

use super::extractor::{first_match, probe_for, FieldStrategy};
use super::probe::{HostDocument, Probe};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Agent status label read at one instant. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatusSample {
    pub status: String,
    pub sampled_at: DateTime<Utc>,
}

impl AgentStatusSample {
    pub fn new(status: impl Into<String>, sampled_at: DateTime<Utc>) -> Self {
        Self {
            status: status.into(),
            sampled_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StatusSampler {
    strategies: Vec<FieldStrategy>,
}

impl StatusSampler {
    pub fn new(selectors: &[String]) -> Self {
        Self {
            strategies: selectors.iter().map(FieldStrategy::selector).collect(),
        }
    }

    pub fn probe(&self) -> Probe {
        probe_for(&self.strategies)
    }

    /// `None` when no status element could be located on this read.
    pub fn sample(&self, doc: &HostDocument, now: DateTime<Utc>) -> Option<AgentStatusSample> {
        first_match(&self.strategies, doc).map(|status| AgentStatusSample::new(status, now))
    }
}
