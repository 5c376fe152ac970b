//! History Store
//!
//! Newest-first, capacity-bounded list of finalized calls. The in-memory copy
//! is authoritative for the process lifetime; every append is followed by a
//! durable write through the [`KeyValueStore`] capability.

use super::kv::{Entries, KeyValueStore};
use super::query::{HistoryQuery, HistorySummary};
use super::record::CallRecord;
use crate::error::{FormatError, StoreError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Storage key of the persisted history array.
pub const HISTORY_KEY: &str = "callHistory";

/// Store handle shared between the tracker (single writer) and readers.
pub type SharedHistory = Arc<RwLock<HistoryStore>>;

pub struct HistoryStore {
    records: VecDeque<CallRecord>,
    capacity: usize,
    backend: Arc<dyn KeyValueStore>,
}

impl HistoryStore {
    /// Empty store; nothing is read from the backend.
    pub fn new(backend: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            backend,
        }
    }

    /// Store initialized from persisted state.
    ///
    /// A backend read failure or malformed entries are logged and skipped;
    /// capture must be able to start regardless.
    pub async fn load(backend: Arc<dyn KeyValueStore>, capacity: usize) -> Self {
        let mut store = Self::new(backend, capacity);

        match store.backend.get(&[HISTORY_KEY]).await {
            Ok(entries) => {
                if let Some(Value::Array(items)) = entries.get(HISTORY_KEY) {
                    let valid = items.iter().filter_map(|item| {
                        serde_json::from_value::<CallRecord>(item.clone())
                            .map_err(|e| log::warn!("Skipping malformed history entry: {}", e))
                            .ok()
                    });
                    store.records.extend(valid.take(store.capacity));
                }
                log::info!("Loaded {} call(s) from history", store.records.len());
            }
            Err(e) => log::warn!("Could not load call history, starting empty: {}", e),
        }

        store
    }

    pub fn into_shared(self) -> SharedHistory {
        Arc::new(RwLock::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Front-inserts `record`, evicting the oldest beyond capacity, then persists.
    ///
    /// On a persistence error the record stays in memory and the error is
    /// returned for the caller to log.
    pub async fn append(&mut self, record: CallRecord) -> Result<(), StoreError> {
        self.records.push_front(record);
        while self.records.len() > self.capacity {
            if let Some(evicted) = self.records.pop_back() {
                log::debug!("Evicted call from {} out of history", evicted.completed_at);
            }
        }
        self.persist().await
    }

    async fn persist(&self) -> Result<(), StoreError> {
        let history = serde_json::to_value(&self.records)?;
        let mut entries = Entries::new();
        entries.insert(HISTORY_KEY.to_string(), history);
        self.backend.set(entries).await
    }

    /// All records, newest first.
    pub fn all(&self) -> Vec<CallRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn most_recent(&self) -> Option<&CallRecord> {
        self.records.front()
    }

    pub fn get(&self, index: usize) -> Option<&CallRecord> {
        self.records.get(index)
    }

    pub fn recent(&self, limit: usize) -> Vec<CallRecord> {
        self.records.iter().take(limit).cloned().collect()
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<CallRecord>
    where
        P: Fn(&CallRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|record| predicate(record))
            .cloned()
            .collect()
    }

    pub fn search(&self, query: &HistoryQuery) -> Vec<CallRecord> {
        let mut found = self.filter(|record| query.matches(record));
        if let Some(limit) = query.limit {
            found.truncate(limit);
        }
        found
    }

    /// Totals for the popup; `today_start` is the local midnight in UTC.
    pub fn summary(&self, today_start: DateTime<Utc>) -> HistorySummary {
        let today_ms = today_start.timestamp_millis();
        // unparseable durations are left out of the average entirely
        let (timed, total_secs) = self
            .records
            .iter()
            .filter_map(|r| r.duration_secs())
            .fold((0u64, 0u64), |(count, sum), secs| (count + 1, sum + secs));
        let total = self.records.len();

        HistorySummary {
            total,
            today: self
                .records
                .iter()
                .filter(|r| r.timestamp >= today_ms)
                .count(),
            average_duration_secs: if timed == 0 { 0 } else { total_secs / timed },
        }
    }

    /// CSV export, newest first.
    pub fn to_csv(&self) -> Result<String, FormatError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["phone", "duration", "region", "completed_at", "source"])?;
        for record in &self.records {
            let source = match record.source {
                crate::capture::duration::DurationSource::FromInterface => "fromInterface",
                crate::capture::duration::DurationSource::Computed => "computed",
            };
            writer.write_record([
                record.phone.as_str(),
                record.duration.as_str(),
                record.region.as_str(),
                record.completed_at.as_str(),
                source,
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| FormatError::Csv(csv::Error::from(e.into_error())))?;
        String::from_utf8(bytes).map_err(|_| FormatError::Utf8)
    }
}
