pub mod kv;
pub mod query;
pub mod record;
pub mod store;

pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};
pub use query::{HistoryQuery, HistorySummary};
pub use record::{CallRecord, UNKNOWN_PHONE, UNSPECIFIED_REGION};
pub use store::{HistoryStore, SharedHistory, HISTORY_KEY};
