pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod format;
pub mod history;
pub mod relay;

//  Re-export commonly used items
pub use browser::{
    ChromeDriver, ChromeFormPage, ChromeHostPage, ChromeSession, ConnectionMode, FormPage,
    HostPage,
};
pub use capture::{
    compute_elapsed, is_plausible_interface_duration, AgentStatusSample, CallCaptureMachine,
    CallSnapshot, CallTracker, CapturePhase, CaptureStats, DurationReconciler, DurationSource,
    HostDocument, Probe, SnapshotExtractor, StatusSampler, TrackerStatus, Transition,
};
pub use config::Settings;
pub use error::{BrowserError, FormatError, StoreError};
pub use format::{InsertMode, InsertionFormatter};
pub use history::{
    CallRecord, HistoryQuery, HistoryStore, HistorySummary, JsonFileStore, KeyValueStore,
    MemoryStore, SharedHistory,
};
pub use relay::{RelayResponse, RelayState};
