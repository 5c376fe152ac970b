pub mod duration;
pub mod extractor;
pub mod machine;
pub mod probe;
pub mod sampler;
pub mod tracker;

pub use duration::{
    compute_elapsed, is_plausible_interface_duration, DurationReconciler, DurationSource,
};
pub use extractor::{CallSnapshot, FieldStrategy, SnapshotExtractor};
pub use machine::{
    CallCaptureMachine, CaptureStats, CapturePhase, MachineConfig, StatusOutcome, Transition,
};
pub use probe::{HostDocument, Probe};
pub use sampler::{AgentStatusSample, StatusSampler};
pub use tracker::{Backoff, CallTracker, TrackerStatus};
