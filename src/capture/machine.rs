//! Call-Capture State Machine
//!
//! Pure and synchronous: it never touches the page or a clock itself. The
//! tracker feeds it status samples and snapshots stamped with their read
//! time and persists whatever records it hands back.
//!
//! ```text
//!   Idle --talking--> InCall --ending--> PostCallCapture --budget/plausible--> Idle
//!     ^                                                                        |
//!     +------------------------------------------------------------------------+
//!   any --host lost--> Disconnected --reattached--> Idle
//! ```

use super::duration::{elapsed_between, DurationReconciler};
use super::extractor::CallSnapshot;
use super::sampler::AgentStatusSample;
use crate::config::{Settings, StatusLabels};
use crate::history::CallRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CapturePhase {
    /// Host page lost; waiting for rediscovery.
    Disconnected,
    Idle,
    InCall,
    PostCallCapture,
}

impl CapturePhase {
    /// Whether the tracker should be reading call snapshots in this phase.
    pub fn wants_snapshots(self) -> bool {
        matches!(self, CapturePhase::InCall | CapturePhase::PostCallCapture)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Transition {
    None,
    /// First sample after (re)attachment; only records the status.
    Baseline,
    CallStarted,
    CallEnded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusOutcome {
    pub transition: Transition,
    /// Set when a new call started before the previous burst finished.
    pub finalized: Option<CallRecord>,
}

impl StatusOutcome {
    fn only(transition: Transition) -> Self {
        Self {
            transition,
            finalized: None,
        }
    }
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStats {
    pub status_changes: u64,
    pub calls_started: u64,
    pub calls_tracked: u64,
    pub calls_abandoned: u64,
    pub save_attempts: u64,
    pub save_errors: u64,
    pub rediscoveries: u64,
}

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub labels: StatusLabels,
    pub reconciler: DurationReconciler,
    pub burst_max_attempts: u32,
    pub burst_window: chrono::Duration,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl MachineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            labels: settings.labels.clone(),
            reconciler: DurationReconciler::new(settings.capture.min_interface_secs),
            burst_max_attempts: settings.capture.burst_max_attempts,
            burst_window: settings.capture.burst_window(),
        }
    }
}

/// Transient data of the call in progress. Dropping it clears every field.
#[derive(Debug, Clone)]
struct ActiveCall {
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    snapshot: Option<CallSnapshot>,
    calculated_duration: Option<String>,
    burst_attempts: u32,
}

/// Read-only view for the ping endpoint and logs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineDebugView {
    pub phase: CapturePhase,
    pub previous_status: Option<String>,
    pub call_started_at: Option<DateTime<Utc>>,
    pub call_ended_at: Option<DateTime<Utc>>,
    pub calculated_duration: Option<String>,
    pub burst_attempts: u32,
    pub snapshot: Option<CallSnapshot>,
}

#[derive(Debug, Clone)]
pub struct CallCaptureMachine {
    config: MachineConfig,
    phase: CapturePhase,
    previous_status: Option<String>,
    call: Option<ActiveCall>,
    stats: CaptureStats,
}

impl CallCaptureMachine {
    pub fn new(config: MachineConfig) -> Self {
        Self {
            config,
            phase: CapturePhase::Idle,
            previous_status: None,
            call: None,
            stats: CaptureStats::default(),
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CaptureStats {
        &mut self.stats
    }

    pub fn last_status(&self) -> Option<&str> {
        self.previous_status.as_deref()
    }

    pub fn debug_view(&self) -> MachineDebugView {
        MachineDebugView {
            phase: self.phase,
            previous_status: self.previous_status.clone(),
            call_started_at: self.call.as_ref().map(|c| c.started_at),
            call_ended_at: self.call.as_ref().and_then(|c| c.ended_at),
            calculated_duration: self
                .call
                .as_ref()
                .and_then(|c| c.calculated_duration.clone()),
            burst_attempts: self.call.as_ref().map_or(0, |c| c.burst_attempts),
            snapshot: self.call.as_ref().and_then(|c| c.snapshot.clone()),
        }
    }

    /// Consumes one status sample in arrival order.
    pub fn on_status(&mut self, sample: &AgentStatusSample) -> StatusOutcome {
        if self.phase == CapturePhase::Disconnected {
            return StatusOutcome::only(Transition::None);
        }

        let current = sample.status.trim();
        let Some(previous) = self.previous_status.replace(current.to_string()) else {
            log::info!("Baseline agent status: \"{}\"", current);
            return StatusOutcome::only(Transition::Baseline);
        };

        if previous == current {
            return StatusOutcome::only(Transition::None);
        }

        self.stats.status_changes += 1;
        log::info!("Agent status changed: \"{}\" -> \"{}\"", previous, current);

        let labels = &self.config.labels;
        let talking_now = labels.is_talking(current);
        let call_begins = talking_now && !labels.is_talking(&previous);
        let call_ends = labels.is_ending(current) && !talking_now;
        let at = sample.sampled_at;

        match self.phase {
            CapturePhase::Idle if call_begins => {
                self.start_call(at);
                StatusOutcome::only(Transition::CallStarted)
            }
            CapturePhase::InCall if call_ends => {
                self.end_call(at);
                StatusOutcome::only(Transition::CallEnded)
            }
            CapturePhase::PostCallCapture if call_begins => {
                // back-to-back call: close out the previous one first
                let finalized = self.finalize(at);
                self.start_call(at);
                StatusOutcome {
                    transition: Transition::CallStarted,
                    finalized,
                }
            }
            _ => StatusOutcome::only(Transition::None),
        }
    }

    /// Consumes one extraction result.
    ///
    /// In `InCall` it refreshes the rolling snapshot. In `PostCallCapture` it
    /// counts as a burst attempt and may finalize the call.
    pub fn on_snapshot(&mut self, snapshot: CallSnapshot) -> Option<CallRecord> {
        let reconciler = self.config.reconciler;
        let max_attempts = self.config.burst_max_attempts;
        let window = self.config.burst_window;

        let call = self.call.as_mut()?;
        let at = snapshot.sampled_at;

        match self.phase {
            CapturePhase::InCall => {
                merge_snapshot(call, snapshot);
                None
            }
            CapturePhase::PostCallCapture => {
                let plausible = snapshot
                    .duration_text
                    .as_deref()
                    .is_some_and(|text| reconciler.is_plausible_interface_duration(text));
                merge_snapshot(call, snapshot);
                call.burst_attempts += 1;

                let window_spent = call.ended_at.is_some_and(|end| at - end >= window);
                if plausible {
                    log::debug!("Interface duration caught after {} burst attempt(s)", call.burst_attempts);
                    self.finalize(at)
                } else if call.burst_attempts >= max_attempts || window_spent {
                    self.finalize(at)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Finalizes a burst whose time window has passed without a fresh snapshot.
    pub fn expire_burst(&mut self, now: DateTime<Utc>) -> Option<CallRecord> {
        if self.phase != CapturePhase::PostCallCapture {
            return None;
        }
        let ended_at = self.call.as_ref().and_then(|c| c.ended_at)?;
        if now - ended_at >= self.config.burst_window {
            self.finalize(now)
        } else {
            None
        }
    }

    /// Host page lost. In-flight progress is dropped, never persisted.
    ///
    /// Returns true when a call was abandoned.
    pub fn disconnect(&mut self) -> bool {
        let abandoned = self.call.take().is_some();
        if abandoned {
            self.stats.calls_abandoned += 1;
            log::warn!("Host page lost during {:?}; call abandoned", self.phase);
        }
        self.phase = CapturePhase::Disconnected;
        self.previous_status = None;
        abandoned
    }

    /// Host page reacquired; resume from `Idle` with a fresh baseline.
    pub fn reconnect(&mut self) {
        self.call = None;
        self.previous_status = None;
        self.phase = CapturePhase::Idle;
    }

    fn start_call(&mut self, at: DateTime<Utc>) {
        self.call = Some(ActiveCall {
            started_at: at,
            ended_at: None,
            snapshot: None,
            calculated_duration: None,
            burst_attempts: 0,
        });
        self.phase = CapturePhase::InCall;
        self.stats.calls_started += 1;
        log::info!("Call started at {}", at);
    }

    fn end_call(&mut self, at: DateTime<Utc>) {
        if let Some(call) = self.call.as_mut() {
            call.ended_at = Some(at);
            call.calculated_duration = Some(elapsed_between(call.started_at, at));
            call.burst_attempts = 0;
            log::info!(
                "Call ended at {}, calculated duration {}",
                at,
                call.calculated_duration.as_deref().unwrap_or_default()
            );
        }
        self.phase = CapturePhase::PostCallCapture;
    }

    fn finalize(&mut self, at: DateTime<Utc>) -> Option<CallRecord> {
        let call = self.call.take();
        self.phase = CapturePhase::Idle;
        let call = call?;

        let snapshot = call.snapshot.unwrap_or_else(|| CallSnapshot::empty(at));
        let (duration, source) = self.config.reconciler.reconcile(
            snapshot.duration_text.as_deref(),
            call.calculated_duration.as_deref(),
        );

        let record = CallRecord::new(snapshot.phone, snapshot.region, duration, source, at)
            .with_call_window(call.started_at, call.ended_at, call.calculated_duration);

        self.stats.calls_tracked += 1;
        log::info!(
            "Call finalized: phone={}, duration={} ({:?}), region={}",
            record.phone,
            record.duration,
            record.source,
            record.region
        );
        Some(record)
    }
}

fn merge_snapshot(call: &mut ActiveCall, snapshot: CallSnapshot) {
    match call.snapshot.as_mut() {
        Some(current) => current.merge(snapshot),
        None => call.snapshot = Some(snapshot),
    }
}
