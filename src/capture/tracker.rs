//! Call tracker: the async driver around [`CallCaptureMachine`].
//!
//! One task owns the machine, the host page handle and all timers. Status,
//! snapshot and burst ticks are multiplexed through a single `select!`, so
//! reads never overlap and samples are handled in arrival order. The snapshot
//! interval only exists while the machine is in a call phase; it is dropped
//! as soon as the phase changes or the host page is lost.

use super::extractor::SnapshotExtractor;
use super::machine::{CallCaptureMachine, CaptureStats, CapturePhase, MachineConfig, Transition};
use super::sampler::StatusSampler;
use crate::browser::HostPage;
use crate::config::Settings;
use crate::history::{CallRecord, SharedHistory};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Snapshot of the tracker for the ping endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStatus {
    pub attached: bool,
    pub phase: CapturePhase,
    pub agent_status: Option<String>,
    pub history_len: usize,
    pub stats: CaptureStats,
    pub updated_at: DateTime<Utc>,
}

impl Default for TrackerStatus {
    fn default() -> Self {
        Self {
            attached: false,
            phase: CapturePhase::Disconnected,
            agent_status: None,
            history_len: 0,
            stats: CaptureStats::default(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub status_interval: Duration,
    pub snapshot_interval: Duration,
    pub burst_interval: Duration,
    pub rediscover_base: Duration,
    pub rediscover_max: Duration,
    pub status_miss_tolerance: u32,
}

impl TrackerSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        let capture = &settings.capture;
        Self {
            status_interval: capture.status_interval(),
            snapshot_interval: capture.snapshot_interval(),
            burst_interval: capture.burst_interval(),
            rediscover_base: Duration::from_millis(capture.rediscover_base_ms),
            rediscover_max: Duration::from_millis(capture.rediscover_max_ms),
            status_miss_tolerance: settings.host.status_miss_tolerance.max(1),
        }
    }
}

/// Exponential rediscovery delay: immediate, then `base * 2^n` capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.attempt == 0 {
            Duration::ZERO
        } else {
            let factor = 2u32.saturating_pow(self.attempt - 1);
            self.base.saturating_mul(factor).min(self.max)
        };
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Which snapshot cadence a phase runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cadence {
    Call,
    Burst,
}

impl Cadence {
    fn for_phase(phase: CapturePhase) -> Option<Self> {
        match phase {
            CapturePhase::InCall => Some(Cadence::Call),
            CapturePhase::PostCallCapture => Some(Cadence::Burst),
            CapturePhase::Idle | CapturePhase::Disconnected => None,
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval(period);
    // a tick that lands while a read is in flight is dropped, not queued
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn tick_optional(ticker: &mut Option<(Cadence, Interval)>) {
    match ticker {
        Some((_, interval)) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

pub struct CallTracker<H: HostPage> {
    host: H,
    machine: CallCaptureMachine,
    sampler: StatusSampler,
    extractor: SnapshotExtractor,
    history: SharedHistory,
    settings: TrackerSettings,
    attached: bool,
    /// The current attachment has produced a status sample.
    confirmed: bool,
    ever_confirmed: bool,
    status_misses: u32,
    status_tx: watch::Sender<TrackerStatus>,
}

impl<H: HostPage> CallTracker<H> {
    pub fn new(host: H, settings: &Settings, history: SharedHistory) -> Self {
        let (status_tx, _) = watch::channel(TrackerStatus::default());
        Self {
            host,
            machine: CallCaptureMachine::new(MachineConfig::from_settings(settings)),
            sampler: StatusSampler::new(&settings.selectors.status),
            extractor: SnapshotExtractor::from_settings(&settings.selectors),
            history,
            settings: TrackerSettings::from_settings(settings),
            attached: false,
            confirmed: false,
            ever_confirmed: false,
            status_misses: 0,
            status_tx,
        }
    }

    /// Receiver of status updates, published after every tick.
    pub fn subscribe(&self) -> watch::Receiver<TrackerStatus> {
        self.status_tx.subscribe()
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn machine(&self) -> &CallCaptureMachine {
        &self.machine
    }

    /// Tries to (re)locate the host page. On success the machine restarts from `Idle`.
    ///
    /// A rediscovery is only counted once the new attachment yields a status
    /// sample, so a tab without the status element is not counted every tick.
    pub async fn attach(&mut self) -> bool {
        match self.host.attach().await {
            Ok(()) => {
                self.attached = true;
                self.confirmed = false;
                self.status_misses = 0;
                self.machine.reconnect();
                log::info!("Host page attached; capture is idle");
                self.publish().await;
                true
            }
            Err(e) => {
                log::debug!("Host page not available yet: {}", e);
                false
            }
        }
    }

    /// One status tick: read the status, feed the machine, persist any result.
    pub async fn poll_status(&mut self, now: DateTime<Utc>) -> Transition {
        if !self.attached {
            return Transition::None;
        }

        let doc = match self.host.read(&self.sampler.probe()).await {
            Ok(doc) => doc,
            Err(e) => {
                self.lose_host(&e.to_string()).await;
                return Transition::None;
            }
        };

        let Some(sample) = self.sampler.sample(&doc, now) else {
            self.status_misses += 1;
            log::debug!("Status element not found ({} in a row)", self.status_misses);
            if self.status_misses >= self.settings.status_miss_tolerance {
                self.lose_host("status element not found").await;
            }
            return Transition::None;
        };
        self.status_misses = 0;
        if !self.confirmed {
            self.confirmed = true;
            if self.ever_confirmed {
                self.machine.stats_mut().rediscoveries += 1;
            }
            self.ever_confirmed = true;
        }

        let outcome = self.machine.on_status(&sample);
        if let Some(record) = outcome.finalized {
            self.commit(record).await;
        }

        match outcome.transition {
            // catch the timer before the desktop clears it
            Transition::CallEnded => self.poll_snapshot(now).await,
            _ => {
                if let Some(record) = self.machine.expire_burst(now) {
                    self.commit(record).await;
                }
            }
        }

        self.publish().await;
        outcome.transition
    }

    /// One snapshot tick: rolling refresh during a call, burst attempt after it.
    pub async fn poll_snapshot(&mut self, now: DateTime<Utc>) {
        if !self.attached || !self.machine.phase().wants_snapshots() {
            return;
        }

        match self.host.read(&self.extractor.probe()).await {
            Ok(doc) => {
                let snapshot = self.extractor.extract(&doc, now);
                if snapshot.phone.is_none() && snapshot.duration_text.is_none() {
                    log::debug!("Call fields not rendered yet");
                }
                if let Some(record) = self.machine.on_snapshot(snapshot) {
                    self.commit(record).await;
                }
            }
            Err(e) => self.lose_host(&e.to_string()).await,
        }

        self.publish().await;
    }

    /// Runs until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut status_ticker = ticker(self.settings.status_interval);
        let mut snapshot_ticker: Option<(Cadence, Interval)> = None;
        let mut backoff = Backoff::new(self.settings.rediscover_base, self.settings.rediscover_max);

        log::info!("Call tracker started");

        loop {
            if !self.attached {
                snapshot_ticker = None;
                let delay = backoff.next_delay();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                if self.attach().await {
                    status_ticker.reset();
                } else {
                    log::debug!("Rediscovery attempt failed after waiting {:?}", delay);
                }
                continue;
            }

            let wanted = Cadence::for_phase(self.machine.phase());
            if snapshot_ticker.as_ref().map(|(cadence, _)| *cadence) != wanted {
                // replacing the Option drops the previous interval
                snapshot_ticker = wanted.map(|cadence| {
                    let period = match cadence {
                        Cadence::Call => self.settings.snapshot_interval,
                        Cadence::Burst => self.settings.burst_interval,
                    };
                    log::debug!("Snapshot cadence now {:?} every {:?}", cadence, period);
                    (cadence, ticker(period))
                });
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = status_ticker.tick() => {
                    self.poll_status(Utc::now()).await;
                    // backoff keeps growing while the tab attaches but never shows a status
                    if self.confirmed {
                        backoff.reset();
                    }
                }
                _ = tick_optional(&mut snapshot_ticker) => {
                    self.poll_snapshot(Utc::now()).await;
                }
            }
        }

        log::info!("Call tracker stopped");
    }

    async fn lose_host(&mut self, reason: &str) {
        if !self.attached {
            return;
        }
        log::warn!("Host page unreachable ({}); waiting for rediscovery", reason);
        self.attached = false;
        self.confirmed = false;
        self.status_misses = 0;
        self.machine.disconnect();
        self.publish().await;
    }

    /// Appends under the write lock. A failed durable write is logged, never fatal.
    async fn commit(&mut self, record: CallRecord) {
        self.machine.stats_mut().save_attempts += 1;
        let mut history = self.history.write().await;
        match history.append(record).await {
            Ok(()) => log::info!("Call saved; {} in history", history.len()),
            Err(e) => {
                self.machine.stats_mut().save_errors += 1;
                log::error!("Failed to persist call history (kept in memory): {}", e);
            }
        }
    }

    async fn publish(&self) {
        let history_len = self.history.read().await.len();
        self.status_tx.send_replace(TrackerStatus {
            attached: self.attached,
            phase: self.machine.phase(),
            agent_status: self.machine.last_status().map(str::to_string),
            history_len,
            stats: self.machine.stats(),
            updated_at: Utc::now(),
        });
    }
}
