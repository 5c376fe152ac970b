//! Runtime settings.
//!
//! Every tunable lives here with its default. A TOML file can override any
//! subset of fields; CLI flags in `main.rs` are applied on top of that.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: HostSettings,
    pub form: FormSettings,
    pub capture: CaptureSettings,
    pub labels: StatusLabels,
    pub selectors: SelectorSettings,
    pub history: HistorySettings,
    pub insertion: InsertionSettings,
    pub relay: RelaySettings,
}

impl Settings {
    /// Loads a TOML settings file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse settings file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

/// Where the agent desktop lives and how patient to be with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Substring of the agent desktop tab URL.
    pub url_pattern: String,
    /// Consecutive reads without a status element before the page counts as lost.
    pub status_miss_tolerance: u32,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            url_pattern: "/desktop/container/".to_string(),
            status_miss_tolerance: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSettings {
    /// Substring of the survey form tab URL. Without it, the first tab that
    /// contains `comment_selector` is used.
    pub url_pattern: Option<String>,
    pub comment_selector: String,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            url_pattern: None,
            comment_selector: "#comment_".to_string(),
        }
    }
}

/// Cadences and budgets of the capture loop, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub status_interval_ms: u64,
    pub snapshot_interval_ms: u64,
    pub burst_interval_ms: u64,
    pub burst_max_attempts: u32,
    pub burst_window_ms: u64,
    pub min_interface_secs: u64,
    pub rediscover_base_ms: u64,
    pub rediscover_max_ms: u64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            status_interval_ms: 1000,
            snapshot_interval_ms: 700,
            burst_interval_ms: 300,
            burst_max_attempts: 10,
            burst_window_ms: 3000,
            min_interface_secs: 10,
            rediscover_base_ms: 1000,
            rediscover_max_ms: 30_000,
        }
    }
}

impl CaptureSettings {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms.max(1))
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms.max(1))
    }

    pub fn burst_interval(&self) -> Duration {
        Duration::from_millis(self.burst_interval_ms.max(1))
    }

    pub fn burst_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.burst_window_ms as i64)
    }
}

/// Status texts that mean "on a call" and "call just ended".
///
/// Matching is a case-insensitive substring test, since the desktop decorates
/// labels (e.g. "Not Ready - Lunch").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusLabels {
    pub talking: Vec<String>,
    pub ending: Vec<String>,
}

impl Default for StatusLabels {
    fn default() -> Self {
        Self {
            talking: vec!["Разговор".to_string(), "Talking".to_string()],
            ending: vec![
                "Завершение".to_string(),
                "Поствызов".to_string(),
                "WrapUp".to_string(),
                "Wrap Up".to_string(),
                "Готов".to_string(),
                "Ready".to_string(),
            ],
        }
    }
}

impl StatusLabels {
    pub fn is_talking(&self, status: &str) -> bool {
        matches_any(&self.talking, status)
    }

    pub fn is_ending(&self, status: &str) -> bool {
        matches_any(&self.ending, status)
    }
}

fn matches_any(labels: &[String], status: &str) -> bool {
    let status = status.trim().to_lowercase();
    !status.is_empty()
        && labels
            .iter()
            .any(|label| status.contains(&label.trim().to_lowercase()))
}

/// Selector fallback lists, most specific first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub status: Vec<String>,
    pub phone: Vec<String>,
    pub duration: Vec<String>,
    /// After the duration selectors, scan leaf elements for `HH:MM:SS` text.
    pub duration_clock_scan: bool,
    pub region: Vec<String>,
    pub phone_digits_only: bool,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        let list = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            status: list(&[
                "#voice-state-select-headerOptionText",
                "[data-testid=\"agent-status\"]",
                ".agent-state-text",
                "[id*=\"voice-state\"]",
                "[id*=\"agent-state\"]",
            ]),
            phone: list(&[
                "[class*=\"callcontrol-grid-cell\"] [aria-label*=\"Участник\"]",
                "[aria-label*=\"Участник\"]",
                "[aria-label*=\"Caller\"]",
                ".participant-number",
                "[data-testid=\"caller-number\"]",
                "[class*=\"phone-number\"]",
            ]),
            duration: list(&[
                "[class*=\"callcontrol-grid-cell\"] [role=\"timer\"]",
                "[role=\"timer\"]",
                ".call-timer",
                "[class*=\"duration\"]",
            ]),
            duration_clock_scan: true,
            region: list(&[
                "[class*=\"callcontrol-grid-cell\"] [class*=\"callVariableValue\"] span",
                "[class*=\"callVariableValue\"] span",
                "[id*=\"call-header-variable-value\"]",
                "[data-testid=\"call-region\"]",
            ]),
            phone_digits_only: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub capacity: usize,
    /// JSON storage file. Defaults to the platform data directory.
    pub storage_path: Option<PathBuf>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            capacity: 10,
            storage_path: None,
        }
    }
}

impl HistorySettings {
    pub fn resolved_storage_path(&self) -> PathBuf {
        self.storage_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("oprosnik-helper")
                .join("storage.json")
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertionSettings {
    /// minijinja template; see `format::DEFAULT_TEMPLATE` for the variables.
    pub template: String,
}

impl Default for InsertionSettings {
    fn default() -> Self {
        Self {
            template: crate::format::DEFAULT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub port: u16,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self { port: 9669 }
    }
}
