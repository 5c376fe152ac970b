//! Page capabilities the capture engine depends on.
//!
//! The engine never talks to CDP directly; it sees the agent desktop as a
//! [`HostPage`] and the survey form as a [`FormPage`]. `chrome.rs` provides
//! the CDP-backed implementations.

use crate::capture::probe::{HostDocument, Probe};
use crate::error::Result;
use crate::format::InsertMode;
use async_trait::async_trait;

/// Read-only access to the agent desktop tab.
#[async_trait]
pub trait HostPage: Send + Sync {
    /// Locates (or re-locates) the host tab. Errors mean "not there yet".
    async fn attach(&self) -> Result<()>;

    /// Evaluates `probe` in the page context.
    ///
    /// Elements that are missing come back as absent entries; only a lost tab
    /// or a failed evaluation is an error.
    async fn read(&self, probe: &Probe) -> Result<HostDocument>;
}

/// Write access to the survey form tab.
#[async_trait]
pub trait FormPage: Send + Sync {
    /// Sets the field's text and fires `input`/`change` so the form notices.
    async fn insert_text(&self, field_selector: &str, text: &str, mode: InsertMode) -> Result<()>;
}
