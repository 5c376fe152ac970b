//! Scripted stand-ins for the browser pages
//!
//! `ScriptedHost` plays the agent desktop: tests mutate the visible page and
//! the tracker reads it through the normal `HostPage` capability.
//! `RecordingForm` captures what would have been typed into the survey form.

#![allow(dead_code)]

use async_trait::async_trait;
use oprosnik_helper::browser::{FormPage, HostPage};
use oprosnik_helper::capture::{HostDocument, Probe};
use oprosnik_helper::error::{BrowserError, Result};
use oprosnik_helper::format::InsertMode;
use std::sync::{Arc, Mutex};

pub const STATUS: &str = "#voice-state-select-headerOptionText";
pub const PHONE: &str = r#"[aria-label*="Участник"]"#;
pub const TIMER: &str = r#"[role="timer"]"#;
pub const REGION: &str = r#"[class*="callVariableValue"] span"#;

#[derive(Default)]
struct PageState {
    open: bool,
    browser_closed: bool,
    document: HostDocument,
    attach_calls: usize,
    read_calls: usize,
}

#[derive(Clone, Default)]
pub struct ScriptedHost {
    state: Arc<Mutex<PageState>>,
}

impl ScriptedHost {
    /// A host tab that is open and shows `status`.
    pub fn open_with_status(status: &str) -> Self {
        let host = Self::default();
        host.set_open(true);
        host.set_status(status);
        host
    }

    pub fn set_open(&self, open: bool) {
        self.state.lock().unwrap().open = open;
    }

    /// Simulates the agent quitting Chrome; the tab state survives a relaunch.
    pub fn set_browser_closed(&self, closed: bool) {
        self.state.lock().unwrap().browser_closed = closed;
    }

    pub fn set_status(&self, status: &str) {
        self.set_text(STATUS, status);
    }

    pub fn clear_status(&self) {
        self.state.lock().unwrap().document.matches.remove(STATUS);
    }

    pub fn set_call(&self, phone: &str, timer: &str, region: &str) {
        self.set_text(PHONE, phone);
        self.set_text(TIMER, timer);
        self.set_text(REGION, region);
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.state
            .lock()
            .unwrap()
            .document
            .matches
            .insert(selector.to_string(), text.to_string());
    }

    pub fn attach_calls(&self) -> usize {
        self.state.lock().unwrap().attach_calls
    }

    pub fn read_calls(&self) -> usize {
        self.state.lock().unwrap().read_calls
    }
}

#[async_trait]
impl HostPage for ScriptedHost {
    async fn attach(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.attach_calls += 1;
        if state.browser_closed {
            Err(BrowserError::ConnectionFailed("connection refused".to_string()))
        } else if state.open {
            Ok(())
        } else {
            Err(BrowserError::PageNotFound("/desktop/container/".to_string()))
        }
    }

    async fn read(&self, probe: &Probe) -> Result<HostDocument> {
        let mut state = self.state.lock().unwrap();
        state.read_calls += 1;
        if state.browser_closed {
            return Err(BrowserError::ConnectionFailed("websocket closed".to_string()));
        }
        if !state.open {
            return Err(BrowserError::NoPage);
        }

        // only report what the probe asked for, like the page script does
        let mut doc = HostDocument::new();
        for selector in probe.selectors() {
            if let Some(text) = state.document.text(selector) {
                doc = doc.with_text(selector.clone(), text);
            }
        }
        if probe.scans_clock_text() {
            doc.clock_texts = state.document.clock_texts.clone();
        }
        Ok(doc)
    }
}

#[derive(Clone, Default)]
pub struct RecordingForm {
    field: Arc<Mutex<Option<String>>>,
}

impl RecordingForm {
    pub fn with_field(text: &str) -> Self {
        Self {
            field: Arc::new(Mutex::new(Some(text.to_string()))),
        }
    }

    /// A form page whose comment field does not exist.
    pub fn missing_field() -> Self {
        Self::default()
    }

    pub fn text(&self) -> Option<String> {
        self.field.lock().unwrap().clone()
    }
}

#[async_trait]
impl FormPage for RecordingForm {
    async fn insert_text(&self, field_selector: &str, text: &str, mode: InsertMode) -> Result<()> {
        let mut field = self.field.lock().unwrap();
        match field.as_mut() {
            Some(existing) => {
                *existing = mode.apply(existing, text);
                Ok(())
            }
            None => Err(BrowserError::ElementNotFound(field_selector.to_string())),
        }
    }
}
