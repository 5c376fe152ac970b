//! Page-side read of the host document.
//!
//! Every tick performs exactly one script evaluation in the host tab. The
//! script runs each selector inside its own `try`, so a malformed selector is
//! just a miss, and returns the non-empty texts it found. All fallback logic
//! then runs in Rust over the returned [`HostDocument`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a single evaluation should read from the host page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Probe {
    selectors: Vec<String>,
    scan_clock_text: bool,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a selector, skipping duplicates so the script stays minimal.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        if !self.selectors.contains(&selector) {
            self.selectors.push(selector);
        }
        self
    }

    /// Also collect leaf elements whose whole text looks like `HH:MM:SS`.
    pub fn with_clock_scan(mut self) -> Self {
        self.scan_clock_text = true;
        self
    }

    /// Union of two probes, used when sampling and extraction share a tick.
    pub fn merge(mut self, other: &Probe) -> Self {
        for selector in &other.selectors {
            self = self.with_selector(selector.clone());
        }
        self.scan_clock_text |= other.scan_clock_text;
        self
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    pub fn scans_clock_text(&self) -> bool {
        self.scan_clock_text
    }

    /// JavaScript expression evaluated in the host page. Read-only.
    pub fn to_script(&self) -> String {
        // serde_json output is a valid JS array literal with proper escaping
        let selectors =
            serde_json::to_string(&self.selectors).unwrap_or_else(|_| "[]".to_string());
        format!(
            r#"
            (() => {{
                const selectors = {selectors};
                const matches = {{}};
                for (const selector of selectors) {{
                    try {{
                        const el = document.querySelector(selector);
                        const text = el && el.textContent ? el.textContent.trim() : '';
                        if (text) {{
                            matches[selector] = text;
                        }}
                    }} catch (e) {{
                        // invalid selector for this page version
                    }}
                }}

                const clockTexts = [];
                if ({scan}) {{
                    const clock = /^\d{{2}}:\d{{2}}:\d{{2}}$/;
                    for (const el of document.querySelectorAll('body *')) {{
                        if (el.childElementCount !== 0) continue;
                        const text = el.textContent ? el.textContent.trim() : '';
                        if (clock.test(text)) {{
                            clockTexts.push(text);
                        }}
                    }}
                }}

                return {{ url: window.location.href, matches, clockTexts }};
            }})()
            "#,
            selectors = selectors,
            scan = self.scan_clock_text,
        )
    }
}

/// Result of evaluating a [`Probe`] in the host page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDocument {
    #[serde(default)]
    pub url: Option<String>,

    /// Selector -> trimmed text of its first match, only for non-empty matches.
    #[serde(default)]
    pub matches: HashMap<String, String>,

    /// Leaf texts shaped like `HH:MM:SS`, in document order.
    #[serde(default)]
    pub clock_texts: Vec<String>,
}

impl HostDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, selector: impl Into<String>, text: impl Into<String>) -> Self {
        self.matches.insert(selector.into(), text.into());
        self
    }

    pub fn with_clock_text(mut self, text: impl Into<String>) -> Self {
        self.clock_texts.push(text.into());
        self
    }

    /// Text for `selector`, if the page had a non-empty match.
    pub fn text(&self, selector: &str) -> Option<&str> {
        self.matches
            .get(selector)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }
}
