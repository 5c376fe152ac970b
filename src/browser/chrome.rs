// spider_chrome re-exports chromiumoxide API
use super::page::{FormPage, HostPage};
use crate::capture::probe::{HostDocument, Probe};
use crate::error::{BrowserError, Result};
use crate::format::InsertMode;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;

/// Upper bound on one page evaluation; a hung tab counts as unreachable.
const EVALUATE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Launches a dedicated Chrome (system installation or explicit path)
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Connects to the agent's running Chrome on its debug port
    DebugPort(u16),
}

impl ChromeDriver {
    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile directory so parallel instances never share state
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_nanos())
                    .unwrap_or_default();
                let temp_dir =
                    std::env::temp_dir().join(format!("oprosnik-chrome-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    BrowserError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir);

                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                }

                let config = config.build().map_err(|e| {
                    BrowserError::LaunchFailed(format!(
                        "{}. Install Chrome/Chromium or pass --chrome-path",
                        e
                    ))
                })?;

                let (browser, mut handler) = Browser::launch(config)
                    .await
                    .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

                // Spawn handler task
                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    BrowserError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                             Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// First tab whose URL contains `pattern`
    pub async fn find_page(&self, pattern: &str) -> Result<Page> {
        let pages = self.browser.pages().await?;

        for page in pages {
            if let Ok(Some(url)) = page.url().await {
                if url.contains(pattern) {
                    return Ok(page);
                }
            }
        }

        Err(BrowserError::PageNotFound(pattern.to_string()))
    }

    /// First non-internal tab that contains an element matching `selector`
    pub async fn find_page_with_element(&self, selector: &str) -> Result<Page> {
        let pages = self.browser.pages().await?;
        let script = format!(
            "(() => {{ try {{ return !!document.querySelector({}); }} catch (e) {{ return false; }} }})()",
            js_string(selector)
        );

        for page in pages {
            if let Ok(Some(url)) = page.url().await {
                if url.starts_with("chrome://") || url.starts_with("devtools://") {
                    continue;
                }
            }
            if let Ok(true) = evaluate_typed::<bool>(&page, &script).await {
                return Ok(page);
            }
        }

        Err(BrowserError::ElementNotFound(selector.to_string()))
    }

    /// Check if the browser is still alive and responsive
    pub async fn is_alive(&self) -> bool {
        match self.browser.pages().await {
            Ok(pages) => match pages.first() {
                // a closed websocket shows up as a hung or failed URL read
                Some(page) => matches!(
                    tokio::time::timeout(Duration::from_secs(2), page.url()).await,
                    Ok(Ok(_))
                ),
                None => true,
            },
            Err(_) => false,
        }
    }

    /// Open a new tab; used to stage host/form pages in tests and demos
    pub async fn open_page(&self, url: &str) -> Result<Page> {
        self.browser
            .new_page(url)
            .await
            .map_err(|e| BrowserError::Other(format!("Failed to open {}: {}", url, e)))
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}

/// Chrome connection that is re-established when the browser goes away.
///
/// The agent may close and reopen Chrome at any time; every page lookup goes
/// through [`ChromeSession::driver`], which checks liveness and reconnects
/// with the original [`ConnectionMode`].
pub struct ChromeSession {
    mode: ConnectionMode,
    driver: tokio::sync::Mutex<Option<Arc<ChromeDriver>>>,
}

impl ChromeSession {
    /// Session that connects lazily on first use.
    pub fn new(mode: ConnectionMode) -> Self {
        Self {
            mode,
            driver: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.driver.lock().await.is_some()
    }

    /// Live driver, reconnecting if the previous browser is gone.
    pub async fn driver(&self) -> Result<Arc<ChromeDriver>> {
        let mut guard = self.driver.lock().await;

        if let Some(driver) = guard.as_ref() {
            if driver.is_alive().await {
                return Ok(driver.clone());
            }
            log::warn!("Chrome session is dead, reconnecting");
            *guard = None;
        }

        let driver = Arc::new(ChromeDriver::new(self.mode.clone()).await?);
        log::info!("Connected to Chrome ({:?})", self.mode);
        *guard = Some(driver.clone());
        Ok(driver)
    }
}

/// Evaluates `script` in `page` and deserializes the result.
pub async fn evaluate_typed<T: serde::de::DeserializeOwned>(page: &Page, script: &str) -> Result<T> {
    let result = tokio::time::timeout(EVALUATE_TIMEOUT, page.evaluate(script))
        .await
        .map_err(|_| BrowserError::ScriptFailed("evaluation timed out".to_string()))?
        .map_err(|e| BrowserError::ScriptFailed(e.to_string()))?;

    result
        .into_value()
        .map_err(|e| BrowserError::ScriptFailed(format!("Failed to deserialize result: {}", e)))
}

/// JSON string literal, which is also a valid JS string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// The agent desktop tab, found by URL substring and cached between reads.
pub struct ChromeHostPage {
    session: Arc<ChromeSession>,
    url_pattern: String,
    page: tokio::sync::Mutex<Option<Page>>,
}

impl ChromeHostPage {
    pub fn new(session: Arc<ChromeSession>, url_pattern: impl Into<String>) -> Self {
        Self {
            session,
            url_pattern: url_pattern.into(),
            page: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl HostPage for ChromeHostPage {
    async fn attach(&self) -> Result<()> {
        *self.page.lock().await = None;
        let driver = self.session.driver().await?;
        let page = driver.find_page(&self.url_pattern).await?;
        log::info!("Attached to host tab matching '{}'", self.url_pattern);
        *self.page.lock().await = Some(page);
        Ok(())
    }

    async fn read(&self, probe: &Probe) -> Result<HostDocument> {
        let mut cached = self.page.lock().await;
        let page = cached.clone().ok_or(BrowserError::NoPage)?;

        match evaluate_typed::<HostDocument>(&page, &probe.to_script()).await {
            Ok(doc) => {
                // the tab may have navigated away from the desktop
                if let Some(url) = doc.url.as_deref() {
                    if !url.contains(&self.url_pattern) {
                        *cached = None;
                        return Err(BrowserError::PageNotFound(self.url_pattern.clone()));
                    }
                }
                Ok(doc)
            }
            Err(e) => {
                *cached = None;
                Err(e)
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct FieldContent {
    found: bool,
    text: String,
}

/// The survey form tab.
pub struct ChromeFormPage {
    session: Arc<ChromeSession>,
    url_pattern: Option<String>,
}

impl ChromeFormPage {
    pub fn new(session: Arc<ChromeSession>, url_pattern: Option<String>) -> Self {
        Self {
            session,
            url_pattern,
        }
    }

    async fn locate(&self, field_selector: &str) -> Result<Page> {
        let driver = self.session.driver().await?;
        match self.url_pattern.as_deref() {
            Some(pattern) => driver.find_page(pattern).await,
            None => driver.find_page_with_element(field_selector).await,
        }
    }
}

#[async_trait]
impl FormPage for ChromeFormPage {
    async fn insert_text(&self, field_selector: &str, text: &str, mode: InsertMode) -> Result<()> {
        let page = self.locate(field_selector).await?;
        let selector = js_string(field_selector);

        let read_script = format!(
            r#"(() => {{
                const field = document.querySelector({selector});
                if (!field) return {{ found: false, text: '' }};
                const text = ('value' in field) ? field.value : (field.textContent || '');
                return {{ found: true, text }};
            }})()"#,
            selector = selector
        );
        let existing: FieldContent = evaluate_typed(&page, &read_script).await?;
        if !existing.found {
            return Err(BrowserError::ElementNotFound(field_selector.to_string()));
        }

        let write_script = format!(
            r#"(() => {{
                const field = document.querySelector({selector});
                if (!field) return false;
                const text = {text};
                if ('value' in field) {{
                    field.value = text;
                }} else {{
                    field.textContent = text;
                }}
                field.dispatchEvent(new Event('input', {{ bubbles: true }}));
                field.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            selector = selector,
            text = js_string(&mode.apply(&existing.text, text)),
        );

        if evaluate_typed::<bool>(&page, &write_script).await? {
            log::info!("Inserted call summary into {}", field_selector);
            Ok(())
        } else {
            Err(BrowserError::ElementNotFound(field_selector.to_string()))
        }
    }
}
