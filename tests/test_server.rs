//! Local HTTP server for tests
//!
//! Serves a minimal agent desktop at `/desktop/container/` and a survey form
//! at `/survey`, so browser tests never depend on a real contact center.
//! The desktop exposes `window.setAgentStatus(...)` and `window.setCall(...)`
//! for tests to drive it through script evaluation.
//!
//! Each server instance runs on a random available port for perfect test isolation.

#![allow(dead_code)]

use std::net::SocketAddr;
use tokio::sync::oneshot;
use warp::Filter;

const DESKTOP_HTML: &str = r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="utf-8">
    <title>Agent Desktop</title>
</head>
<body>
    <header>
        <span id="voice-state-select-headerOptionText">Готов</span>
    </header>
    <div class="callcontrol-grid-cell-0">
        <div aria-label="Участник 1"></div>
        <div role="timer"></div>
        <div class="callVariableValue-1"><span></span></div>
    </div>
    <script>
        window.setAgentStatus = (text) => {
            document.getElementById('voice-state-select-headerOptionText').textContent = text;
        };
        window.setCall = (phone, timer, region) => {
            document.querySelector('[aria-label*="Участник"]').textContent = phone;
            document.querySelector('[role="timer"]').textContent = timer;
            document.querySelector('[class*="callVariableValue"] span').textContent = region;
        };
    </script>
</body>
</html>"#;

const SURVEY_HTML: &str = r#"<!DOCTYPE html>
<html lang="ru">
<head>
    <meta charset="utf-8">
    <title>Survey</title>
</head>
<body>
    <form>
        <textarea id="comment_" name="comment">Клиент доволен</textarea>
    </form>
    <script>
        window.inputEvents = 0;
        document.getElementById('comment_').addEventListener('input', () => {
            window.inputEvents += 1;
        });
    </script>
</body>
</html>"#;

/// Test server that serves the mock desktop and survey pages
pub struct TestServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a new test server on a random available port
    pub async fn start() -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let desktop = warp::path!("desktop" / "container").map(|| warp::reply::html(DESKTOP_HTML));

        let survey = warp::path("survey").map(|| warp::reply::html(SURVEY_HTML));

        let health = warp::path::end().map(|| "ok");

        let routes = desktop.or(survey).or(health);

        // Bind to random port
        let (addr, server) =
            warp::serve(routes).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                shutdown_rx.await.ok();
            });

        // Spawn server in background
        tokio::spawn(server);

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this server (e.g., "http://127.0.0.1:12345")
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn desktop_url(&self) -> String {
        format!("{}/desktop/container/", self.url())
    }

    pub fn survey_url(&self) -> String {
        format!("{}/survey", self.url())
    }

    /// Get the socket address (for meta tests)
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the server to be ready by making a test request
    pub async fn wait_ready(&self) -> anyhow::Result<()> {
        let url = self.url();
        let max_attempts = 10;

        for attempt in 1..=max_attempts {
            match reqwest::get(&url).await {
                Ok(response) if response.status().is_success() => {
                    println!("✅ Test server ready on: {}", url);
                    return Ok(());
                }
                Ok(response) => {
                    println!(
                        "⚠️ Attempt {}: Server returned status {}",
                        attempt,
                        response.status()
                    );
                }
                Err(e) => {
                    println!("⚠️ Attempt {}: Server not ready - {}", attempt, e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
            }
        }

        anyhow::bail!(
            "Server did not become ready after {} attempts",
            max_attempts
        )
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        // Signal server to shutdown
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
