//! Chrome session behaviour when no browser is listening
//!
//! These run without a Chrome installation: the debug port points at a
//! closed local port, so every connection attempt is refused.

use oprosnik_helper::browser::{
    ChromeFormPage, ChromeHostPage, ChromeSession, ConnectionMode, FormPage, HostPage,
};
use oprosnik_helper::error::BrowserError;
use oprosnik_helper::format::InsertMode;
use std::sync::Arc;

/// A local port with nothing listening on it.
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_attach_without_browser_is_retryable() {
    let session = Arc::new(ChromeSession::new(ConnectionMode::DebugPort(closed_port())));
    let host = ChromeHostPage::new(session.clone(), "/desktop/container/");

    for attempt in 0..3 {
        match host.attach().await {
            Err(BrowserError::ConnectionFailed(msg)) => {
                println!("✅ Attempt {} refused: {}", attempt, msg);
            }
            Err(other) => panic!("expected a connection failure, got {}", other),
            Ok(()) => panic!("nothing is listening on the debug port"),
        }
        // a failed connect is never cached; the next attach dials again
        assert!(!session.is_connected().await);
    }
}

#[tokio::test]
async fn test_insert_without_browser_reports_connection_failure() {
    let session = Arc::new(ChromeSession::new(ConnectionMode::DebugPort(closed_port())));
    let form = ChromeFormPage::new(session, Some("/survey".to_string()));

    let result = form.insert_text("#comment_", "BLOCK", InsertMode::Prepend).await;
    assert!(matches!(result, Err(BrowserError::ConnectionFailed(_))));
}
