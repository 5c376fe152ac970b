use anyhow::Context;
use clap::Parser;
use oprosnik_helper::browser::{
    ChromeFormPage, ChromeHostPage, ChromeSession, ConnectionMode, FormPage,
};
use oprosnik_helper::capture::CallTracker;
use oprosnik_helper::config::Settings;
use oprosnik_helper::format::InsertionFormatter;
use oprosnik_helper::history::{HistoryStore, JsonFileStore};
use oprosnik_helper::relay::{self, RelayState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML settings file; flags below override it
    #[arg(short, long, env = "OPROSNIK_CONFIG")]
    config: Option<PathBuf>,

    /// Port the relay listens on
    #[arg(short, long, env = "OPROSNIK_PORT")]
    port: Option<u16>,

    /// Chrome remote debugging port to attach to
    #[arg(long, default_value_t = 9222, env = "OPROSNIK_DEBUG_PORT")]
    debug_port: u16,

    /// Launch a dedicated Chrome instead of attaching to a running one
    #[arg(long)]
    launch: bool,

    /// Chrome executable used with --launch
    #[arg(long)]
    chrome_path: Option<String>,

    /// Run the launched Chrome headless
    #[arg(long)]
    headless: bool,

    /// Substring of the agent desktop tab URL
    #[arg(long)]
    host_url_pattern: Option<String>,

    /// Substring of the survey form tab URL
    #[arg(long)]
    form_url_pattern: Option<String>,

    /// Where call history is stored
    #[arg(long, env = "OPROSNIK_HISTORY_FILE")]
    history_file: Option<PathBuf>,
}

impl Args {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };

        if let Some(port) = self.port {
            settings.relay.port = port;
        }
        if let Some(pattern) = &self.host_url_pattern {
            settings.host.url_pattern = pattern.clone();
        }
        if let Some(pattern) = &self.form_url_pattern {
            settings.form.url_pattern = Some(pattern.clone());
        }
        if let Some(path) = &self.history_file {
            settings.history.storage_path = Some(path.clone());
        }
        Ok(settings)
    }

    fn connection_mode(&self) -> ConnectionMode {
        if self.launch {
            ConnectionMode::Sandboxed {
                chrome_path: self.chrome_path.clone(),
                no_sandbox: std::env::var("CI").is_ok(),
                headless: self.headless,
            }
        } else {
            ConnectionMode::DebugPort(self.debug_port)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let settings = args.settings()?;

    log::info!(
        "Starting oprosnik-helper on port {} (host tabs matching '{}')",
        settings.relay.port,
        settings.host.url_pattern
    );

    let formatter = InsertionFormatter::new(settings.insertion.template.clone())
        .context("Insertion template does not parse")?;

    let session = Arc::new(ChromeSession::new(args.connection_mode()));
    // Chrome may start after us; the tracker keeps retrying in the background
    if let Err(e) = session.driver().await {
        log::warn!("Chrome is not reachable yet: {}", e);
    }

    let backend = Arc::new(JsonFileStore::new(settings.history.resolved_storage_path()));
    log::info!("Call history file: {}", backend.path().display());
    let history = HistoryStore::load(backend, settings.history.capacity)
        .await
        .into_shared();

    let host = ChromeHostPage::new(session.clone(), settings.host.url_pattern.clone());
    let tracker = CallTracker::new(host, &settings, history.clone());
    let status = tracker.subscribe();

    let cancel = CancellationToken::new();
    let tracker_task = tokio::spawn(tracker.run(cancel.clone()));

    let form: Arc<dyn FormPage> = Arc::new(ChromeFormPage::new(
        session.clone(),
        settings.form.url_pattern.clone(),
    ));
    let state = RelayState {
        history,
        status,
        form: Some(form),
        formatter: Arc::new(formatter),
        comment_selector: settings.form.comment_selector.clone(),
    };
    let routes = relay::routes(state);

    // Bind manually to handle "port in use" error gracefully
    let addr = SocketAddr::from(([127, 0, 0, 1], settings.relay.port));

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            log::info!("Listening on http://{}", addr);
            let shutdown = cancel.clone();
            warp::serve(routes)
                .serve_incoming_with_graceful_shutdown(
                    tokio_stream::wrappers::TcpListenerStream::new(listener),
                    async move {
                        tokio::select! {
                            _ = tokio::signal::ctrl_c() => log::info!("Shutting down"),
                            _ = shutdown.cancelled() => {}
                        }
                    },
                )
                .await;
        }
        Err(e) => {
            log::error!("Failed to bind to port {}: {}", settings.relay.port, e);
            eprintln!(
                "Error: Port {} is already in use or unavailable.",
                settings.relay.port
            );
            cancel.cancel();
            std::process::exit(1);
        }
    }

    cancel.cancel();
    if let Err(e) = tracker_task.await {
        log::error!("Call tracker task failed: {}", e);
    }
    Ok(())
}
