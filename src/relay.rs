//! Relay adapter: the local request/response API used by the popup and the
//! form-side insert button. Each request gets exactly one JSON reply.

use crate::browser::FormPage;
use crate::capture::TrackerStatus;
use crate::format::{InsertMode, InsertionFormatter};
use crate::history::{HistoryQuery, SharedHistory};
use chrono::{Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::watch;
use warp::http::StatusCode;
use warp::Filter;

pub const NO_DATA_MESSAGE: &str = "No call data yet";
pub const NO_FORM_MESSAGE: &str = "Destination page not found";

#[derive(Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RelayResponse {
    pub fn success(data: impl Serialize) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: serde_json::to_value(data).ok(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
            data: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InsertRequest {
    /// Position in the newest-first history; defaults to the latest call.
    #[serde(default)]
    pub index: Option<usize>,
    /// Overrides the configured comment field selector.
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub mode: Option<InsertMode>,
}

#[derive(Clone)]
pub struct RelayState {
    pub history: SharedHistory,
    pub status: watch::Receiver<TrackerStatus>,
    pub form: Option<Arc<dyn FormPage>>,
    pub formatter: Arc<InsertionFormatter>,
    pub comment_selector: String,
}

fn with_state(
    state: RelayState,
) -> impl Filter<Extract = (RelayState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

pub fn routes(
    state: RelayState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let ping = warp::path("ping")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_ping);

    let history = warp::path("history")
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::query::<HistoryQuery>())
        .and(with_state(state.clone()))
        .and_then(handle_history);

    let latest = warp::path!("history" / "latest")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_latest);

    let summary = warp::path!("history" / "summary")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_summary);

    let export = warp::path!("history" / "export.csv")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_export);

    let insert = warp::path("insert")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(handle_insert);

    ping.or(history)
        .or(latest)
        .or(summary)
        .or(export)
        .or(insert)
}

async fn handle_ping(state: RelayState) -> Result<impl warp::Reply, Infallible> {
    let status = state.status.borrow().clone();
    Ok(warp::reply::json(&RelayResponse::success(status)))
}

async fn handle_history(
    query: HistoryQuery,
    state: RelayState,
) -> Result<impl warp::Reply, Infallible> {
    let records = state.history.read().await.search(&query);
    Ok(warp::reply::json(&RelayResponse::success(records)))
}

async fn handle_latest(state: RelayState) -> Result<impl warp::Reply, Infallible> {
    let history = state.history.read().await;
    let reply = match history.most_recent() {
        Some(record) => RelayResponse::success(record),
        None => RelayResponse::error(NO_DATA_MESSAGE),
    };
    Ok(warp::reply::json(&reply))
}

async fn handle_summary(state: RelayState) -> Result<impl warp::Reply, Infallible> {
    let today_start = Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let summary = state.history.read().await.summary(today_start);
    Ok(warp::reply::json(&RelayResponse::success(summary)))
}

async fn handle_export(state: RelayState) -> Result<Box<dyn warp::Reply>, Infallible> {
    let csv = state.history.read().await.to_csv();
    match csv {
        Ok(body) => Ok(Box::new(warp::reply::with_header(
            body,
            "content-type",
            "text/csv; charset=utf-8",
        ))),
        Err(e) => {
            log::error!("CSV export failed: {}", e);
            Ok(Box::new(warp::reply::with_status(
                warp::reply::json(&RelayResponse::error(e.to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            )))
        }
    }
}

async fn handle_insert(
    req: InsertRequest,
    state: RelayState,
) -> Result<impl warp::Reply, Infallible> {
    log::info!("Received insert request for call #{}", req.index.unwrap_or(0));

    let record = {
        let history = state.history.read().await;
        history.get(req.index.unwrap_or(0)).cloned()
    };
    let Some(record) = record else {
        return Ok(warp::reply::json(&RelayResponse::error(NO_DATA_MESSAGE)));
    };

    let block = match state.formatter.format(&record) {
        Ok(block) => block,
        Err(e) => {
            log::error!("Failed to format call summary: {}", e);
            return Ok(warp::reply::json(&RelayResponse::error(e.to_string())));
        }
    };

    let Some(form) = state.form.as_ref() else {
        return Ok(warp::reply::json(&RelayResponse::error(NO_FORM_MESSAGE)));
    };

    let selector = req
        .selector
        .as_deref()
        .unwrap_or(state.comment_selector.as_str());

    match form
        .insert_text(selector, &block, req.mode.unwrap_or_default())
        .await
    {
        Ok(()) => Ok(warp::reply::json(&RelayResponse::success(
            serde_json::json!({ "inserted": block, "record": record }),
        ))),
        Err(e) => {
            log::warn!("Insert into destination page failed: {}", e);
            Ok(warp::reply::json(&RelayResponse::error(format!(
                "{}: {}",
                NO_FORM_MESSAGE, e
            ))))
        }
    }
}
