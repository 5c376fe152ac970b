//! Tests for the relay HTTP API
//!
//! Requests go through `warp::test`, so no socket or browser is involved.

mod scripted_host;

use chrono::{TimeZone, Utc};
use oprosnik_helper::browser::FormPage;
use oprosnik_helper::capture::{DurationSource, TrackerStatus};
use oprosnik_helper::format::InsertionFormatter;
use oprosnik_helper::history::{CallRecord, HistoryStore, MemoryStore, SharedHistory};
use oprosnik_helper::relay::{self, RelayResponse, RelayState, NO_DATA_MESSAGE, NO_FORM_MESSAGE};
use scripted_host::RecordingForm;
use std::sync::Arc;
use tokio::sync::watch;

fn record(phone: &str, region: &str, duration: &str, at_secs: i64) -> CallRecord {
    CallRecord::new(
        Some(phone.to_string()),
        Some(region.to_string()),
        duration.to_string(),
        DurationSource::FromInterface,
        Utc.timestamp_opt(1_700_000_000 + at_secs, 0).unwrap(),
    )
}

async fn history_with(records: Vec<CallRecord>) -> SharedHistory {
    let mut store = HistoryStore::new(Arc::new(MemoryStore::new()), 10);
    for r in records {
        store.append(r).await.unwrap();
    }
    store.into_shared()
}

fn state(history: SharedHistory, form: Option<RecordingForm>) -> RelayState {
    let (_tx, status) = watch::channel(TrackerStatus::default());
    RelayState {
        history,
        status,
        form: form.map(|f| Arc::new(f) as Arc<dyn FormPage>),
        formatter: Arc::new(InsertionFormatter::new("{{ phone }} {{ duration }} {{ region }}").unwrap()),
        comment_selector: "#comment_".to_string(),
    }
}

fn body<B: AsRef<[u8]>>(res: &warp::http::Response<B>) -> RelayResponse {
    serde_json::from_slice(res.body().as_ref()).expect("JSON envelope")
}

#[tokio::test]
async fn test_ping_reports_tracker_status() {
    let routes = relay::routes(state(history_with(vec![]).await, None));

    let res = warp::test::request().method("GET").path("/ping").reply(&routes).await;
    assert_eq!(res.status(), 200);
    let reply = body(&res);
    assert_eq!(reply.status, "success");
    let data = reply.data.unwrap();
    assert_eq!(data["attached"], false);
    assert_eq!(data["phase"], "disconnected");
    println!("✅ Ping: {}", data);
}

#[tokio::test]
async fn test_latest_without_history_is_an_error() {
    let routes = relay::routes(state(history_with(vec![]).await, None));

    let res = warp::test::request()
        .method("GET")
        .path("/history/latest")
        .reply(&routes)
        .await;
    let reply = body(&res);
    assert_eq!(reply.status, "error");
    assert_eq!(reply.message.as_deref(), Some(NO_DATA_MESSAGE));
}

#[tokio::test]
async fn test_latest_returns_newest_record() {
    let history = history_with(vec![
        record("79001112233", "Москва", "00:01:00", 0),
        record("79004445566", "Омск", "00:02:00", 60),
    ])
    .await;
    let routes = relay::routes(state(history, None));

    let res = warp::test::request()
        .method("GET")
        .path("/history/latest")
        .reply(&routes)
        .await;
    let data = body(&res).data.unwrap();
    assert_eq!(data["phone"], "79004445566");
    assert_eq!(data["source"], "fromInterface");
}

#[tokio::test]
async fn test_history_query_parameters() {
    let history = history_with(vec![
        record("79001112233", "Москва", "00:01:00", 0),
        record("79004445566", "Омск", "00:02:00", 60),
        record("79001119999", "Москва", "00:03:00", 120),
    ])
    .await;
    let routes = relay::routes(state(history, None));

    let res = warp::test::request()
        .method("GET")
        .path("/history?phone=900111&limit=1")
        .reply(&routes)
        .await;
    let data = body(&res).data.unwrap();
    let items = data.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["phone"], "79001119999");

    let res = warp::test::request()
        .method("GET")
        .path("/history?region=%D0%9E%D0%BC%D1%81%D0%BA")
        .reply(&routes)
        .await;
    let data = body(&res).data.unwrap();
    assert_eq!(data.as_array().unwrap().len(), 1);

    let res = warp::test::request().method("GET").path("/history").reply(&routes).await;
    assert_eq!(body(&res).data.unwrap().as_array().unwrap().len(), 3);
    println!("✅ History filters via query string");
}

#[tokio::test]
async fn test_summary_and_csv_export() {
    let history = history_with(vec![
        record("79001112233", "Москва", "00:01:00", 0),
        record("79004445566", "Омск", "00:03:00", 60),
    ])
    .await;
    let routes = relay::routes(state(history, None));

    let res = warp::test::request()
        .method("GET")
        .path("/history/summary")
        .reply(&routes)
        .await;
    let data = body(&res).data.unwrap();
    assert_eq!(data["total"], 2);
    assert_eq!(data["averageDurationSecs"], 120);

    let res = warp::test::request()
        .method("GET")
        .path("/history/export.csv")
        .reply(&routes)
        .await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/csv; charset=utf-8");
    let csv = String::from_utf8(res.body().to_vec()).unwrap();
    assert!(csv.starts_with("phone,duration,region,completed_at,source\n"));
    assert_eq!(csv.lines().count(), 3);
}

#[tokio::test]
async fn test_insert_prepends_latest_call_to_form() {
    let history = history_with(vec![record("79001112233", "Москва", "00:02:15", 0)]).await;
    let form = RecordingForm::with_field("agent notes");
    let routes = relay::routes(state(history, Some(form.clone())));

    let res = warp::test::request()
        .method("POST")
        .path("/insert")
        .json(&serde_json::json!({}))
        .reply(&routes)
        .await;
    let reply = body(&res);
    assert_eq!(reply.status, "success");
    assert_eq!(reply.data.unwrap()["inserted"], "79001112233 00:02:15 Москва");
    assert_eq!(
        form.text().as_deref(),
        Some("79001112233 00:02:15 Москва\n\nagent notes")
    );
    println!("✅ Insert placed the summary ahead of existing notes");
}

#[tokio::test]
async fn test_insert_selected_record_with_replace_mode() {
    let history = history_with(vec![
        record("111", "A", "00:00:10", 0),
        record("222", "B", "00:00:20", 60),
    ])
    .await;
    let form = RecordingForm::with_field("old");
    let routes = relay::routes(state(history, Some(form.clone())));

    let res = warp::test::request()
        .method("POST")
        .path("/insert")
        .json(&serde_json::json!({ "index": 1, "mode": "replace" }))
        .reply(&routes)
        .await;
    assert_eq!(body(&res).status, "success");
    assert_eq!(form.text().as_deref(), Some("111 00:00:10 A"));
}

#[tokio::test]
async fn test_insert_without_history_is_an_error() {
    let form = RecordingForm::with_field("");
    let routes = relay::routes(state(history_with(vec![]).await, Some(form.clone())));

    let res = warp::test::request()
        .method("POST")
        .path("/insert")
        .json(&serde_json::json!({}))
        .reply(&routes)
        .await;
    let reply = body(&res);
    assert_eq!(reply.status, "error");
    assert_eq!(reply.message.as_deref(), Some(NO_DATA_MESSAGE));
    assert_eq!(form.text().as_deref(), Some(""));
}

#[tokio::test]
async fn test_insert_without_destination_is_an_error() {
    let history = history_with(vec![record("111", "A", "00:00:10", 0)]).await;

    let routes = relay::routes(state(history.clone(), None));
    let res = warp::test::request()
        .method("POST")
        .path("/insert")
        .json(&serde_json::json!({}))
        .reply(&routes)
        .await;
    let reply = body(&res);
    assert_eq!(reply.status, "error");
    assert_eq!(reply.message.as_deref(), Some(NO_FORM_MESSAGE));

    let routes = relay::routes(state(history, Some(RecordingForm::missing_field())));
    let res = warp::test::request()
        .method("POST")
        .path("/insert")
        .json(&serde_json::json!({}))
        .reply(&routes)
        .await;
    let reply = body(&res);
    assert_eq!(reply.status, "error");
    assert!(reply.message.unwrap().starts_with(NO_FORM_MESSAGE));
}

#[tokio::test]
async fn test_unknown_route_is_rejected() {
    let routes = relay::routes(state(history_with(vec![]).await, None));
    let res = warp::test::request().method("GET").path("/nope").reply(&routes).await;
    assert_eq!(res.status(), 404);
}
