#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener as StdListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use axum::extract::{Form, Path, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use time::{Duration, OffsetDateTime};

use lce_reports::gateway::{RequestSigner, HMAC_HEADER};
use lce_reports::reports::format_date;

pub const USERNAME: &str = "jdoe";
pub const PASSWORD: &str = "s3cret";
pub const HMAC_USER: &str = "hmac-user";
pub const HMAC_KEY: &str = "c3VwZXItc2VjcmV0LWtleS1tYXRlcmlhbA==";
pub const TOKEN: &str = "test-token";

struct PortalState {
    base_url: String,
    signer: RequestSigner,
    reports: Vec<(String, Vec<u8>)>,
    list_hits: AtomicUsize,
    blob_hits: AtomicUsize,
}

/// In-process stand-in for the LCE Gateway API. Runs on its own thread and
/// runtime so blocking clients can talk to it.
pub struct Portal {
    state: Arc<PortalState>,
}

impl Portal {
    pub fn start(reports: Vec<(String, Vec<u8>)>) -> Self {
        let listener = StdListener::bind("127.0.0.1:0").expect("bind portal");
        listener.set_nonblocking(true).expect("nonblocking listener");
        let addr = listener.local_addr().expect("portal addr");
        let state = Arc::new(PortalState {
            base_url: format!("http://{addr}"),
            signer: RequestSigner::new(HMAC_USER, HMAC_KEY).expect("test signer"),
            reports,
            list_hits: AtomicUsize::new(0),
            blob_hits: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/Token", post(token))
            .route("/GetReportBlobs", get(list_reports))
            .route("/blobs/:name", get(blob))
            .with_state(state.clone());

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
                .expect("portal runtime");
            runtime.block_on(async move {
                let listener =
                    tokio::net::TcpListener::from_std(listener).expect("tokio listener");
                axum::serve(listener, app).await.expect("portal serve");
            });
        });

        Self { state }
    }

    pub fn base_url(&self) -> &str {
        &self.state.base_url
    }

    pub fn blob_uri(&self, name: &str) -> String {
        format!("{}/blobs/{name}", self.state.base_url)
    }

    pub fn list_hits(&self) -> usize {
        self.state.list_hits.load(Ordering::SeqCst)
    }

    pub fn blob_hits(&self) -> usize {
        self.state.blob_hits.load(Ordering::SeqCst)
    }
}

/// `Prefix_YYYY-MM-DD.csv` for a day `days_ago` before today (UTC).
pub fn dated_name(prefix: &str, days_ago: i64) -> String {
    let day = OffsetDateTime::now_utc().date() - Duration::days(days_ago);
    format!("{prefix}_{}.csv", format_date(day))
}

/// Two recent reports and one outside the default fifteen-day window.
pub fn sample_reports() -> Vec<(String, Vec<u8>)> {
    vec![
        (dated_name("Daily", 2), b"id,amount\n1,10\n".to_vec()),
        (dated_name("Weekly", 4), b"id,amount\n2,20\n3,30\n".to_vec()),
        (dated_name("Archive", 60), b"id,amount\n".to_vec()),
    ]
}

fn bearer_ok(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(|value| value == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

fn signature_ok(state: &PortalState, uri: &Uri, headers: &HeaderMap) -> bool {
    let signed_url = format!("{}{}", state.base_url, uri);
    headers
        .get(HMAC_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| state.signer.verify("GET", &signed_url, value))
        .unwrap_or(false)
}

fn field<'a>(form: &'a HashMap<String, String>, key: &str) -> &'a str {
    form.get(key).map(String::as_str).unwrap_or_default()
}

async fn token(Form(form): Form<HashMap<String, String>>) -> Response {
    if field(&form, "grant_type") != "password" || field(&form, "username") != USERNAME {
        return (StatusCode::BAD_REQUEST, "unsupported grant").into_response();
    }
    if field(&form, "password") != PASSWORD {
        return (StatusCode::UNAUTHORIZED, "invalid_grant").into_response();
    }
    Json(json!({ "access_token": TOKEN, "token_type": "bearer", "expires_in": 3600 }))
        .into_response()
}

async fn list_reports(
    State(state): State<Arc<PortalState>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.list_hits.fetch_add(1, Ordering::SeqCst);
    if !bearer_ok(&headers) {
        return (StatusCode::UNAUTHORIZED, "missing bearer token").into_response();
    }
    if !signature_ok(&state, &uri, &headers) {
        return (StatusCode::FORBIDDEN, "signature mismatch").into_response();
    }
    let listing: Vec<_> = state
        .reports
        .iter()
        .map(|(name, _)| {
            json!({
                "ReportName": name,
                "ReportBlobUri": format!("{}/blobs/{name}", state.base_url),
            })
        })
        .collect();
    // the portal returns the list as a JSON string holding JSON
    let inner = serde_json::to_string(&listing).unwrap_or_default();
    Json(inner).into_response()
}

async fn blob(
    State(state): State<Arc<PortalState>>,
    Path(name): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    state.blob_hits.fetch_add(1, Ordering::SeqCst);
    if !bearer_ok(&headers) || !signature_ok(&state, &uri, &headers) {
        return (StatusCode::FORBIDDEN, "signature mismatch").into_response();
    }
    match state.reports.iter().find(|(report, _)| report == &name) {
        Some((_, body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv")],
            body.clone(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no such blob").into_response(),
    }
}
