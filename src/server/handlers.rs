//! HTTP handlers for the bootstrap page and the stream endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Host, Query, State};
use axum::http::HeaderMap;
use axum::response::{Html, IntoResponse};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::page::{render_home, PageData};
use crate::session::{Session, SessionTimings};
use crate::tail::{ChangeDetector, Cursor};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Change detector for the target file, shared by every session.
    pub detector: Arc<ChangeDetector>,
    /// Timers applied to each session.
    pub timings: SessionTimings,
    /// Target file name shown on the page.
    pub filename: String,
    /// Parent token of every session.
    pub shutdown: CancellationToken,
}

/// Query parameters for GET /stream.
///
/// Kept as raw strings so malformed values fall back to zero instead of
/// rejecting the upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "modTime")]
    pub mod_time: Option<String>,
    pub offset: Option<String>,
}

impl StreamQuery {
    /// The cursor the client wants to resume from.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor::from_params(self.mod_time.as_deref(), self.offset.as_deref())
    }
}

/// Best guess at the client's address, for logging.
///
/// Prefers the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded
        .or(real_ip)
        .map(String::from)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// GET / - Full snapshot of the file plus the cursor to resume from.
pub async fn get_home(State(state): State<AppState>, Host(host): Host) -> Html<String> {
    let (content, cursor) = match state.detector.snapshot().await {
        Ok(delta) => (delta.text().into_owned(), delta.cursor),
        Err(e) => {
            tracing::warn!(error = %e, kind = e.kind(), "Snapshot read failed");
            (e.to_string(), Cursor::start())
        }
    };

    Html(render_home(&PageData {
        filename: &state.filename,
        content: &content,
        cursor,
        host: &host,
    }))
}

/// GET /stream - Upgrade to a WebSocket and follow the file from a cursor.
pub async fn get_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> impl IntoResponse {
    let cursor = query.cursor();
    let ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let limit = state.timings.max_message_size;

    let session = Session::new(state.detector.clone(), cursor, state.timings)
        .with_cancellation(&state.shutdown)
        .with_peer(ip);

    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            session.run(sink, stream).await;
        })
}
