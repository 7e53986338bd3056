// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

//! The control/preview HTTP server (spec §6): start/stop streams, an MJPEG
//! preview, stats/diagnostics, and the watchlist-maintenance triggers. Built
//! on a manual `hyper` 1.x accept loop, the modern equivalent of the
//! teacher's `hyper::Server` usage from before the 1.0 split.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base::clock::{Clocks, RealClocks};
use base::{shutdown, Error};
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use registry::Tracker;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::json::{
    ErrorResponse, SharedStatsResponse, StartStreamRequest, StartStreamResponse, StopStreamRequest, StreamListEntry,
    StreamStatusResponse, SuspiciousRecord,
};
use crate::stream::{FaceDetector, FixtureDetector, FixtureSource, StreamWorker};
use crate::watchlist_store::PgConfig;

type Body = BoxBody<Bytes, Infallible>;

/// State shared by every connection, owning the stream registry and the
/// watchlist database's connection parameters (the connection itself is
/// opened and dropped per load — see `watchlist_store`).
pub struct AppState {
    pub tracker: Arc<Tracker>,
    pub streams: Mutex<HashMap<String, StreamWorker>>,
    pub pg_config: Option<PgConfig>,
    pub fixture_dims: (u32, u32),
}

impl AppState {
    pub fn new(tracker: Arc<Tracker>, pg_config: Option<PgConfig>) -> Self {
        AppState { tracker, streams: Mutex::new(HashMap::new()), pg_config, fixture_dims: (640, 480) }
    }
}

fn full(data: impl Into<Bytes>) -> Body {
    Full::new(data.into()).boxed()
}

fn json_response<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let bytes = serde_json::to_vec(value).expect("response type always serializes");
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(full(bytes))
        .expect("hardcoded response head is valid")
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response<Body> {
    json_response(status, &ErrorResponse { error: message.into() })
}

fn not_found() -> Response<Body> {
    error_response(StatusCode::NOT_FOUND, "not found")
}

/// Splits a path into segments, ignoring a leading/trailing slash.
fn segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

async fn read_json<T: serde::de::DeserializeOwned>(req: Request<Incoming>) -> Result<T, Response<Body>> {
    let bytes = req
        .collect()
        .await
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("reading request body: {e}")))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("invalid JSON body: {e}")))
}

async fn handle(req: Request<Incoming>, state: Arc<AppState>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let segs = segments(&path);

    let response = match (&method, segs.as_slice()) {
        (&Method::POST, ["api", "start_stream"]) => start_stream(req, &state).await,
        (&Method::POST, ["api", "stop_stream"]) => stop_stream(req, &state).await,
        (&Method::GET, ["video_feed", stream_id]) => video_feed(stream_id, &state),
        (&Method::GET, ["api", "list_streams"]) => list_streams(&state),
        (&Method::GET, ["api", "stream_status", stream_id]) => stream_status(stream_id, &state),
        (&Method::GET, ["api", "shared_stats"]) => shared_stats(&state),
        (&Method::GET, ["api", "get-suspicious-data"]) => get_suspicious_data(&state),
        (&Method::POST, ["api", "reload_db"]) => reload_db(&state).await,
        (&Method::POST, ["api", "cleanup_faces"]) => cleanup_faces(&state),
        (&Method::POST, ["api", "consolidate_ids"]) => consolidate_ids(&state),
        _ => not_found(),
    };
    Ok(response)
}

async fn start_stream(req: Request<Incoming>, state: &AppState) -> Response<Body> {
    let body: StartStreamRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let stream_id = body.stream_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    let (w, h) = state.fixture_dims;
    let source = Box::new(FixtureSource::new(u32::MAX, w, h));
    let bbox = registry::BBox::new(80, 80, 80 + 160, 80 + 160);
    let embedding = crate::stream::demo_embedding(&stream_id);
    let detector: Arc<dyn FaceDetector> = Arc::new(FixtureDetector::new(bbox, embedding));
    let worker = StreamWorker::start(stream_id.clone(), body.url, source, detector, state.tracker.clone());

    let mut streams = state.streams.lock().unwrap();
    streams.insert(stream_id.clone(), worker);
    json_response(StatusCode::OK, &StartStreamResponse { stream_id })
}

async fn stop_stream(req: Request<Incoming>, state: &AppState) -> Response<Body> {
    let body: StopStreamRequest = match read_json(req).await {
        Ok(b) => b,
        Err(resp) => return resp,
    };
    let removed = state.streams.lock().unwrap().remove(&body.stream_id);
    match removed {
        Some(_) => json_response(StatusCode::OK, &serde_json::json!({"stopped": true})),
        None => error_response(StatusCode::NOT_FOUND, format!("no such stream {}", body.stream_id)),
    }
}

const MJPEG_BOUNDARY: &str = "frame";
const MJPEG_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn video_feed(stream_id: &str, state: &AppState) -> Response<Body> {
    let handle = {
        let streams = state.streams.lock().unwrap();
        match streams.get(stream_id) {
            Some(w) => w.latest_frame_handle(),
            None => return error_response(StatusCode::NOT_FOUND, format!("no such stream {stream_id}")),
        }
    };

    let stream = futures::stream::unfold(handle, |handle| async move {
        loop {
            tokio::time::sleep(MJPEG_POLL_INTERVAL).await;
            let Some(jpeg) = handle.lock().unwrap().clone() else { continue };
            let mut chunk = format!(
                "--{MJPEG_BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
                jpeg.len()
            )
            .into_bytes();
            chunk.extend_from_slice(&jpeg);
            chunk.extend_from_slice(b"\r\n");
            return Some((Ok::<_, Infallible>(Frame::data(Bytes::from(chunk))), handle));
        }
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(http::header::CONTENT_TYPE, format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"))
        .body(StreamBody::new(stream).boxed())
        .expect("hardcoded response head is valid")
}

fn list_streams(state: &AppState) -> Response<Body> {
    let streams = state.streams.lock().unwrap();
    let entries: Vec<StreamListEntry> = streams
        .iter()
        .map(|(id, w)| {
            let s = w.status();
            StreamListEntry { stream_id: id.clone(), url: s.url, streaming: s.streaming }
        })
        .collect();
    json_response(StatusCode::OK, &entries)
}

fn stream_status(stream_id: &str, state: &AppState) -> Response<Body> {
    let streams = state.streams.lock().unwrap();
    match streams.get(stream_id) {
        Some(w) => {
            let s = w.status();
            json_response(StatusCode::OK, &StreamStatusResponse { streaming: s.streaming, stream_url: s.url, has_error: s.has_error })
        }
        None => not_found(),
    }
}

fn shared_stats(state: &AppState) -> Response<Body> {
    let stats = state.tracker.stats();
    let cfg = state.tracker.config();
    let suspicious_ids: Vec<u64> = state.tracker.suspicious_matches().into_iter().map(|(id, _)| id).collect();
    json_response(
        StatusCode::OK,
        &SharedStatsResponse {
            total_faces: stats.lifetime_faces,
            lifetime_faces: stats.lifetime_faces,
            active_faces: stats.active_faces,
            suspicious_faces: stats.suspicious_faces,
            clean_faces: stats.clean_faces,
            database_entries: state.tracker.watchlist_len(),
            suspicious_ids,
            tracking_threshold: cfg.tracking_threshold,
            consolidation_threshold: cfg.consolidation_threshold,
            face_timeout: cfg.face_timeout_s,
            next_id: stats.next_id,
            consolidation_check_interval: cfg.consolidation_check_interval,
        },
    )
}

fn get_suspicious_data(state: &AppState) -> Response<Body> {
    let records: Vec<SuspiciousRecord> = state
        .tracker
        .suspicious_matches()
        .into_iter()
        .map(|(id, m)| SuspiciousRecord {
            id,
            score: m.score,
            name: m.record.name,
            nickname: m.record.nickname,
            age: m.record.age,
            police_station: m.record.police_station,
            crime_and_section: m.record.crime_and_section,
            head_of_crime: m.record.head_of_crime,
            arrested_date: m.record.arrested_date,
            image_url: m.record.image_url,
        })
        .collect();
    json_response(StatusCode::OK, &records)
}

async fn reload_db(state: &AppState) -> Response<Body> {
    let Some(cfg) = state.pg_config.as_ref() else {
        return error_response(StatusCode::PRECONDITION_FAILED, "no watchlist database configured");
    };
    let records = crate::watchlist_store::load_or_empty(cfg).await;
    let count = records.len();
    state.tracker.reload_watchlist(registry::Watchlist::new(records));
    json_response(StatusCode::OK, &serde_json::json!({"reloaded": count}))
}

fn cleanup_faces(state: &AppState) -> Response<Body> {
    state.tracker.force_cleanup(RealClocks {}.realtime());
    json_response(StatusCode::OK, &serde_json::json!({"ok": true}))
}

fn consolidate_ids(state: &AppState) -> Response<Body> {
    state.tracker.force_consolidate(RealClocks {}.realtime());
    json_response(StatusCode::OK, &serde_json::json!({"ok": true}))
}

/// Runs the accept loop until `shutdown_rx` fires, then waits (bounded) for
/// in-flight connections to finish (spec §5's bounded-join pattern, applied
/// to HTTP connections instead of stream worker threads).
pub async fn serve(addr: SocketAddr, state: Arc<AppState>, shutdown_rx: shutdown::Receiver) -> Result<(), Error> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| base::err!(Unavailable, "binding {}: {}", addr, e))?;
    info!(%addr, "listening for HTTP requests");
    serve_on(listener, state, shutdown_rx).await
}

async fn serve_on(listener: TcpListener, state: Arc<AppState>, shutdown_rx: shutdown::Receiver) -> Result<(), Error> {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(v) => v,
                    Err(e) => { warn!(err = %e, "accept failed"); continue; }
                };
                let io = TokioIo::new(stream);
                let state = state.clone();
                let conn = http1::Builder::new().serve_connection(io, service_fn(move |req| handle(req, state.clone())));
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        warn!(%peer, err = %e, "connection error");
                    }
                });
            }
            _ = shutdown_rx.as_future() => {
                info!("HTTP server shutting down");
                break;
            }
        }
    }
    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            warn!("timed out waiting for in-flight HTTP connections to finish");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::TrackerConfig;

    #[test]
    fn segments_ignores_surrounding_slashes() {
        assert_eq!(segments("/api/list_streams"), vec!["api", "list_streams"]);
        assert_eq!(segments("/video_feed/abc/"), vec!["video_feed", "abc"]);
    }

    #[test]
    fn not_found_has_404_status() {
        assert_eq!(not_found().status(), StatusCode::NOT_FOUND);
    }

    /// A running server on an ephemeral port, for `reqwest`-driven tests.
    /// Mirrors the thread-plus-background-runtime harness the control API's
    /// teacher uses for its own `hyper` integration tests.
    struct Server {
        base_url: String,
        shutdown_tx: Option<shutdown::Sender>,
        handle: Option<std::thread::JoinHandle<()>>,
    }

    impl Server {
        fn new() -> Server {
            let tracker = Arc::new(Tracker::new(TrackerConfig::default()));
            let state = Arc::new(AppState::new(tracker, None));
            let (shutdown_tx, shutdown_rx) = shutdown::channel();
            let (addr_tx, addr_rx) = std::sync::mpsc::channel();

            let handle = std::thread::spawn(move || {
                let rt = tokio::runtime::Runtime::new().unwrap();
                rt.block_on(async move {
                    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                    addr_tx.send(listener.local_addr().unwrap()).unwrap();
                    serve_on(listener, state, shutdown_rx).await.unwrap();
                });
            });
            let addr = addr_rx.recv().unwrap();

            Server { base_url: format!("http://{addr}"), shutdown_tx: Some(shutdown_tx), handle: Some(handle) }
        }
    }

    impl Drop for Server {
        fn drop(&mut self) {
            drop(self.shutdown_tx.take());
            self.handle.take().unwrap().join().unwrap();
        }
    }

    #[test]
    fn unknown_route_returns_404() {
        let s = Server::new();
        let cli = reqwest::blocking::Client::new();
        let resp = cli.get(format!("{}/nope", s.base_url)).send().unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[test]
    fn start_list_and_stop_stream_round_trip() {
        let s = Server::new();
        let cli = reqwest::blocking::Client::new();

        let resp = cli
            .post(format!("{}/api/start_stream", s.base_url))
            .json(&serde_json::json!({"url": "rtsp://example.test/cam"}))
            .send()
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let started: serde_json::Value = resp.json().unwrap();
        let stream_id = started["stream_id"].as_str().unwrap().to_owned();

        let resp = cli.get(format!("{}/api/list_streams", s.base_url)).send().unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let entries: serde_json::Value = resp.json().unwrap();
        assert!(entries.as_array().unwrap().iter().any(|e| e["stream_id"] == stream_id));

        let resp = cli
            .post(format!("{}/api/stop_stream", s.base_url))
            .json(&serde_json::json!({"stream_id": stream_id}))
            .send()
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        let resp = cli
            .post(format!("{}/api/stop_stream", s.base_url))
            .json(&serde_json::json!({"stream_id": stream_id}))
            .send()
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    }

    #[test]
    fn shared_stats_reports_empty_registry() {
        let s = Server::new();
        let cli = reqwest::blocking::Client::new();
        let resp = cli.get(format!("{}/api/shared_stats", s.base_url)).send().unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let stats: serde_json::Value = resp.json().unwrap();
        assert_eq!(stats["active_faces"], 0);
        assert_eq!(stats["database_entries"], 0);
    }

    #[test]
    fn reload_db_without_config_is_precondition_failed() {
        let s = Server::new();
        let cli = reqwest::blocking::Client::new();
        let resp = cli.post(format!("{}/api/reload_db", s.base_url)).send().unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::PRECONDITION_FAILED);
    }
}
