// This file is part of Facetrack, a multi-stream face re-identification service.
// See AUTHORS and LICENSE.

use std::net::SocketAddr;
use std::sync::Arc;

use base::{shutdown, Error};
use bpaf::Bpaf;
use registry::{Tracker, TrackerConfig};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::watchlist_store::{self, PgConfig};
use crate::web::{self, AppState};

/// Runs the face re-identification and watchlist-matching service.
#[derive(Bpaf, Debug, Clone)]
#[bpaf(options, version(crate::VERSION))]
pub struct Args {
    /// Bind address for the control/preview HTTP server.
    #[bpaf(long, argument("ADDR"), fallback("0.0.0.0:8080".parse().unwrap()), debug_fallback)]
    http_addr: SocketAddr,

    /// Seconds between automatic watchlist reloads. 0 disables polling;
    /// `/api/reload_db` still reloads on demand.
    #[bpaf(long, argument("SECONDS"), fallback(300.0), debug_fallback)]
    db_poll_interval: f64,

    /// The number of worker threads used by the asynchronous runtime.
    /// Defaults to the number of cores on the system.
    #[bpaf(long, argument("N"))]
    worker_threads: Option<usize>,

    /// Skip the watchlist database and serve demo streams from the built-in
    /// fixture source/detector instead of requiring PG_* to be set.
    #[bpaf(long)]
    fixture: bool,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(worker_threads) = args.worker_threads {
        builder.worker_threads(worker_threads);
    }
    builder.build().expect("building the tokio runtime").block_on(async_run(args))
}

async fn async_run(args: Args) -> Result<i32, Error> {
    let tracker = Arc::new(Tracker::new(TrackerConfig::default()));

    let pg_config = if args.fixture {
        None
    } else {
        match PgConfig::from_env() {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                warn!(err = %e.chain(), "watchlist database not configured, running with an empty watchlist");
                None
            }
        }
    };
    if let Some(cfg) = &pg_config {
        let records = watchlist_store::load_or_empty(cfg).await;
        tracker.reload_watchlist(registry::Watchlist::new(records));
    }
    info!("tracker ready");

    let state = Arc::new(AppState::new(tracker, pg_config));

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    let poll_task = if args.db_poll_interval > 0.0 {
        let state = state.clone();
        let rx = shutdown_rx.clone();
        let interval = std::time::Duration::from_secs_f64(args.db_poll_interval);
        Some(tokio::spawn(async move { poll_watchlist(state, rx, interval).await }))
    } else {
        None
    };

    let http_addr = args.http_addr;
    let server = tokio::spawn({
        let state = state.clone();
        let rx = shutdown_rx.clone();
        async move { web::serve(http_addr, state, rx).await }
    });

    let mut int = signal(SignalKind::interrupt()).map_err(|e| base::err!(Internal, "installing SIGINT handler: {}", e))?;
    let mut term = signal(SignalKind::terminate()).map_err(|e| base::err!(Internal, "installing SIGTERM handler: {}", e))?;
    tokio::select! {
        _ = int.recv() => info!("received SIGINT"),
        _ = term.recv() => info!("received SIGTERM"),
    }

    drop(shutdown_tx);
    server.await.map_err(|e| base::err!(Internal, "HTTP server task panicked: {}", e))??;
    if let Some(poll_task) = poll_task {
        let _ = poll_task.await;
    }

    info!("exiting");
    Ok(0)
}

async fn poll_watchlist(state: Arc<AppState>, shutdown_rx: shutdown::Receiver, interval: std::time::Duration) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown_rx.as_future() => return,
        }
        let Some(cfg) = state.pg_config.as_ref() else { continue };
        let records = watchlist_store::load_or_empty(cfg).await;
        state.tracker.reload_watchlist(registry::Watchlist::new(records));
    }
}

