//! Ping event server
//!
//! Every client of `GET /events?host=<host>` gets its own hub fed by a `ping`
//! process for that host. `GET /state` reports how many clients are
//! connected. Ctrl-C (or five minutes) stops every stream and the server.
//!
//! Run with: cargo run --example ping_server
//! Then: curl -N "http://localhost:3000/events?host=localhost"

mod support;

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use sse_hub::Hub;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
struct PingEvent {
    duration: String,
    host: String,
}

#[derive(Clone, Default)]
struct AppState {
    clients: Arc<AtomicI64>,
    shutdown: CancellationToken,
}

/// Counts a connected client until dropped
struct Connected(Arc<AtomicI64>);

impl Connected {
    fn new(clients: Arc<AtomicI64>) -> Self {
        clients.fetch_add(1, Ordering::Relaxed);
        Self(clients)
    }
}

impl Drop for Connected {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    support::init_tracing("info");

    let state = AppState::default();
    let app = Router::new()
        .route("/state", get(connected_clients))
        .route("/events", get(events))
        .with_state(state.clone());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "Ping server listening");

    let shutdown = state.shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
        _ = tokio::time::sleep(Duration::from_secs(300)) => tracing::info!("Run time elapsed"),
    }

    tracing::info!("Starting server shutdown");
    // Ends every ping monitor and event stream
    state.shutdown.cancel();

    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(Ok(Ok(()))) => {
            tracing::info!("Server shutdown gracefully");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e.into()),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            tracing::error!("Server shutdown timed out");
            std::process::exit(1);
        }
    }
}

async fn connected_clients(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "clients": state.clients.load(Ordering::Relaxed) }))
}

async fn events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let host = match params.get("host") {
        None => return (StatusCode::BAD_REQUEST, "missing host query param\n").into_response(),
        Some(host) if host.is_empty() => {
            return (StatusCode::BAD_REQUEST, "empty host query param\n").into_response()
        }
        Some(host) => host.clone(),
    };

    // One hub per request, with the default configuration
    let hub: Hub<PingEvent> = Hub::default();
    let cancel = state.shutdown.child_token();
    tokio::spawn(monitor_ping(hub.clone(), host.clone(), cancel.clone()));

    let clients = Arc::clone(&state.clients);
    support::stream_response(cancel, move |mut sink, cancel| async move {
        let _connected = Connected::new(clients);
        tracing::info!(host = %host, "Client connected");

        hub.handle(&mut sink, cancel.clone()).await;
        tracing::info!(host = %host, "Client disconnected");

        cancel.cancel();
        if let Err(e) = hub.shutdown().await {
            tracing::warn!(error = %e, "Hub shutdown failed");
        }
    })
    .await
}

/// Broadcast the round-trip time of every ping reply until cancelled
///
/// The client's session ends with the ping process.
async fn monitor_ping(hub: Hub<PingEvent>, host: String, cancel: CancellationToken) {
    let _done = cancel.clone().drop_guard();

    let mut child = match Command::new("ping")
        .arg(&host)
        .stdout(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "Unable to start ping command");
            return;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        return;
    };
    tracing::info!(host = %host, pid = ?child.id(), "Started ping command");

    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) => {
                let Some(duration) = parse_ping_duration(&line) else {
                    continue;
                };
                let event = PingEvent {
                    duration,
                    host: host.clone(),
                };
                if let Err(e) = hub.broadcast(event).await {
                    tracing::warn!(error = %e, "Unable to broadcast ping result");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read ping output");
                break;
            }
        }
    }
}

/// Extract `12.3ms` from a line like `... time=12.3 ms`
fn parse_ping_duration(line: &str) -> Option<String> {
    let (_, after) = line.split_once("time=")?;
    Some(after.replace(' ', ""))
}
