//! Custom event server with graceful shutdown
//!
//! Broadcasts pairs of structured events on `GET /events`, and shuts the hub
//! down on Ctrl-C or after five minutes, waiting for connected clients to
//! leave.
//!
//! Run with: cargo run --example custom_event_server

mod support;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use sse_hub::{Hub, HubConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Serialize)]
struct CustomEvent {
    id: String,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn create_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("{:016x}-{:08x}", millis, NEXT_ID.fetch_add(1, Ordering::Relaxed))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    support::init_tracing("info");

    let config = HubConfig::new().close_timeout(Duration::from_secs(10));
    let hub: Hub<CustomEvent> = Hub::new(config);

    let producer = hub.clone();
    tokio::spawn(async move {
        loop {
            let events = [CustomEvent { id: create_id() }, CustomEvent { id: create_id() }];
            if let Err(e) = producer.publish(events).await {
                tracing::info!(error = %e, "Producer stopped");
                return;
            }
            tokio::time::sleep(Duration::from_millis(64)).await;
        }
    });

    let app = Router::new()
        .route("/events", get(events))
        .with_state(hub.clone());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "Custom event server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutdown signal received"),
        _ = tokio::time::sleep(Duration::from_secs(300)) => tracing::info!("Run time elapsed"),
    }

    match hub.shutdown().await {
        Ok(()) => {
            tracing::info!("Server shutdown gracefully");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Server shutdown with error");
            std::process::exit(1);
        }
    }
}

async fn events(State(hub): State<Hub<CustomEvent>>) -> Response {
    support::stream_response(CancellationToken::new(), move |mut sink, cancel| async move {
        tracing::info!("Client connected");
        hub.handle(&mut sink, cancel).await;
        tracing::info!("Client disconnected");
    })
    .await
}
