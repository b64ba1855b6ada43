//! Minimal event server
//!
//! Broadcasts an increasing counter every 64ms to every client connected to
//! `GET /events` on port 3000, using the default hub configuration.
//!
//! Run with: cargo run --example event_server
//! Then: curl -N http://localhost:3000/events

mod support;

use std::time::Duration;

use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use sse_hub::Hub;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    support::init_tracing("info,sse_hub=debug");

    let hub: Hub<i64> = Hub::default();

    let producer = hub.clone();
    tokio::spawn(async move {
        let mut event = 0i64;
        loop {
            if let Err(e) = producer.broadcast(event).await {
                tracing::info!(error = %e, "Producer stopped");
                return;
            }
            event += 1;
            tokio::time::sleep(Duration::from_millis(64)).await;
        }
    });

    let app = Router::new()
        .route("/events", get(events))
        .with_state(hub);

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!(addr = %listener.local_addr()?, "Event server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn events(State(hub): State<Hub<i64>>) -> Response {
    support::stream_response(CancellationToken::new(), move |mut sink, cancel| async move {
        hub.handle(&mut sink, cancel).await;
    })
    .await
}
