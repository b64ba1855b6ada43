//! axum glue shared by the demo servers

use std::convert::Infallible;
use std::future::Future;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use sse_hub::ChannelSink;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber, honouring `RUST_LOG` when set
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Run `serve` against a fresh sink and answer with whatever it writes
///
/// `cancel` is handed to `serve` and is cancelled when axum drops the body,
/// which is how a client disconnect reaches the delivery session.
pub async fn stream_response<F, Fut>(cancel: CancellationToken, serve: F) -> Response
where
    F: FnOnce(ChannelSink, CancellationToken) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (sink, pending) = sse_hub::response_channel(16);
    let disconnect = cancel.clone().drop_guard();
    tokio::spawn(serve(sink, cancel));

    let Some((head, body)) = pending.into_parts().await else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let chunks = ReceiverStream::new(body).map(move |chunk| {
        let _ = &disconnect;
        Ok::<_, Infallible>(chunk)
    });

    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() =
        StatusCode::from_u16(head.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in head.headers {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().insert(name, value);
            }
            _ => tracing::warn!("Dropping invalid response header"),
        }
    }
    response
}
