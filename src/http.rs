//! HTTP surface for the publish action.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! - `POST /publish` - body `{ "topic": .., "message": .., "hosts": .. }`, returns
//!   `{ "topic", "partition", "offset", "error" }`.
//! - `GET /health` - returns `{ "ok": true }`.
//!
//! Failures return `{ "error": "..." }` with the status from
//! `PublishError::status_code`.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use broker_bridge::{http, KafkaConnector, Publisher, PublisherOptions};
//!
//! let publisher = Arc::new(Publisher::new(
//!     KafkaConnector::new(),
//!     PublisherOptions::new().with_hosts("broker:9092"),
//! ));
//!
//! http::serve(publisher, "0.0.0.0:3000").await?;
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::broker::BrokerConnector;
use crate::publisher::Publisher;

/// Body of `POST /publish`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub topic: String,
    /// Sent verbatim when a string, otherwise as its JSON text.
    pub message: Value,
    #[serde(default)]
    pub hosts: Option<String>,
}

impl PublishRequest {
    fn message_text(&self) -> String {
        match &self.message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// Build an axum `Router` that publishes through the given publisher.
pub fn router<C: BrokerConnector + 'static>(publisher: Arc<Publisher<C>>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/publish", post(publish_handler::<C>))
        .with_state(publisher)
}

/// Serve the publisher over HTTP at the given address (e.g. `"0.0.0.0:3000"`).
pub async fn serve<C: BrokerConnector + 'static>(
    publisher: Arc<Publisher<C>>,
    addr: &str,
) -> Result<(), std::io::Error> {
    let app = router(publisher);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

/// `POST /publish` - runs the blocking publish on the blocking pool.
async fn publish_handler<C: BrokerConnector + 'static>(
    State(publisher): State<Arc<Publisher<C>>>,
    Json(request): Json<PublishRequest>,
) -> Response {
    let outcome = tokio::task::spawn_blocking(move || {
        let message = request.message_text();
        publisher.publish(&request.topic, &message, request.hosts.as_deref())
    })
    .await;

    match outcome {
        Ok(Ok(delivery)) => (StatusCode::OK, Json(delivery)).into_response(),
        Ok(Err(e)) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = json!({ "error": e.to_string() });
            (status, Json(body)).into_response()
        }
        Err(e) => {
            error!(error = %e, "publish task failed");
            let body = json!({ "error": "publish task failed" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}
