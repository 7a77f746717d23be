//! Synchronous HTTP front end for the politeness classifier.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::bail_api;
use crate::error::ApiResult;
use crate::inference::task::classify::{ClassifyHandler, ClassifyRequest, ClassifyResponse};
use crate::worker::protocol::Ack;

pub type SharedClassifier = Arc<dyn ClassifyHandler + Send + Sync>;

/// HTTP body of `/classify`. Unlike the line protocol, `text` is required here.
#[derive(Deserialize, Debug)]
pub struct ClassifyBody {
    pub text: String,
}

impl From<ClassifyBody> for ClassifyRequest {
    fn from(body: ClassifyBody) -> Self {
        ClassifyRequest { text: body.text }
    }
}

/// Builds the router. The classifier is loaded before this is called, so the
/// health check only answers once startup has completed.
pub fn router(classifier: SharedClassifier) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/classify", post(handle_classify))
        .layer(TraceLayer::new_for_http())
        .with_state(classifier)
}

#[axum_macros::debug_handler]
async fn handle_healthz() -> Json<Ack> {
    Json(Ack::ok())
}

#[axum_macros::debug_handler]
async fn handle_classify(
    State(classifier): State<SharedClassifier>,
    body: Result<Json<ClassifyBody>, JsonRejection>,
) -> ApiResult<Json<ClassifyResponse>> {
    let request = match body {
        Ok(Json(body)) => ClassifyRequest::from(body),
        Err(rejection) => bail_api!(rejection.status(), rejection.body_text()),
    };

    // Inference monopolizes the thread until it completes.
    let response =
        tokio::task::spawn_blocking(move || classifier.run_classify(request)).await??;
    Ok(Json(response))
}
