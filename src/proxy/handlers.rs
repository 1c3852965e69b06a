use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::api::wire::{DeliverStimulusRequest, DeliverStimulusResponse};

use super::{
    pavlok::DeliveryStatus,
    upstream::{ForwardedResponse, Upstream},
    ProxyState,
};

pub struct ProxyError {
    upstream: Upstream,
    source: reqwest::Error,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::warn!(
            target: "proxy",
            upstream = %self.upstream,
            error = %self.source,
            "upstream request failed"
        );
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "detail": format!("Failed to reach {}: {}", self.upstream, self.source)
            })),
        )
            .into_response()
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Screen Shock API is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn api_root() -> Json<Value> {
    Json(json!({ "message": "Screen Shock API is running" }))
}

pub async fn generate_config(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse, ProxyError> {
    tracing::info!(target: "proxy", bytes = body.len(), "POST /api/generate-config");
    forward(&state, Upstream::GenerateConfig, &headers, body).await
}

pub async fn evaluate_capture(
    State(state): State<Arc<ProxyState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse, ProxyError> {
    tracing::debug!(target: "proxy", bytes = body.len(), "POST /api/evaluate-capture-for-trigger");
    forward(&state, Upstream::EvaluateCapture, &headers, body).await
}

pub async fn deliver_stimulus(
    State(state): State<Arc<ProxyState>>,
    payload: Result<Json<DeliverStimulusRequest>, JsonRejection>,
) -> (StatusCode, Json<DeliverStimulusResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(target: "proxy", error = %rejection.body_text(), "malformed stimulus request");
            return (
                StatusCode::BAD_REQUEST,
                Json(DeliverStimulusResponse {
                    success: false,
                    message: rejection.body_text(),
                    data: None,
                    error: None,
                }),
            );
        }
    };
    let report = state.pavlok.deliver(&request).await;
    let status = match report.status {
        DeliveryStatus::Delivered => StatusCode::OK,
        DeliveryStatus::Invalid => StatusCode::BAD_REQUEST,
        DeliveryStatus::Failed => StatusCode::BAD_GATEWAY,
    };
    (status, Json(report.body))
}

async fn forward(
    state: &ProxyState,
    upstream: Upstream,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<ForwardedResponse, ProxyError> {
    state
        .upstream
        .forward(upstream, headers.get(header::CONTENT_TYPE).cloned(), body)
        .await
        .map_err(|source| ProxyError { upstream, source })
}
