use reqwest::{header::CONTENT_TYPE, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} (status {status})")]
    Remote { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response body: {0}")]
    UnexpectedBody(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Json(Value),
    Text(String),
}

impl ResponsePayload {
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            ResponsePayload::Json(value) => {
                serde_json::from_value(value).map_err(|err| ApiError::UnexpectedBody(err.to_string()))
            }
            ResponsePayload::Text(text) => Err(ApiError::UnexpectedBody(format!(
                "expected JSON, got text: {}",
                preview(&text)
            ))),
        }
    }
}

pub async fn handle_response(response: Response) -> Result<ResponsePayload, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let fallback = format!("HTTP error! status: {}", status.as_u16());
        let message = match response.json::<Value>().await {
            Ok(body) => error_message(&body).unwrap_or(fallback),
            Err(_) => fallback,
        };
        return Err(ApiError::Remote {
            status: status.as_u16(),
            message,
        });
    }

    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.contains("application/json"));

    if is_json {
        Ok(ResponsePayload::Json(response.json().await?))
    } else {
        Ok(ResponsePayload::Text(response.text().await?))
    }
}

/// `detail` first (the remote services' error shape), then `message`.
pub fn error_message(body: &Value) -> Option<String> {
    for key in ["detail", "message"] {
        match body.get(key) {
            Some(Value::String(text)) if !text.trim().is_empty() => return Some(text.clone()),
            Some(Value::String(_)) | Some(Value::Null) | None => continue,
            Some(other) => return Some(other.to_string()),
        }
    }
    None
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 120;
    match text.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
