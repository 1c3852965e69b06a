use reqwest::{header::ACCEPT, Client};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::{
    api::wire::{DeliverStimulusRequest, DeliverStimulusResponse},
    config::StimulusDefaults,
    domain::StimulusKind,
};

pub const PAVLOK_STIMULUS_URL: &str = "https://api.pavlok.com/api/v5/stimulus/send";

#[derive(Debug, Serialize)]
struct StimulusEnvelope {
    stimulus: Stimulus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Stimulus {
    stimulus_type: StimulusKind,
    stimulus_value: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    Delivered,
    /// Rejected before reaching the device API.
    Invalid,
    /// Transport failure or non-2xx from the device API.
    Failed,
}

#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub status: DeliveryStatus,
    pub body: DeliverStimulusResponse,
}

#[derive(Clone)]
pub struct PavlokClient {
    http: Client,
    url: Url,
    defaults: StimulusDefaults,
}

impl PavlokClient {
    pub fn new(http: Client, url: Url, defaults: StimulusDefaults) -> Self {
        Self {
            http,
            url,
            defaults,
        }
    }

    pub async fn deliver(&self, request: &DeliverStimulusRequest) -> DeliveryReport {
        let token = request.pavlok_token.trim();
        if token.is_empty() {
            return invalid("Missing Pavlok token");
        }

        let stimulus_value = match request.stimulus_value {
            None => self.defaults.value,
            Some(value) if (1..=100).contains(&value) => value as u8,
            Some(value) => {
                return invalid(&format!("stimulus_value {value} is outside 1..=100"));
            }
        };
        let envelope = StimulusEnvelope {
            stimulus: Stimulus {
                stimulus_type: request.stimulus_type.unwrap_or(self.defaults.kind),
                stimulus_value,
            },
        };

        tracing::info!(
            target: "proxy",
            reason = request.trigger_reason.as_deref().unwrap_or("-"),
            kind = ?envelope.stimulus.stimulus_type,
            value = stimulus_value,
            "delivering stimulus"
        );

        let response = match self
            .http
            .post(self.url.clone())
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .json(&envelope)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(target: "proxy", error = %err, "stimulus API unreachable");
                return failed(err.to_string(), None);
            }
        };

        let status = response.status();
        let body: Option<Value> = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(err) => {
                tracing::warn!(target: "proxy", error = %err, "failed to read stimulus API body");
                None
            }
        };

        if status.is_success() {
            return DeliveryReport {
                status: DeliveryStatus::Delivered,
                body: DeliverStimulusResponse {
                    success: true,
                    message: "Stimulus delivered".to_string(),
                    data: Some(body.unwrap_or(Value::Null)),
                    error: None,
                },
            };
        }

        let message = body
            .as_ref()
            .and_then(|value| value.get("message"))
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Pavlok API error: {}", status.as_u16()));
        tracing::warn!(target: "proxy", status = status.as_u16(), %message, "stimulus rejected");
        failed(message, body)
    }
}

fn invalid(message: &str) -> DeliveryReport {
    DeliveryReport {
        status: DeliveryStatus::Invalid,
        body: DeliverStimulusResponse {
            success: false,
            message: message.to_string(),
            data: None,
            error: None,
        },
    }
}

fn failed(message: String, error: Option<Value>) -> DeliveryReport {
    DeliveryReport {
        status: DeliveryStatus::Failed,
        body: DeliverStimulusResponse {
            success: false,
            message,
            data: None,
            error: Some(error.unwrap_or(Value::Null)),
        },
    }
}
