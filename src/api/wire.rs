use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Rule, StimulusKind};

pub const GENERATE_CONFIG_PATH: &str = "api/generate-config";
pub const EVALUATE_CAPTURE_PATH: &str = "api/evaluate-capture-for-trigger";
pub const DELIVER_STIMULUS_PATH: &str = "api/deliver-stimulus";

#[derive(Debug, Clone, Serialize)]
pub struct GenerateConfigRequest {
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluateCaptureRequest {
    pub screenshot: String,
    pub allowlist: Vec<Rule>,
    pub blocklist: Vec<Rule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverStimulusRequest {
    #[serde(default)]
    pub pavlok_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stimulus_type: Option<StimulusKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stimulus_value: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverStimulusResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}
