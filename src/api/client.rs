use futures::{future::BoxFuture, FutureExt};
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::domain::{CaptureFrame, ConfigurationDraft, Rule, StimulusOutcome, TriggerResult};

use super::{
    response::{handle_response, ApiError, ResponsePayload},
    wire::{
        DeliverStimulusRequest, EvaluateCaptureRequest, GenerateConfigRequest,
        DELIVER_STIMULUS_PATH, EVALUATE_CAPTURE_PATH, GENERATE_CONFIG_PATH,
    },
};

pub trait TriggerBackend: Send + Sync {
    fn generate_configuration<'a>(
        &'a self,
        description: &'a str,
    ) -> BoxFuture<'a, Result<ConfigurationDraft, ApiError>>;

    fn evaluate_frame<'a>(
        &'a self,
        frame: &'a CaptureFrame,
        blocklist: &'a [Rule],
        allowlist: &'a [Rule],
    ) -> BoxFuture<'a, Result<TriggerResult, ApiError>>;

    fn deliver_stimulus<'a>(
        &'a self,
        token: &'a str,
        trigger_reason: &'a str,
    ) -> BoxFuture<'a, Result<StimulusOutcome, ApiError>>;
}

#[derive(Clone)]
pub struct EvaluationClient {
    http: Client,
    base: Url,
}

impl EvaluationClient {
    pub fn new(http: Client, mut base: Url) -> Self {
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Self { http, base }
    }

    pub async fn generate_configuration(
        &self,
        description: &str,
    ) -> Result<ConfigurationDraft, ApiError> {
        let request = GenerateConfigRequest {
            description: description.to_string(),
        };
        let draft: ConfigurationDraft = self.post(GENERATE_CONFIG_PATH, &request).await?.into_json()?;
        tracing::info!(
            target: "api",
            allow = draft.allowlist.len(),
            block = draft.blocklist.len(),
            "configuration generated"
        );
        Ok(draft)
    }

    pub async fn evaluate_frame(
        &self,
        frame: &CaptureFrame,
        blocklist: &[Rule],
        allowlist: &[Rule],
    ) -> Result<TriggerResult, ApiError> {
        let request = EvaluateCaptureRequest {
            screenshot: frame.image_base64.clone(),
            allowlist: allowlist.to_vec(),
            blocklist: blocklist.to_vec(),
        };
        self.post(EVALUATE_CAPTURE_PATH, &request).await?.into_json()
    }

    pub async fn deliver_stimulus(
        &self,
        token: &str,
        trigger_reason: &str,
    ) -> Result<StimulusOutcome, ApiError> {
        let request = DeliverStimulusRequest {
            pavlok_token: token.to_string(),
            trigger_reason: Some(trigger_reason.to_string()),
            ..Default::default()
        };
        self.post(DELIVER_STIMULUS_PATH, &request).await?.into_json()
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<ResponsePayload, ApiError> {
        let url = self.base.join(path)?;
        tracing::debug!(target: "api", url = %url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        handle_response(response).await
    }
}

impl TriggerBackend for EvaluationClient {
    fn generate_configuration<'a>(
        &'a self,
        description: &'a str,
    ) -> BoxFuture<'a, Result<ConfigurationDraft, ApiError>> {
        EvaluationClient::generate_configuration(self, description).boxed()
    }

    fn evaluate_frame<'a>(
        &'a self,
        frame: &'a CaptureFrame,
        blocklist: &'a [Rule],
        allowlist: &'a [Rule],
    ) -> BoxFuture<'a, Result<TriggerResult, ApiError>> {
        EvaluationClient::evaluate_frame(self, frame, blocklist, allowlist).boxed()
    }

    fn deliver_stimulus<'a>(
        &'a self,
        token: &'a str,
        trigger_reason: &'a str,
    ) -> BoxFuture<'a, Result<StimulusOutcome, ApiError>> {
        EvaluationClient::deliver_stimulus(self, token, trigger_reason).boxed()
    }
}
