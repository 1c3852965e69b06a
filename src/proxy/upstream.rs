use std::fmt;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use reqwest::Client;
use url::Url;

use crate::config::ProxyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    GenerateConfig,
    EvaluateCapture,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::GenerateConfig => f.write_str("configuration service"),
            Upstream::EvaluateCapture => f.write_str("evaluation service"),
        }
    }
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    generate_url: Url,
    evaluate_url: Url,
}

#[derive(Debug)]
pub struct ForwardedResponse {
    status: u16,
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl UpstreamClient {
    pub fn new(http: Client, config: &ProxyConfig) -> anyhow::Result<Self> {
        let base = config.remote_base_url()?;
        Ok(Self {
            http,
            generate_url: join_path(base, &config.generate_path)?,
            evaluate_url: join_path(base, &config.evaluate_path)?,
        })
    }

    pub fn url(&self, target: Upstream) -> &Url {
        match target {
            Upstream::GenerateConfig => &self.generate_url,
            Upstream::EvaluateCapture => &self.evaluate_url,
        }
    }

    pub async fn forward(
        &self,
        target: Upstream,
        content_type: Option<HeaderValue>,
        body: Bytes,
    ) -> Result<ForwardedResponse, reqwest::Error> {
        let content_type =
            content_type.unwrap_or_else(|| HeaderValue::from_static("application/json"));
        let response = self
            .http
            .post(self.url(target).clone())
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| HeaderValue::from_bytes(value.as_bytes()).ok());
        let body = response.bytes().await?;

        tracing::info!(target: "proxy", upstream = %target, status, bytes = body.len(), "relayed");
        Ok(ForwardedResponse {
            status,
            content_type,
            body,
        })
    }
}

impl IntoResponse for ForwardedResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = (status, Body::from(self.body)).into_response();
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

fn join_path(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_path_keeps_base_prefix() {
        let base = Url::parse("https://screenshock.me/v1/").unwrap();
        assert_eq!(
            join_path(&base, "/generate_config").unwrap().as_str(),
            "https://screenshock.me/v1/generate_config"
        );
        let bare = Url::parse("https://screenshock.me").unwrap();
        assert_eq!(
            join_path(&bare, "evaluate-capture-for-trigger").unwrap().as_str(),
            "https://screenshock.me/evaluate-capture-for-trigger"
        );
    }
}
