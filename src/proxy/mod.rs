mod handlers;
mod pavlok;
mod upstream;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{config::ProxyConfig, infrastructure::shutdown::ShutdownListener};

use pavlok::PavlokClient;
pub use pavlok::PAVLOK_STIMULUS_URL;
use upstream::{Upstream, UpstreamClient};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub struct ProxyState {
    pub upstream: UpstreamClient,
    pub pavlok: PavlokClient,
}

impl ProxyState {
    pub fn from_config(http: Client, config: &ProxyConfig) -> Result<Self> {
        Ok(Self {
            upstream: UpstreamClient::new(http.clone(), config)?,
            pavlok: PavlokClient::new(http, config.pavlok_api_url.clone(), config.stimulus),
        })
    }
}

pub fn router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/", get(handlers::api_root))
        .route("/api/generate-config", post(handlers::generate_config))
        .route(
            "/api/evaluate-capture-for-trigger",
            post(handlers::evaluate_capture),
        )
        .route("/api/deliver-stimulus", post(handlers::deliver_stimulus))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

pub async fn serve(
    config: &ProxyConfig,
    http: Client,
    mut shutdown: ShutdownListener,
) -> Result<()> {
    let state = Arc::new(ProxyState::from_config(http, config)?);
    tracing::info!(
        target: "proxy",
        generate = %state.upstream.url(Upstream::GenerateConfig),
        evaluate = %state.upstream.url(Upstream::EvaluateCapture),
        "upstreams configured"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(target: "proxy", %addr, "proxy listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.notified().await;
        })
        .await
        .context("proxy server failed")?;

    tracing::info!(target: "proxy", "proxy stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{
        body::Bytes,
        http::{HeaderMap, StatusCode},
        Json,
    };
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use url::Url;

    use super::*;
    use crate::{
        api::{wire::DeliverStimulusResponse, ApiError, EvaluationClient},
        config::StimulusDefaults,
        domain::{CaptureFrame, StimulusKind},
        test_support::spawn_stub,
    };

    #[derive(Default)]
    struct Recorded {
        generate: Mutex<Option<Value>>,
        evaluate: Mutex<Option<Bytes>>,
        pavlok: Mutex<Option<(Option<String>, Value)>>,
        pavlok_calls: AtomicUsize,
    }

    async fn remote_stub(recorded: Arc<Recorded>, pavlok_status: StatusCode) -> Url {
        let generate = recorded.clone();
        let evaluate = recorded.clone();
        let pavlok = recorded.clone();
        let router = Router::new()
            .route(
                "/generate_config",
                post(move |Json(body): Json<Value>| {
                    let generate = generate.clone();
                    async move {
                        *generate.generate.lock() = Some(body);
                        Json(json!({
                            "allowlist": [],
                            "blocklist": [{"website": "facebook.com", "intent": "scrolling"}]
                        }))
                    }
                }),
            )
            .route(
                "/evaluate-capture-for-trigger",
                post(move |body: Bytes| {
                    let evaluate = evaluate.clone();
                    async move {
                        *evaluate.evaluate.lock() = Some(body);
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({"detail": "Failed to evaluate capture from LLM."})),
                        )
                    }
                }),
            )
            .route(
                "/stimulus/send",
                post(move |headers: HeaderMap, Json(body): Json<Value>| {
                    let pavlok = pavlok.clone();
                    async move {
                        pavlok.pavlok_calls.fetch_add(1, Ordering::SeqCst);
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        *pavlok.pavlok.lock() = Some((auth, body));
                        if pavlok_status.is_success() {
                            (pavlok_status, Json(json!({"id": 1})))
                        } else {
                            (pavlok_status, Json(json!({"message": "Unauthorized"})))
                        }
                    }
                }),
            );
        spawn_stub(router).await
    }

    fn proxy_config(remote: &Url) -> ProxyConfig {
        ProxyConfig {
            port: 0,
            remote_base_url: Some(remote.clone()),
            generate_path: "/generate_config".into(),
            evaluate_path: "/evaluate-capture-for-trigger".into(),
            pavlok_api_url: remote.join("/stimulus/send").unwrap(),
            stimulus: StimulusDefaults {
                kind: StimulusKind::Vibrate,
                value: 100,
            },
        }
    }

    async fn spawn_proxy(config: &ProxyConfig) -> Url {
        let state = Arc::new(ProxyState::from_config(Client::new(), config).unwrap());
        spawn_stub(router(state)).await
    }

    #[tokio::test]
    async fn generate_config_is_relayed_verbatim() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let client = EvaluationClient::new(Client::new(), proxy);

        let draft = client
            .generate_configuration("I want to stop checking social media")
            .await
            .unwrap();

        assert_eq!(draft.blocklist[0].website, "facebook.com");
        assert_eq!(
            recorded.generate.lock().clone(),
            Some(json!({"description": "I want to stop checking social media"}))
        );
    }

    #[tokio::test]
    async fn remote_failure_status_and_body_pass_through() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded, StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let client = EvaluationClient::new(Client::new(), proxy);
        let frame = CaptureFrame {
            image_base64: "aGVsbG8=".into(),
            captured_at: chrono::Utc::now(),
        };

        let err = client.evaluate_frame(&frame, &[], &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Remote { status: 500, ref message }
                if message == "Failed to evaluate capture from LLM."
        ));
    }

    #[tokio::test]
    async fn unreachable_remote_is_bad_gateway() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        drop(listener);
        let proxy = spawn_proxy(&proxy_config(&dead)).await;

        let response = Client::new()
            .post(proxy.join("/api/generate-config").unwrap())
            .json(&json!({"description": "focus"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 502);
        let body: Value = response.json().await.unwrap();
        assert!(body["detail"]
            .as_str()
            .unwrap()
            .starts_with("Failed to reach configuration service"));
    }

    #[tokio::test]
    async fn stimulus_is_sent_with_bearer_token() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let client = EvaluationClient::new(Client::new(), proxy);

        let outcome = client
            .deliver_stimulus("tok_1234567890", "facebook.com")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.message, "Stimulus delivered");
        let (auth, body) = recorded.pavlok.lock().clone().unwrap();
        assert_eq!(auth.as_deref(), Some("Bearer tok_1234567890"));
        assert_eq!(
            body,
            json!({"stimulus": {"stimulusType": "vibrate", "stimulusValue": 100}})
        );
    }

    #[tokio::test]
    async fn stimulus_overrides_are_forwarded() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;

        let response = Client::new()
            .post(proxy.join("/api/deliver-stimulus").unwrap())
            .json(&json!({"pavlok_token": "tok", "stimulus_type": "zap", "stimulus_value": 40}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        let (_, body) = recorded.pavlok.lock().clone().unwrap();
        assert_eq!(
            body,
            json!({"stimulus": {"stimulusType": "zap", "stimulusValue": 40}})
        );
    }

    #[tokio::test]
    async fn stimulus_failure_is_normalized() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded, StatusCode::UNAUTHORIZED).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;

        let response = Client::new()
            .post(proxy.join("/api/deliver-stimulus").unwrap())
            .json(&json!({"pavlok_token": "expired"}))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 502);
        let body: DeliverStimulusResponse = response.json().await.unwrap();
        assert!(!body.success);
        assert_eq!(body.message, "Unauthorized");
        assert_eq!(body.error, Some(json!({"message": "Unauthorized"})));
    }

    #[tokio::test]
    async fn invalid_stimulus_requests_never_reach_the_device_api() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let http = Client::new();

        for payload in [
            json!({"pavlok_token": "   "}),
            json!({}),
            json!({"pavlok_token": "tok", "stimulus_value": 250}),
        ] {
            let response = http
                .post(proxy.join("/api/deliver-stimulus").unwrap())
                .json(&payload)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 400);
            let body: DeliverStimulusResponse = response.json().await.unwrap();
            assert!(!body.success);
        }
        assert_eq!(recorded.pavlok_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_stimulus_bodies_get_structured_rejections() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let http = Client::new();

        for payload in [
            json!({"pavlok_token": "tok_1234567890", "stimulus_type": "shock"}),
            json!({"pavlok_token": 12345}),
            json!({"pavlok_token": "tok", "stimulus_value": 50.5}),
        ] {
            let response = http
                .post(proxy.join("/api/deliver-stimulus").unwrap())
                .json(&payload)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status().as_u16(), 400, "payload {payload}");
            let body: DeliverStimulusResponse = response.json().await.unwrap();
            assert!(!body.success);
            assert!(!body.message.is_empty());
        }

        let response = http
            .post(proxy.join("/api/deliver-stimulus").unwrap())
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: DeliverStimulusResponse = response.json().await.unwrap();
        assert!(!body.success);
        assert_eq!(recorded.pavlok_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn evaluate_payload_reaches_remote_byte_for_byte() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;
        let sent = r#"{"screenshot":"aGk=","blocklist":[{"website":"x.com","intent":"y","id":3}],"session":"abc"}"#;

        let response = Client::new()
            .post(proxy.join("/api/evaluate-capture-for-trigger").unwrap())
            .header("content-type", "application/json")
            .body(sent)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 500);
        let received = recorded.evaluate.lock().clone().unwrap();
        assert_eq!(&received[..], sent.as_bytes());
    }

    #[tokio::test]
    async fn malformed_generate_body_gets_the_remote_verdict() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded.clone(), StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;

        let response = Client::new()
            .post(proxy.join("/api/generate-config").unwrap())
            .header("content-type", "application/json")
            .body("{\"description\": ")
            .send()
            .await
            .unwrap();

        // The remote stub's own JSON extractor rejects the body.
        assert_eq!(response.status().as_u16(), 400);
        assert!(recorded.generate.lock().is_none());
    }

    #[tokio::test]
    async fn health_reports_running() {
        let recorded = Arc::new(Recorded::default());
        let remote = remote_stub(recorded, StatusCode::OK).await;
        let proxy = spawn_proxy(&proxy_config(&remote)).await;

        let body: Value = Client::new()
            .get(proxy.join("/health").unwrap())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[test]
    fn missing_remote_base_url_is_a_config_error() {
        let mut config = proxy_config(&Url::parse("http://127.0.0.1:1").unwrap());
        config.remote_base_url = None;
        let err = ProxyState::from_config(Client::new(), &config)
            .err()
            .expect("missing base url");
        assert!(err.to_string().contains("REMOTE_BASE_URL"));
    }
}
