mod routes;
mod types;

use crate::http::routes::*;
use crate::http::types::HttpError;
use crate::relay::Relay;
use crate::TracingReloadHandle;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::log::{debug, warn};

#[cfg(feature = "sentry")]
use {
    sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer},
    tower::ServiceBuilder,
};

#[derive(Clone)]
pub struct HttpState {
    pub relay: Relay,
    pub channel_secret: Arc<str>,
    pub tracing_reload: Option<TracingReloadHandle>,
}

async fn auth_middleware(
    axum::extract::State(expected_token): axum::extract::State<Arc<str>>,
    headers: axum::http::HeaderMap,
    request: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, HttpError> {
    let auth_header = headers.get("authorization").ok_or(HttpError {
        status: StatusCode::UNAUTHORIZED,
        message: "Missing authorization header".to_string(),
    })?;

    let auth_str = auth_header.to_str().map_err(|_| HttpError {
        status: StatusCode::BAD_REQUEST,
        message: "Invalid authorization header".to_string(),
    })?;

    let token = auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).trim();
    if token != &*expected_token {
        return Err(HttpError {
            status: StatusCode::UNAUTHORIZED,
            message: "Invalid token".to_string(),
        });
    }

    Ok(next.run(request).await)
}

/// Builds the router. The `/sys` admin routes only exist when an admin token is given.
pub fn create_app(
    state: HttpState,
    admin_token: Option<String>,
    _sentry: bool,
) -> axum::Router {
    let mut router = axum::Router::new()
        .route("/callback", post(callback))
        .route("/health", get(health));

    match admin_token {
        Some(token) => {
            debug!("Adding authenticated /sys admin routes!");
            let admin = axum::Router::new()
                .route("/sys/version", get(sys_version))
                .route("/sys/set-log-level", post(sys_set_log_level))
                .route_layer(axum::middleware::from_fn_with_state(
                    Arc::<str>::from(token),
                    auth_middleware,
                ));
            router = router.merge(admin);
        }
        None => warn!("RELAY_ADMIN_TOKEN is not set, /sys admin routes are disabled!"),
    }

    router = router.layer(SetResponseHeaderLayer::overriding(
        HeaderName::from_static("x-version"),
        HeaderValue::from_static(crate::VERSION),
    ));

    // If Sentry is enabled, include axum integration layers.
    #[cfg(feature = "sentry")]
    if _sentry {
        debug!("Adding Sentry HTTP layer!");
        router = router
            .layer(
                ServiceBuilder::new()
                    .layer(NewSentryLayer::<axum::http::Request<axum::body::Body>>::new_from_top()),
            )
            .layer(ServiceBuilder::new().layer(SentryHttpLayer::new().enable_transaction()))
    }

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;
    use crate::line::signature::sign;
    use crate::relay::mention::BotIdentity;
    use crate::relay::prompt::{PromptBuilder, PromptKind};
    use crate::relay::testing::{StubCompletion, StubReplies};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;
    use tracing_subscriber::{reload, EnvFilter};

    const SECRET: &str = "test-channel-secret";
    const SCENARIO_A: &str = r#"{"events":[{"type":"message","message":{"type":"text","text":"翻訳：こんにちは"},"replyToken":"abc","source":{"type":"user"}}]}"#;

    struct Harness {
        completion: Arc<StubCompletion>,
        replies: Arc<StubReplies>,
        state: HttpState,
    }
    impl Harness {
        fn new(completion: StubCompletion) -> Self {
            let completion = Arc::new(completion);
            let replies = Arc::new(StubReplies::default());
            let relay = Relay::new(
                BotIdentity::new(Some("U123".to_string())),
                PromptBuilder::new(PromptConfig {
                    translate_instruction: "translate A to B".to_string(),
                    ..PromptConfig::default()
                }),
                completion.clone(),
                replies.clone(),
            );

            Self {
                completion,
                replies,
                state: HttpState {
                    relay,
                    channel_secret: Arc::from(SECRET),
                    tracing_reload: None,
                },
            }
        }

        fn app(&self) -> axum::Router {
            create_app(self.state.clone(), Some("admin-token".to_string()), false)
        }
    }

    fn callback_request(body: &str, signature: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("POST").uri("/callback");
        if let Some(signature) = signature {
            builder = builder.header("x-line-signature", signature);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_scenario_a_translation_round_trip() {
        let harness = Harness::new(StubCompletion::answering("ආයුබෝවන්"));
        let signature = sign(SECRET, SCENARIO_A.as_bytes());

        let response = harness
            .app()
            .oneshot(callback_request(SCENARIO_A, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-version"));
        assert_eq!(body_string(response).await, "OK");

        let prompts = harness.completion.calls();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].kind, PromptKind::Translate);
        assert_eq!(prompts[0].instruction(), "translate A to B");
        assert_eq!(prompts[0].content(), "こんにちは");

        assert_eq!(
            harness.replies.calls(),
            vec![("abc".to_string(), "ආයුබෝවන්".to_string())]
        );
    }

    #[tokio::test]
    async fn test_scenario_b_mutated_signature_is_rejected() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let mut signature = sign(SECRET, SCENARIO_A.as_bytes());
        let first = if signature.starts_with('A') { "B" } else { "A" };
        signature.replace_range(0..1, first);

        let response = harness
            .app()
            .oneshot(callback_request(SCENARIO_A, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.completion.calls().is_empty());
        assert!(harness.replies.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_signature_is_rejected() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let response = harness
            .app()
            .oneshot(callback_request(SCENARIO_A, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.replies.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_c_unmentioned_group_message() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let body = r#"{"events":[{"type":"message","message":{"type":"text","text":"hello","mention":{"mentionees":[]}},"replyToken":"abc","source":{"type":"group","groupId":"Cgroup","userId":"Uauthor"}}]}"#;
        let signature = sign(SECRET, body.as_bytes());

        let response = harness
            .app()
            .oneshot(callback_request(body, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(harness.completion.calls().is_empty());
        assert!(harness.replies.calls().is_empty());
    }

    #[tokio::test]
    async fn test_completion_failure_still_replies() {
        let harness = Harness::new(StubCompletion::failing());
        let signature = sign(SECRET, SCENARIO_A.as_bytes());

        let response = harness
            .app()
            .oneshot(callback_request(SCENARIO_A, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            harness.replies.calls(),
            vec![("abc".to_string(), PromptConfig::default().fallback_text)]
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_acknowledged() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let body = r#"{"events":"nope"}"#;
        let signature = sign(SECRET, body.as_bytes());

        let response = harness
            .app()
            .oneshot(callback_request(body, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
        assert!(harness.completion.calls().is_empty());
    }

    #[tokio::test]
    async fn test_every_event_gets_its_own_reply() {
        let harness = Harness::new(StubCompletion::answering("reply"));
        let body = r#"{"events":[
            {"type":"message","message":{"type":"text","text":"one"},"replyToken":"t1","source":{"type":"user"}},
            {"type":"follow","replyToken":"t2","source":{"type":"user"}},
            {"type":"message","message":{"type":"text","text":"two"},"replyToken":"t3","source":{"type":"user"}}
        ]}"#;
        let signature = sign(SECRET, body.as_bytes());

        let response = harness
            .app()
            .oneshot(callback_request(body, Some(&signature)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut tokens: Vec<String> = harness
            .replies
            .calls()
            .into_iter()
            .map(|(token, _)| token)
            .collect();
        tokens.sort();
        assert_eq!(tokens, vec!["t1".to_string(), "t3".to_string()]);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let harness = Harness::new(StubCompletion::answering("unused"));

        let response = harness
            .app()
            .oneshot(Request::get("/sys/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = harness
            .app()
            .oneshot(
                Request::get("/sys/version")
                    .header("authorization", "Bearer admin-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains(crate::VERSION));
    }

    #[tokio::test]
    async fn test_admin_routes_absent_without_token() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let app = create_app(harness.state.clone(), None, false);

        let response = app
            .oneshot(
                Request::get("/sys/version")
                    .header("authorization", "Bearer admin-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_log_level() {
        let mut harness = Harness::new(StubCompletion::answering("unused"));
        let (_layer, handle) = reload::Layer::<_, tracing_subscriber::Registry>::new(EnvFilter::new("info"));
        harness.state.tracing_reload = Some(handle);

        let request = |level: &str| {
            Request::post("/sys/set-log-level")
                .header("authorization", "Bearer admin-token")
                .header("content-type", "application/json")
                .body(Body::from(format!(r#"{{"level":"{level}"}}"#)))
                .unwrap()
        };

        let response = harness.app().oneshot(request("debug")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = harness.app().oneshot(request("line_relay=loud")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let harness = Harness::new(StubCompletion::answering("unused"));
        let response = harness
            .app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
