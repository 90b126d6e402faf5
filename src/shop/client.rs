//! Retrying shop Admin API client.
//!
//! # Responsibilities
//! - Resolve paths against the shop domain and attach auth headers
//! - Retry 429/5xx/network failures with backoff or server wait hints
//! - Refuse to retry unsafe methods on 429 without an idempotency key
//! - Record call-limit usage from every response
//!
//! # Design Decisions
//! - `max_retries` counts total attempts, not extra ones
//! - No sleep after the final attempt
//! - Exhaustion reports the last HTTP response if one was ever received,
//!   otherwise the last transport error

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use url::Url;

use crate::config::ShopClientConfig;
use crate::observability::hook::{payload, MetricsHook};
use crate::resilience::backoff::calculate_backoff;
use crate::resilience::retries::{classify, next_wait, AttemptOutcome, Wait};
use crate::shop::rate_limit;
use crate::shop::transport::{ReqwestTransport, Transport};
use crate::shop::types::{
    IdempotencyKey, ShopError, ShopRequest, ShopResult, TransportError, UpstreamRequest,
    UpstreamResponse,
};

const ACCESS_TOKEN_HEADER: &str = "x-shopify-access-token";
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Shop API client with policy-driven retries.
///
/// One instance per tenant and shop; share it behind an `Arc`.
#[derive(Debug)]
pub struct RetryingClient<T = ReqwestTransport> {
    config: ShopClientConfig,
    base_url: Option<Url>,
    default_headers: HeaderMap,
    transport: T,
    hook: MetricsHook,
}

impl RetryingClient<ReqwestTransport> {
    /// Client using the `reqwest` transport.
    pub fn from_config(config: ShopClientConfig) -> ShopResult<Self> {
        let transport = ReqwestTransport::new().map_err(|source| ShopError::Network {
            attempts: 0,
            source,
        })?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> RetryingClient<T> {
    pub fn with_transport(config: ShopClientConfig, transport: T) -> ShopResult<Self> {
        let domain = config.shop_domain.trim();
        let base_url = if domain.is_empty() {
            None
        } else {
            Some(
                Url::parse(&format!("https://{}", domain))
                    .map_err(|e| ShopError::InvalidUrl(format!("{}: {}", domain, e)))?,
            )
        };

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.access_token.is_empty() {
            let mut token = HeaderValue::from_str(&config.access_token)
                .map_err(|_| ShopError::InvalidHeader(ACCESS_TOKEN_HEADER.to_string()))?;
            token.set_sensitive(true);
            default_headers.insert(HeaderName::from_static(ACCESS_TOKEN_HEADER), token);
        }

        Ok(Self {
            config,
            base_url,
            default_headers,
            transport,
            hook: MetricsHook::noop(),
        })
    }

    /// Attach an observability hook.
    pub fn with_hook(mut self, hook: MetricsHook) -> Self {
        self.hook = hook;
        self
    }

    pub fn config(&self) -> &ShopClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// GET a path or URL.
    pub async fn get(&self, path: &str) -> ShopResult<UpstreamResponse> {
        self.request(ShopRequest::get(path)).await
    }

    /// POST a JSON body. Pass a key to make 429 responses retriable.
    pub async fn post_json(
        &self,
        path: &str,
        body: Value,
        idempotency_key: Option<IdempotencyKey>,
    ) -> ShopResult<UpstreamResponse> {
        let mut request = ShopRequest::post(path).json(body);
        request.idempotency_key = idempotency_key;
        self.request(request).await
    }

    /// Absolute URL for `path`: used as-is when it starts with `http`,
    /// otherwise joined to `https://{shop_domain}`.
    pub fn resolve_url(&self, path: &str, query: &[(String, String)]) -> ShopResult<Url> {
        let mut url = if path.starts_with("http") {
            Url::parse(path).map_err(|e| ShopError::InvalidUrl(format!("{}: {}", path, e)))?
        } else {
            let base = self.base_url.as_ref().ok_or_else(|| {
                ShopError::InvalidUrl(format!("{}: no shop domain configured", path))
            })?;
            base.join(path)
                .map_err(|e| ShopError::InvalidUrl(format!("{}: {}", path, e)))?
        };

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Execute one logical request with retries.
    pub async fn request(&self, request: ShopRequest) -> ShopResult<UpstreamResponse> {
        let method = request.method.clone();
        let url = self.resolve_url(&request.path, &request.query)?;
        let headers = self.headers_for(&request)?;
        let body = request.json.as_ref().map(serde_json::to_vec).transpose()?;
        let timeout = request.timeout.unwrap_or_else(|| self.config.request_timeout());
        let has_key = request.idempotency_key.is_some();
        let max_attempts = self.config.max_retries.max(1);
        let base = self.backoff_base();

        let mut last_response: Option<UpstreamResponse> = None;
        let mut last_network: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            tracing::debug!(attempt, method = %method, url = %url, "Shop request attempt");

            let upstream = UpstreamRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
                timeout,
            };

            let (wait, status) = match self.transport.send(upstream).await {
                Ok(response) => {
                    rate_limit::observe(
                        &response.headers,
                        self.config.rate_warn_threshold,
                        &self.hook,
                    );

                    match classify(&method, response.status, has_key) {
                        AttemptOutcome::Success => {
                            if attempt > 1 {
                                tracing::info!(
                                    attempt,
                                    status = %response.status,
                                    "Shop request succeeded after retry"
                                );
                            }
                            self.emit(
                                "shopify_request_success",
                                json!({ "status": response.status.as_u16(), "attempt": attempt }),
                            );
                            return Ok(response);
                        }
                        AttemptOutcome::Terminal(status) => {
                            tracing::warn!(
                                attempt,
                                status = %status,
                                method = %method,
                                "Shop request failed with non-retriable status"
                            );
                            self.emit(
                                "shopify_request_failed",
                                json!({ "status": status.as_u16() }),
                            );
                            return Err(ShopError::Status { response });
                        }
                        AttemptOutcome::Retriable(status) => {
                            let wait = next_wait(attempt, base, Some(&response.headers));
                            last_response = Some(response);
                            (wait, Some(status))
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Network error during shop request");
                    self.emit("shopify_network_error", json!({ "attempt": attempt }));
                    last_network = Some(e);
                    (Wait::Backoff(calculate_backoff(attempt, base)), None)
                }
            };

            if attempt == max_attempts {
                break;
            }

            match (wait, status) {
                (Wait::RetryAfter(d), _) => {
                    tracing::warn!(
                        attempt,
                        wait_secs = d.as_secs(),
                        "Shop returned Retry-After; sleeping"
                    );
                    self.emit("shopify_retry_after", json!({ "wait": d.as_secs() }));
                }
                (Wait::Backoff(d), Some(status)) => {
                    tracing::warn!(
                        attempt,
                        status = %status,
                        backoff = ?d,
                        "Retrying shop request"
                    );
                    self.emit(
                        "shopify_retry",
                        json!({
                            "attempt": attempt,
                            "status": status.as_u16(),
                            "backoff": d.as_secs_f64(),
                        }),
                    );
                }
                (Wait::Backoff(d), None) => {
                    tracing::debug!(
                        attempt,
                        backoff = ?d,
                        "Sleeping before retry after network error"
                    );
                }
            }
            tokio::time::sleep(wait.duration()).await;
        }

        tracing::error!(
            attempts = max_attempts,
            method = %method,
            url = %url,
            "Shop request failed after retries"
        );

        match last_response {
            Some(response) => {
                self.emit(
                    "shopify_request_failed",
                    json!({ "status": response.status.as_u16(), "attempts": max_attempts }),
                );
                Err(ShopError::RetriesExhausted {
                    attempts: max_attempts,
                    response,
                })
            }
            None => {
                self.emit(
                    "shopify_request_failed",
                    json!({ "status": Value::Null, "attempts": max_attempts }),
                );
                Err(ShopError::Network {
                    attempts: max_attempts,
                    source: last_network.unwrap_or_else(|| {
                        TransportError::Other("no attempt completed".to_string())
                    }),
                })
            }
        }
    }

    fn headers_for(&self, request: &ShopRequest) -> ShopResult<HeaderMap> {
        let mut headers = self.default_headers.clone();
        if let Some(key) = &request.idempotency_key {
            let value = HeaderValue::from_str(key.as_str())
                .map_err(|_| ShopError::InvalidHeader(IDEMPOTENCY_KEY_HEADER.to_string()))?;
            headers.insert(HeaderName::from_static(IDEMPOTENCY_KEY_HEADER), value);
        }
        Ok(headers)
    }

    fn backoff_base(&self) -> Duration {
        Duration::try_from_secs_f64(self.config.backoff_base_secs).unwrap_or(Duration::ZERO)
    }

    fn emit(&self, event: &str, body: Value) {
        self.hook.emit(event, payload(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    type Scripted = Result<UpstreamResponse, TransportError>;

    /// Replays canned outcomes and records every request it sees.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Scripted>>,
        seen: Mutex<Vec<UpstreamRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Scripted>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn attempts(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&self, request: UpstreamRequest) -> BoxFuture<'_, Scripted> {
            self.seen.lock().unwrap().push(request);
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(UpstreamResponse::new(StatusCode::OK)));
            async move { next }.boxed()
        }
    }

    fn response(status: u16, headers: &[(&'static str, &'static str)]) -> Scripted {
        let mut response = UpstreamResponse::new(StatusCode::from_u16(status).unwrap());
        for (name, value) in headers {
            response
                .headers
                .insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        Ok(response)
    }

    fn config(max_retries: u32) -> ShopClientConfig {
        ShopClientConfig {
            shop_domain: "example.myshopify.com".into(),
            access_token: "token".into(),
            max_retries,
            backoff_base_secs: 0.01,
            ..ShopClientConfig::default()
        }
    }

    fn client(max_retries: u32, script: Vec<Scripted>) -> RetryingClient<ScriptedTransport> {
        RetryingClient::with_transport(config(max_retries), ScriptedTransport::new(script)).unwrap()
    }

    fn recording_hook() -> (MetricsHook, Arc<Mutex<Vec<(String, Value)>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let hook = MetricsHook::new(move |event, payload| {
            sink.lock()
                .unwrap()
                .push((event.to_string(), Value::Object(payload.clone())));
        });
        (hook, events)
    }

    #[test]
    fn test_resolve_url() {
        let client = client(1, vec![]);
        let url = client
            .resolve_url("/admin/api/2024-01/products.json", &[("limit".into(), "5".into())])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.myshopify.com/admin/api/2024-01/products.json?limit=5"
        );

        let absolute = client.resolve_url("http://127.0.0.1:9000/x", &[]).unwrap();
        assert_eq!(absolute.as_str(), "http://127.0.0.1:9000/x");
    }

    #[test]
    fn test_relative_path_without_domain() {
        let cfg = ShopClientConfig::default();
        let client = RetryingClient::with_transport(cfg, ScriptedTransport::default()).unwrap();
        assert!(matches!(client.resolve_url("/admin", &[]), Err(ShopError::InvalidUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_headers_and_idempotency_key() {
        let client = client(1, vec![response(200, &[])]);
        client
            .request(ShopRequest::post("/admin/orders.json").idempotency_key("order-42"))
            .await
            .unwrap();

        let seen = client.transport().seen.lock().unwrap();
        let headers = &seen[0].headers;
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[ACCESS_TOKEN_HEADER], "token");
        assert_eq!(headers[IDEMPOTENCY_KEY_HEADER], "order-42");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_429_retry_after_then_500_then_ok() {
        let client = client(
            3,
            vec![
                response(429, &[("retry-after", "0"), (rate_limit::CALL_LIMIT_HEADER, "10/40")]),
                response(500, &[]),
                response(200, &[(rate_limit::CALL_LIMIT_HEADER, "11/40")]),
            ],
        );

        let resp = client.get("/admin/api/2024-01/products.json").await.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(client.transport().attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_429_without_key_not_retried() {
        let client = client(5, vec![response(429, &[])]);

        let err = client
            .post_json("/admin/api/2024-01/products.json", json!({ "title": "x" }), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ShopError::Status { .. }));
        assert_eq!(err.status(), Some(StatusCode::TOO_MANY_REQUESTS));
        assert_eq!(client.transport().attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_429_with_key_retried() {
        let client = client(5, vec![response(429, &[]), response(429, &[]), response(200, &[])]);

        let resp = client
            .post_json(
                "/admin/api/2024-01/products.json",
                json!({ "title": "x" }),
                Some(IdempotencyKey::from("create-x")),
            )
            .await
            .unwrap();

        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(client.transport().attempts(), 3);
        let seen = client.transport().seen.lock().unwrap();
        assert!(seen.iter().all(|r| r.body.as_deref() == Some(br#"{"title":"x"}"#.as_slice())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_terminal() {
        let (hook, events) = recording_hook();
        let client = client(5, vec![response(404, &[])]).with_hook(hook);

        let err = client.get("/admin/missing.json").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(client.transport().attempts(), 1);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "shopify_request_failed");
        assert_eq!(events[0].1["status"], 404);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_returns_last_status_without_trailing_sleep() {
        let client = client(3, vec![response(503, &[]), response(502, &[]), response(500, &[])]);

        let start = Instant::now();
        let err = client.get("/admin/shop.json").await.unwrap_err();
        let slept = start.elapsed();

        match err {
            ShopError::RetriesExhausted { attempts, response } => {
                assert_eq!(attempts, 3);
                assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(client.transport().attempts(), 3);
        // Two backoffs: [10ms, 20ms] + [20ms, 40ms]
        assert!(slept >= Duration::from_millis(30), "slept {slept:?}");
        assert!(slept <= Duration::from_millis(65), "slept {slept:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_sleeps_exactly() {
        let (hook, events) = recording_hook();
        let client = client(2, vec![response(503, &[("retry-after", "7")]), response(200, &[])])
            .with_hook(hook);

        let start = Instant::now();
        client.get("/admin/shop.json").await.unwrap();
        let slept = start.elapsed();
        assert!(slept >= Duration::from_secs(7), "slept {slept:?}");
        assert!(slept < Duration::from_millis(7_010), "slept {slept:?}");

        let events = events.lock().unwrap();
        let names: Vec<_> = events.iter().map(|(e, _)| e.as_str()).collect();
        assert_eq!(names, vec!["shopify_retry_after", "shopify_request_success"]);
        assert_eq!(events[0].1["wait"], 7);
        assert_eq!(events[1].1["attempt"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_date_retry_after_uses_backoff() {
        let (hook, events) = recording_hook();
        let client = client(
            2,
            vec![
                response(429, &[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")]),
                response(200, &[]),
            ],
        )
        .with_hook(hook);

        let start = Instant::now();
        client.get("/admin/shop.json").await.unwrap();
        let slept = start.elapsed();
        assert!(slept >= Duration::from_millis(10), "slept {slept:?}");
        assert!(slept <= Duration::from_millis(25), "slept {slept:?}");

        let events = events.lock().unwrap();
        assert_eq!(events[0].0, "shopify_retry");
        assert_eq!(events[0].1["status"], 429);
        assert_eq!(events[0].1["attempt"], 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_retried_then_reported() {
        let (hook, events) = recording_hook();
        let client = client(
            3,
            vec![
                Err(TransportError::Connect("refused".into())),
                Err(TransportError::Timeout),
                Err(TransportError::Timeout),
            ],
        )
        .with_hook(hook);

        let err = client.get("/admin/shop.json").await.unwrap_err();
        assert!(matches!(
            err,
            ShopError::Network { attempts: 3, source: TransportError::Timeout }
        ));
        let names: Vec<_> = events.lock().unwrap().iter().map(|(e, _)| e.clone()).collect();
        assert_eq!(
            names,
            vec![
                "shopify_network_error",
                "shopify_network_error",
                "shopify_network_error",
                "shopify_request_failed",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_prefers_last_http_error_over_network() {
        let client = client(
            3,
            vec![
                response(500, &[]),
                Err(TransportError::Timeout),
                Err(TransportError::Connect("reset".into())),
            ],
        );

        let err = client.get("/admin/shop.json").await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_error_then_success() {
        let client = client(3, vec![Err(TransportError::Timeout), response(200, &[])]);
        assert_eq!(client.get("/admin/shop.json").await.unwrap().status, StatusCode::OK);
        assert_eq!(client.transport().attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_usage_high_emitted_once_per_response() {
        let (hook, events) = recording_hook();
        let client = client(
            3,
            vec![
                response(500, &[(rate_limit::CALL_LIMIT_HEADER, "36/40")]),
                response(200, &[(rate_limit::CALL_LIMIT_HEADER, "38/40")]),
            ],
        )
        .with_hook(hook);

        client.get("/admin/shop.json").await.unwrap();

        let events = events.lock().unwrap();
        let high = events.iter().filter(|(e, _)| e == "shopify_api_usage_high").count();
        let usage = events.iter().filter(|(e, _)| e == "shopify_api_usage").count();
        assert_eq!(high, 2);
        assert_eq!(usage, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_request_timeout_passed_to_transport() {
        let client = client(1, vec![response(200, &[])]);
        client
            .request(ShopRequest::get("/admin/shop.json").timeout(Duration::from_secs(2)))
            .await
            .unwrap();
        client.get("/admin/shop.json").await.unwrap();

        let seen = client.transport().seen.lock().unwrap();
        assert_eq!(seen[0].timeout, Duration::from_secs(2));
        assert_eq!(seen[1].timeout, Duration::from_secs(10));
    }
}
