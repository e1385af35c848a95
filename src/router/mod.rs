//! Request Router
//!
//! The router is the single entry point for chat traffic. For every request it
//! validates the caller key, resolves `provider/model` through the
//! [`ConfigStore`], obtains an adapter from the [`AdapterCache`], dispatches
//! the prepared payload through the [`HttpTransport`] and hands back a
//! canonical result. It is also the only place where failures are classified
//! into the error taxonomy.
//!
//! Every request, whatever its exit path, produces one `request_complete` or
//! `request_error` event and one stats update (see [`record`]).

pub mod record;
pub mod stats;

pub use record::{RequestRecord, RequestState, UNKNOWN_PROVIDER};
pub use stats::{ProviderStats, RequestStats, StatsSnapshot};

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::adapters::ProviderAdapter;
use crate::config::{CacheConfig, ConfigStore, GatewayConfig, ModelConfig, ProviderConfig, StaticConfigStore, TimeoutConfig};
use crate::error::types::decode_body;
use crate::error::{ErrorEnvelope, ErrorKind, LlmError};
use crate::registry::{AdapterCache, AdapterFactory};
use crate::streaming::{DONE_CHUNK, data_chunk};
use crate::tokens::{HeuristicTokenCounter, TokenCounter};
use crate::transport::{HttpTransport, HttpTransportRequest, ReqwestTransport};
use crate::types::{ChatRequest, ChatResponse, ModelCard, ModelIdentifier, ModelList};

/// Caller-facing chunk stream. Always ends with `data: [DONE]\n\n`.
pub type RouterStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Status used when the upstream answers with something outside 4xx/5xx.
const FALLBACK_UPSTREAM_STATUS: u16 = 502;

/// A validated request target.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub identifier: ModelIdentifier,
    pub provider: Arc<ProviderConfig>,
    pub model_config: ModelConfig,
    /// Outbound proxy, from the same configuration generation.
    pub proxy: Option<String>,
}

/// Outcome of a unary request.
///
/// An upstream non-200 is a value, not an `Err`: the caller gets the upstream
/// diagnostics wrapped in an envelope with the status preserved.
#[derive(Debug, Clone)]
pub enum RouteResponse {
    Completion(ChatResponse),
    UpstreamError(ErrorEnvelope),
}

impl RouteResponse {
    pub fn is_completion(&self) -> bool {
        matches!(self, RouteResponse::Completion(_))
    }
}

/// Builder for [`Router`].
pub struct RouterBuilder {
    config: Arc<dyn ConfigStore>,
    transport: Option<Arc<dyn HttpTransport>>,
    factory: AdapterFactory,
    tokens: Arc<dyn TokenCounter>,
    timeouts: TimeoutConfig,
    cache: CacheConfig,
    log_messages: bool,
}

impl RouterBuilder {
    pub fn new(config: Arc<dyn ConfigStore>) -> Self {
        Self {
            config,
            transport: None,
            factory: AdapterFactory::with_defaults(),
            tokens: Arc::new(HeuristicTokenCounter),
            timeouts: TimeoutConfig::default(),
            cache: CacheConfig::default(),
            log_messages: false,
        }
    }

    /// Outbound transport. Defaults to a [`ReqwestTransport`] using the configured timeouts.
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn factory(mut self, factory: AdapterFactory) -> Self {
        self.factory = factory;
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.tokens = counter;
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn cache_config(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Attach message and response bodies to request events.
    pub fn log_messages(mut self, enabled: bool) -> Self {
        self.log_messages = enabled;
        self
    }

    /// Build the router and start the cache reaper.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Router, LlmError> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            LlmError::ConfigurationError("Router must be built inside a Tokio runtime".into())
        })?;

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(self.timeouts)));
        let cache = Arc::new(AdapterCache::new(self.factory, self.cache));
        let shutdown = CancellationToken::new();
        let reaper = cache.spawn_reaper(shutdown.child_token());

        tracing::info!(
            ttl_secs = self.cache.ttl_secs,
            reap_interval_secs = self.cache.reap_interval_secs,
            "router started"
        );

        Ok(Router {
            config: self.config,
            cache,
            transport,
            tokens: self.tokens,
            stats: Arc::new(RequestStats::new()),
            timeouts: self.timeouts,
            log_messages: self.log_messages,
            shutdown,
            reaper: Mutex::new(Some(reaper)),
        })
    }
}

/// Long-lived gateway core. Owns the adapter cache, the outbound transport and
/// the stats; shut it down with [`close`](Self::close).
pub struct Router {
    config: Arc<dyn ConfigStore>,
    cache: Arc<AdapterCache>,
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenCounter>,
    stats: Arc<RequestStats>,
    timeouts: TimeoutConfig,
    log_messages: bool,
    shutdown: CancellationToken,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("cache", &self.cache)
            .field("timeouts", &self.timeouts)
            .field("log_messages", &self.log_messages)
            .finish_non_exhaustive()
    }
}

impl Router {
    pub fn builder(config: Arc<dyn ConfigStore>) -> RouterBuilder {
        RouterBuilder::new(config)
    }

    /// Router over a [`StaticConfigStore`] with the default transport and adapters.
    pub fn from_config(config: GatewayConfig) -> Result<Self, LlmError> {
        let timeouts = config.timeouts;
        let cache = config.cache;
        let log_messages = config.logging.log_messages;
        Self::builder(Arc::new(StaticConfigStore::new(config)))
            .timeouts(timeouts)
            .cache_config(cache)
            .log_messages(log_messages)
            .build()
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AdapterCache> {
        &self.cache
    }

    /// Check the caller key, then resolve `model_id` to a configured model.
    ///
    /// The key is checked before anything else is looked at. Every lookup
    /// goes through one configuration snapshot.
    pub fn validate(&self, model_id: &str, api_key: &str) -> Result<ResolvedRoute, LlmError> {
        let config = self.config.snapshot();
        if !config.validate_api_key(api_key) {
            return Err(LlmError::AuthenticationError("Invalid API key".into()));
        }

        let identifier = ModelIdentifier::parse(model_id, config.default_provider());
        let provider = config
            .get_provider_config(&identifier.provider)
            .ok_or_else(|| {
                LlmError::ValidationError(format!("Provider not supported: {}", identifier.provider))
            })?;
        let model_config = provider
            .models
            .get(&identifier.model_name)
            .cloned()
            .ok_or_else(|| {
                LlmError::ValidationError(format!("Model not supported: {}", identifier.model_name))
            })?;

        Ok(ResolvedRoute {
            proxy: config.get_proxy(provider.requires_proxy),
            identifier,
            provider,
            model_config,
        })
    }

    /// Unary chat completion.
    pub async fn route_request(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> Result<RouteResponse, LlmError> {
        let mut record = RequestRecord::new(&request.model, request.stream, Arc::clone(&self.stats));
        let result = self.dispatch_unary(&mut record, api_key, &request).await;
        if let Err(e) = &result {
            record.fail(e);
        }
        result
    }

    async fn dispatch_unary(
        &self,
        record: &mut RequestRecord,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<RouteResponse, LlmError> {
        let route = self.validate(&request.model, api_key)?;
        self.mark_validated(record, &route, request);
        if request.stream {
            return Err(LlmError::ValidationError(
                "Streaming requests must use the streaming endpoint".into(),
            ));
        }

        let (adapter, outbound) = self.prepare(&route, request).await?;
        record.dispatched();
        let response = self.transport.send(outbound).await?;

        if response.status != 200 {
            let status = response.status;
            let body = response.text().await?;
            let error = LlmError::upstream(&route.identifier.provider, status, body);
            let envelope = upstream_envelope(adapter.as_ref(), &error, status);
            record.fail_upstream(envelope.code, &envelope.message);
            return Ok(RouteResponse::UpstreamError(envelope));
        }

        let body = response.bytes().await?;
        let response = serde_json::from_slice::<Value>(&body)
            .map_err(LlmError::from)
            .and_then(|raw| adapter.process_response(raw))
            .map_err(|e| malformed_payload(&route.identifier.provider, &e, &body))?;

        let text = response.content_text().unwrap_or_default();
        let output_tokens = match response.usage.completion_tokens {
            0 => self.tokens.count_text(text, &route.identifier.model_name),
            reported => reported,
        };
        record.set_output_tokens(output_tokens);
        record.complete(200, self.log_messages.then_some(text));
        Ok(RouteResponse::Completion(response))
    }

    /// Streaming chat completion.
    ///
    /// Validation and payload preparation happen before this returns, so those
    /// failures surface as `Err`. Once the stream is handed out, every failure
    /// is reported in-band as one `data: {"error": ...}` chunk, and the
    /// sequence always ends with `data: [DONE]`.
    pub async fn route_request_stream(
        &self,
        api_key: &str,
        request: ChatRequest,
    ) -> Result<RouterStream, LlmError> {
        let mut record = RequestRecord::new(&request.model, true, Arc::clone(&self.stats));
        let (route, adapter, outbound) = match self.prepare_stream(&mut record, api_key, &request).await {
            Ok(prepared) => prepared,
            Err(e) => {
                record.fail(&e);
                return Err(e);
            }
        };

        let transport = Arc::clone(&self.transport);
        let tokens = Arc::clone(&self.tokens);
        let log_messages = self.log_messages;
        let provider = route.identifier.provider;
        let model = route.identifier.model_name;

        let stream = async_stream::stream! {
            let mut record = record;
            record.dispatched();

            let response = match transport.send(outbound).await {
                Ok(response) => response,
                Err(e) => {
                    let chunk = error_chunk(adapter.as_ref(), &e, e.status_code());
                    record.fail(&e);
                    yield chunk;
                    yield DONE_CHUNK.to_string();
                    return;
                }
            };

            if response.status != 200 {
                let status = response.status;
                let body = match response.text().await {
                    Ok(body) => body,
                    Err(e) => e.to_string(),
                };
                let error = LlmError::upstream(&provider, status, body);
                let code = bounded_status(status);
                let chunk = error_chunk(adapter.as_ref(), &error, code);
                record.fail_upstream(code, &error.to_string());
                yield chunk;
                yield DONE_CHUNK.to_string();
                return;
            }

            let mut chunks = adapter.process_stream(response.body);
            let mut collected = String::new();
            let mut failure = None;
            while let Some(item) = chunks.next().await {
                match item {
                    Ok(chunk) if chunk == DONE_CHUNK => break,
                    Ok(chunk) => {
                        if let Some(delta) = delta_text(&chunk) {
                            collected.push_str(&delta);
                        }
                        yield chunk;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            drop(chunks);

            record.set_output_tokens(tokens.count_text(&collected, &model));
            match failure {
                Some(e) => {
                    tracing::warn!(provider = %provider, model = %model, error = %e, "upstream stream failed");
                    let chunk = error_chunk(adapter.as_ref(), &e, e.status_code());
                    record.fail(&e);
                    yield chunk;
                }
                None => record.complete(200, log_messages.then_some(collected.as_str())),
            }
            yield DONE_CHUNK.to_string();
        };

        Ok(Box::pin(stream))
    }

    async fn prepare_stream(
        &self,
        record: &mut RequestRecord,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<(ResolvedRoute, Arc<dyn ProviderAdapter>, HttpTransportRequest), LlmError> {
        let route = self.validate(&request.model, api_key)?;
        self.mark_validated(record, &route, request);
        let mut request = request.clone();
        request.stream = true;
        let (adapter, outbound) = self.prepare(&route, &request).await?;
        Ok((route, adapter, outbound))
    }

    fn mark_validated(&self, record: &mut RequestRecord, route: &ResolvedRoute, request: &ChatRequest) {
        let model = &route.identifier.model_name;
        let input_tokens = self.tokens.count_messages(&request.messages, model);
        let messages = if self.log_messages {
            serde_json::to_string(&request.messages).ok()
        } else {
            None
        };
        record.validated(
            &route.identifier.provider,
            model,
            route.identifier.annotation.as_deref(),
            input_tokens,
            messages.as_deref(),
        );
    }

    /// Adapter lookup plus the outbound request for `route`.
    async fn prepare(
        &self,
        route: &ResolvedRoute,
        request: &ChatRequest,
    ) -> Result<(Arc<dyn ProviderAdapter>, HttpTransportRequest), LlmError> {
        let provider = &route.provider;
        let model = &route.identifier.model_name;
        let adapter = self
            .cache
            .get(&route.identifier.provider, model, &provider.adapter)
            .await?;
        let body = adapter.prepare_request(request, model, &route.model_config)?;
        let headers = adapter.get_headers(&provider.api_key)?;
        let timeout = route
            .model_config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.timeouts.total());

        let outbound = HttpTransportRequest {
            provider: route.identifier.provider.clone(),
            url: adapter.endpoint(&provider.base_url, model, request.stream),
            headers,
            body,
            timeout,
            proxy: route.proxy.clone(),
        };
        Ok((adapter, outbound))
    }

    /// Every configured model as an OpenAI-style listing.
    pub fn list_models(&self) -> ModelList {
        let created = chrono::Utc::now().timestamp();
        let data = self
            .config
            .providers()
            .into_iter()
            .flat_map(|(provider, config)| {
                config
                    .models
                    .keys()
                    .map(|model| ModelCard {
                        id: format!("{provider}/{model}"),
                        object: "model".to_string(),
                        created,
                        owned_by: provider.clone(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        ModelList {
            object: "list".to_string(),
            data,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop the cache reaper and release outbound connections.
    ///
    /// Idempotent. The router keeps serving afterwards; the transport rebuilds
    /// its pool on the next request.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let reaper = self
            .reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = reaper
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "adapter cache reaper ended abnormally");
        }
        self.cache.clear();
        self.transport.close().await;
        tracing::info!("router closed");
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Keep 4xx/5xx as is; anything else is reported as a bad gateway.
pub fn bounded_status(status: u16) -> u16 {
    if (400..=599).contains(&status) {
        status
    } else {
        FALLBACK_UPSTREAM_STATUS
    }
}

fn upstream_envelope(adapter: &dyn ProviderAdapter, error: &LlmError, status: u16) -> ErrorEnvelope {
    let code = bounded_status(status);
    let mapped = adapter.handle_error(error, code);
    let message = mapped["error"]["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| error.user_message());
    ErrorEnvelope::new(ErrorKind::Provider, code, message).with_details(json!({
        "provider": match error {
            LlmError::ProviderError { provider, .. } => provider.as_str(),
            _ => UNKNOWN_PROVIDER,
        },
        "status": status,
        "type": error.type_name(),
        "body": error.upstream_body().map(decode_body),
    }))
}

fn error_chunk(adapter: &dyn ProviderAdapter, error: &LlmError, status: u16) -> String {
    if error.kind() == ErrorKind::Internal {
        tracing::error!(error = %error, "internal failure during stream");
    }
    data_chunk(&adapter.handle_error(error, status))
}

fn malformed_payload(provider: &str, cause: &LlmError, body: &[u8]) -> LlmError {
    tracing::warn!(provider, error = %cause, "upstream returned an unusable payload");
    LlmError::ProviderError {
        provider: provider.to_string(),
        status: 500,
        message: format!("malformed upstream payload: {cause}"),
        body: Some(String::from_utf8_lossy(body).into_owned()),
    }
}

/// Text delta carried by a canonical chunk, if any.
fn delta_text(chunk: &str) -> Option<String> {
    let payload = chunk.strip_prefix("data: ")?.trim_end();
    let value: Value = serde_json::from_str(payload).ok()?;
    value["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::transport::HttpTransportResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned responses and records what was sent.
    #[derive(Default)]
    struct FakeTransport {
        calls: AtomicUsize,
        sent: Mutex<Vec<HttpTransportRequest>>,
        replies: Mutex<Vec<(u16, String)>>,
    }

    impl FakeTransport {
        fn replying(status: u16, body: &str) -> Arc<Self> {
            let fake = Self::default();
            fake.replies.lock().unwrap().push((status, body.to_string()));
            Arc::new(fake)
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(request);
            let (status, body) = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or((200, "{}".to_string()));
            Ok(HttpTransportResponse::from_bytes(status, body))
        }
    }

    fn gateway_config() -> GatewayConfig {
        let mut config = GatewayConfig {
            access_keys: vec!["sk-test".into()],
            ..Default::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig::new("https://api.openai.com/v1/chat/completions", "upstream-key", "openai")
                .with_model("gpt-4o-mini", ModelConfig::default())
                .with_model(
                    "slow",
                    ModelConfig {
                        timeout_secs: Some(5),
                        ..Default::default()
                    },
                ),
        );
        config
    }

    fn build_router(transport: Arc<FakeTransport>) -> Router {
        Router::builder(Arc::new(StaticConfigStore::new(gateway_config())))
            .transport(transport)
            .build()
            .unwrap()
    }

    fn hello() -> ChatRequest {
        ChatRequest::new("openai/gpt-4o-mini", vec![crate::types::ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn validate_checks_key_first() {
        let router = build_router(Arc::new(FakeTransport::default()));
        let err = router.validate("nope/nothing", "bad").unwrap_err();
        assert!(matches!(err, LlmError::AuthenticationError(_)));

        let err = router.validate("nope/nothing", "sk-test").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Provider not supported: nope");

        let err = router.validate("openai/gpt-5", "sk-test").unwrap_err();
        assert!(matches!(err, LlmError::ValidationError(_)));

        let route = router.validate("openai/gpt-4o-mini<fast>", "sk-test").unwrap();
        assert_eq!(route.identifier.model_name, "gpt-4o-mini");
        assert_eq!(route.identifier.annotation.as_deref(), Some("fast"));
    }

    /// Store whose contents change on every read.
    struct ShiftingStore {
        generations: Vec<Arc<crate::config::ConfigSnapshot>>,
        reads: AtomicUsize,
    }

    impl ConfigStore for ShiftingStore {
        fn snapshot(&self) -> Arc<crate::config::ConfigSnapshot> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst);
            Arc::clone(&self.generations[read.min(self.generations.len() - 1)])
        }
    }

    #[tokio::test]
    async fn validate_reads_one_generation() {
        let store = Arc::new(ShiftingStore {
            generations: vec![
                Arc::new(gateway_config().into()),
                Arc::new(GatewayConfig::default().into()),
            ],
            reads: AtomicUsize::new(0),
        });
        let router = Router::builder(store.clone())
            .transport(Arc::new(FakeTransport::default()))
            .build()
            .unwrap();

        let route = router.validate("openai/gpt-4o-mini", "sk-test").unwrap();
        assert_eq!(route.provider.adapter, "openai");
        assert_eq!(route.proxy, None);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unary_success_counts_once() {
        let transport = FakeTransport::replying(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"hello"}}],"usage":{"prompt_tokens":2,"completion_tokens":1}}"#,
        );
        let router = build_router(Arc::clone(&transport));

        let response = router.route_request("sk-test", hello()).await.unwrap();
        let RouteResponse::Completion(response) = response else {
            panic!("expected completion");
        };
        assert_eq!(response.content_text(), Some("hello"));
        assert_eq!(response.usage.total_tokens, 3);
        assert_eq!(router.stats()["openai"], ProviderStats { success: 1, failure: 0 });

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(sent[0].timeout, Duration::from_secs(600));
        assert_eq!(sent[0].body["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn per_model_timeout_overrides_total() {
        let transport = FakeTransport::replying(200, r#"{"choices":[]}"#);
        let router = build_router(Arc::clone(&transport));
        let request = ChatRequest::new("openai/slow", vec![crate::types::ChatMessage::user("hi")]);
        router.route_request("sk-test", request).await.unwrap();
        assert_eq!(transport.sent.lock().unwrap()[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn bad_key_never_reaches_upstream() {
        let transport = Arc::new(FakeTransport::default());
        let router = build_router(Arc::clone(&transport));
        let err = router.route_request("wrong", hello()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        let err = router.route_request_stream("wrong", hello()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(router.stats()[UNKNOWN_PROVIDER].failure, 2);
    }

    #[tokio::test]
    async fn unary_rejects_stream_flag() {
        let transport = Arc::new(FakeTransport::default());
        let router = build_router(Arc::clone(&transport));
        let err = router
            .route_request("sk-test", hello().with_stream(true))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::ValidationError(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upstream_error_is_a_value() {
        let transport = FakeTransport::replying(429, r#"{"error":{"message":"Rate limit reached"}}"#);
        let router = build_router(transport);
        let response = router.route_request("sk-test", hello()).await.unwrap();
        let RouteResponse::UpstreamError(envelope) = response else {
            panic!("expected upstream error");
        };
        assert_eq!(envelope.kind, ErrorKind::Provider);
        assert_eq!(envelope.code, 429);
        assert_eq!(envelope.message, "Rate limit reached");
        let details = envelope.details.unwrap();
        assert_eq!(details["status"], 429);
        assert_eq!(details["body"]["error"]["message"], "Rate limit reached");
        assert_eq!(router.stats()["openai"].failure, 1);
    }

    #[tokio::test]
    async fn odd_upstream_status_is_bounded() {
        let router = build_router(FakeTransport::replying(302, "moved"));
        let RouteResponse::UpstreamError(envelope) = router.route_request("sk-test", hello()).await.unwrap() else {
            panic!("expected upstream error");
        };
        assert_eq!(envelope.code, 502);
        assert_eq!(envelope.details.unwrap()["status"], 302);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_provider_error() {
        let router = build_router(FakeTransport::replying(200, r#"{"object":"nothing"}"#));
        let err = router.route_request("sk-test", hello()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("malformed upstream payload"));
        assert_eq!(err.upstream_body(), Some(r#"{"object":"nothing"}"#));

        let router2 = build_router(FakeTransport::replying(200, "not json"));
        let err = router2.route_request("sk-test", hello()).await.unwrap_err();
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn stream_upstream_error_is_in_band() {
        let router = build_router(FakeTransport::replying(503, "overloaded"));
        let chunks: Vec<String> = router
            .route_request_stream("sk-test", hello())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with("data: {\"error\""));
        assert!(chunks[0].contains("overloaded"));
        assert_eq!(chunks[1], DONE_CHUNK);
        assert_eq!(router.stats()["openai"].failure, 1);
    }

    #[tokio::test]
    async fn stream_sets_flag_and_terminates_without_upstream_done() {
        let body = concat!(
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hel\"}}]}\n\n",
            "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        );
        let transport = FakeTransport::replying(200, body);
        let router = build_router(Arc::clone(&transport));
        let chunks: Vec<String> = router
            .route_request_stream("sk-test", hello())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.last().map(String::as_str), Some(DONE_CHUNK));
        assert_eq!(transport.sent.lock().unwrap()[0].body["stream"], true);
        assert_eq!(router.stats()["openai"].success, 1);
    }

    #[tokio::test]
    async fn dropped_stream_is_recorded_as_failure() {
        let body = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
        let router = build_router(FakeTransport::replying(200, body));
        let mut stream = router.route_request_stream("sk-test", hello()).await.unwrap();
        assert!(stream.next().await.is_some());
        drop(stream);
        assert_eq!(router.stats()["openai"], ProviderStats { success: 0, failure: 1 });
    }

    #[tokio::test]
    async fn list_models_and_close() {
        let router = build_router(Arc::new(FakeTransport::default()));
        let models = router.list_models();
        assert_eq!(models.object, "list");
        let ids: Vec<_> = models.data.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["openai/gpt-4o-mini", "openai/slow"]);
        assert_eq!(models.data[0].owned_by, "openai");

        router.close().await;
        router.close().await;
    }

    #[test]
    fn build_requires_runtime() {
        let err = Router::builder(Arc::new(StaticConfigStore::new(gateway_config())))
            .build()
            .unwrap_err();
        assert!(matches!(err, LlmError::ConfigurationError(_)));
    }

    #[test]
    fn status_bounds() {
        assert_eq!(bounded_status(404), 404);
        assert_eq!(bounded_status(599), 599);
        assert_eq!(bounded_status(200), 502);
        assert_eq!(bounded_status(600), 502);
    }
}
