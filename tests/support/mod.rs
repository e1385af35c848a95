//! Shared helpers for integration tests: gateway configs pointing at stub
//! upstreams, a call-counting transport and SSE fixtures.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use llm_bridge::config::{GatewayConfig, ModelConfig, ProviderConfig, StaticConfigStore};
use llm_bridge::error::LlmError;
use llm_bridge::router::Router;
use llm_bridge::transport::{HttpTransport, HttpTransportRequest, HttpTransportResponse, ReqwestTransport};

pub const ACCESS_KEY: &str = "sk-local-test";

/// Read a fixture from `tests/fixtures`.
pub fn fixture(name: &str) -> String {
    let path = format!("{}/tests/fixtures/{name}", env!("CARGO_MANIFEST_DIR"));
    std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {path}: {e}"))
}

/// Config with an `openai` and a `gemini` provider rooted at `upstream`.
pub fn gateway_config(upstream: &str) -> GatewayConfig {
    let mut config = GatewayConfig {
        access_keys: vec![ACCESS_KEY.to_string()],
        ..Default::default()
    };
    config.providers.insert(
        "openai".into(),
        ProviderConfig::new(format!("{upstream}/v1/chat/completions"), "sk-upstream-openai", "openai")
            .with_model("gpt-4o-mini", ModelConfig::default()),
    );
    config.providers.insert(
        "gemini".into(),
        ProviderConfig::new(
            format!("{upstream}/v1beta/models/{{model}}:generateContent"),
            "goog-upstream-key",
            "gemini",
        )
        .with_model("gemini-2.0-flash", ModelConfig::default()),
    );
    config
}

/// Router over `config` using the real reqwest transport.
pub fn router_for(config: GatewayConfig) -> Router {
    Router::from_config(config).expect("router builds inside a runtime")
}

/// Router plus a handle on its store, for reload tests.
pub fn reloadable_router(config: GatewayConfig) -> (Router, Arc<StaticConfigStore>) {
    let store = Arc::new(StaticConfigStore::new(config));
    let router = Router::builder(store.clone())
        .transport(Arc::new(ReqwestTransport::new(Default::default())))
        .build()
        .expect("router builds inside a runtime");
    (router, store)
}

/// Transport that counts calls and always answers with the same canned body.
#[derive(Debug)]
pub struct CountingTransport {
    pub calls: AtomicUsize,
    status: u16,
    body: String,
}

impl CountingTransport {
    pub fn new(status: u16, body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            status,
            body: body.into(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for CountingTransport {
    async fn send(&self, _request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HttpTransportResponse::from_bytes(self.status, self.body.clone()))
    }
}
