//! # LLM Bridge - A Gateway for Heterogeneous LLM Providers
//!
//! LLM Bridge accepts chat-completion requests in one canonical (OpenAI-style)
//! wire format and forwards them to one of several upstream providers, each
//! with its own request/response schema and streaming framing. Callers always
//! get the canonical format back.
//!
//! ## Features
//!
//! - **Provider Adapters**: one adapter per wire dialect (`openai`, `gemini`), registered by tag
//! - **SSE Reframing**: byte-boundary-agnostic Server-Sent Events parsing
//! - **Adapter Cache**: per-key locked construction with TTL eviction
//! - **Uniform Errors**: a small taxonomy mapped onto caller-facing envelopes
//! - **Always-On Accounting**: every request emits one structured outcome event
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_bridge::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), LlmError> {
//!     let config = GatewayConfig::load("config.yaml")?;
//!     let router = Router::from_config(config)?;
//!
//!     let request = ChatRequest::new("openai/gpt-4o-mini", vec![ChatMessage::user("hi")]);
//!     match router.route_request("sk-local-1", request).await? {
//!         RouteResponse::Completion(response) => {
//!             println!("{}", response.content_text().unwrap_or_default());
//!         }
//!         RouteResponse::UpstreamError(envelope) => {
//!             eprintln!("upstream failed with {}: {}", envelope.code, envelope.message);
//!         }
//!     }
//!
//!     router.close().await;
//!     Ok(())
//! }
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod error;
pub mod registry;
pub mod router;
pub mod streaming;
pub mod telemetry;
pub mod tokens;
pub mod transport;
pub mod types;

#[cfg(feature = "server")]
pub mod server_adapters;

pub use error::{ErrorEnvelope, ErrorKind, LlmError};
pub use router::{RouteResponse, Router};

/// Commonly used items.
pub mod prelude {
    pub use crate::adapters::ProviderAdapter;
    pub use crate::config::{ConfigStore, GatewayConfig, ModelConfig, ParamConfig, ProviderConfig, StaticConfigStore};
    pub use crate::error::{ErrorEnvelope, ErrorKind, LlmError};
    pub use crate::registry::{AdapterCache, AdapterFactory};
    pub use crate::router::{RouteResponse, Router, RouterStream};
    pub use crate::tokens::{HeuristicTokenCounter, TokenCounter};
    pub use crate::transport::{HttpTransport, ReqwestTransport};
    pub use crate::types::{ChatMessage, ChatRequest, ChatResponse, ModelIdentifier};
}
