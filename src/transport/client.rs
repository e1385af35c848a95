//! `reqwest`-backed transport

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use super::{HttpTransport, HttpTransportRequest, HttpTransportResponse};
use crate::config::TimeoutConfig;
use crate::error::LlmError;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// One lazily built `reqwest::Client` per proxy setting.
///
/// Connect and read timeouts are fixed per client; the total timeout is set per
/// request. [`close`](HttpTransport::close) drops every client (and with it the
/// connection pools); the next request builds a fresh one.
#[derive(Debug)]
pub struct ReqwestTransport {
    timeouts: TimeoutConfig,
    clients: Mutex<HashMap<Option<String>, reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new(timeouts: TimeoutConfig) -> Self {
        Self {
            timeouts,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: Option<&str>) -> Result<reqwest::Client, LlmError> {
        let mut clients = self
            .clients
            .lock()
            .map_err(|e| LlmError::InternalError(format!("HTTP client lock poisoned: {e}")))?;
        let key = proxy.map(str::to_string);
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.timeouts.connect())
            .read_timeout(self.timeouts.read())
            .pool_idle_timeout(POOL_IDLE_TIMEOUT);
        if let Some(url) = proxy {
            // The proxy URL may embed credentials, so it is kept out of the message.
            let proxy = reqwest::Proxy::all(url)
                .map_err(|_| LlmError::ConfigurationError("Invalid proxy URL".into()))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("Failed to build HTTP client: {e}")))?;
        tracing::debug!(proxied = proxy.is_some(), "outbound HTTP client created");
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Number of live clients.
    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpTransportRequest) -> Result<HttpTransportResponse, LlmError> {
        let client = self.client_for(request.proxy.as_deref())?;
        let response = client
            .post(&request.url)
            .headers(request.headers)
            .timeout(request.timeout)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(provider = %request.provider, error = %e, "upstream request failed");
                LlmError::from(e)
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map(|chunk| chunk.map_err(LlmError::from));
        Ok(HttpTransportResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }

    async fn close(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());
        let released = clients.len();
        clients.clear();
        tracing::debug!(released, "outbound HTTP clients closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(url: String) -> HttpTransportRequest {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("authorization", "Bearer k".parse().unwrap());
        HttpTransportRequest {
            provider: "openai".into(),
            url,
            headers,
            body: serde_json::json!({"model": "m"}),
            timeout: Duration::from_secs(5),
            proxy: None,
        }
    }

    #[tokio::test]
    async fn posts_json_and_returns_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer k"))
            .and(body_json(serde_json::json!({"model": "m"})))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(1)
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(TimeoutConfig::default());
        let response = transport
            .send(request(format!("{}/v1/chat/completions", server.uri())))
            .await
            .unwrap();
        assert_eq!(response.status, 429);
        assert_eq!(response.text().await.unwrap(), "slow down");
    }

    #[tokio::test]
    async fn close_drops_clients_and_transport_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(TimeoutConfig::default());
        transport.send(request(server.uri())).await.unwrap();
        assert_eq!(transport.client_count(), 1);

        transport.close().await;
        assert_eq!(transport.client_count(), 0);

        let response = transport.send(request(server.uri())).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.client_count(), 1);
    }

    #[tokio::test]
    async fn total_timeout_is_enforced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let transport = ReqwestTransport::new(TimeoutConfig::default());
        let mut req = request(server.uri());
        req.timeout = Duration::from_millis(100);
        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, LlmError::TimeoutError(_)), "{err:?}");
    }
}
