use std::time::Duration;

use crate::config::{AppConfig, UpstreamConfig};
use crate::error::RelayError;

use super::retry_policy::{retry_backoff_delay, should_retry_transport_error};

const USER_AGENT: &str = concat!("cohere-relay/", env!("CARGO_PKG_VERSION"));

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    timeout: Duration,
    proxy_url: Option<&str>,
) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(USER_AGENT)
        .timeout(timeout)
        // Proxy selection is resolved in config, never from reqwest's own env lookup.
        .no_proxy();

    if let Some(proxy_url) = proxy_url {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|err| RelayError::Config(format!("Invalid proxy URL: {err}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|err| RelayError::Config(format!("Failed to build HTTP client: {err}")))
}

/// HTTP client for the upstream chat endpoint.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    chat_url: url::Url,
    connect_retries: u32,
}

impl HttpTransport {
    /// Build the pooled client for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the chat URL or proxy is invalid, or the
    /// client cannot be built.
    pub fn new(config: &AppConfig) -> Result<Self, RelayError> {
        let server = &config.server;
        let upstream: &UpstreamConfig = &config.upstream;
        let pool_idle_timeout = if server.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(server.http_pool_idle_timeout_secs))
        };

        let client = build_reqwest_client(
            server.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(upstream.connect_timeout_secs),
            Duration::from_secs(server.timeout),
            upstream.proxy.as_deref(),
        )?;
        let chat_url = url::Url::parse(&upstream.chat_url())
            .map_err(|err| RelayError::Config(format!("Invalid upstream chat URL: {err}")))?;

        Ok(Self {
            client,
            chat_url,
            connect_retries: upstream.connect_retries,
        })
    }

    #[must_use]
    pub fn chat_url(&self) -> &url::Url {
        &self.chat_url
    }

    /// POST a JSON body to the chat endpoint.
    ///
    /// The response is returned whatever its status; the body is left unread so
    /// the caller can stream it.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] when no response could be obtained after
    /// the configured connect retries.
    pub async fn send_chat(
        &self,
        authorization: &str,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, RelayError> {
        let mut headers = http::HeaderMap::with_capacity(3);
        headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        headers.insert(http::header::ACCEPT, http::HeaderValue::from_static("*/*"));
        let auth_value = http::HeaderValue::from_str(authorization)
            .map_err(|_| RelayError::InvalidRequest("Invalid authorization key".to_string()))?;
        headers.insert(http::header::AUTHORIZATION, auth_value);

        let mut attempt = 0;
        loop {
            let mut request = reqwest::Request::new(http::Method::POST, self.chat_url.clone());
            *request.headers_mut() = headers.clone();
            *request.body_mut() = Some(reqwest::Body::from(body.clone()));

            match self.client.execute(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt >= self.connect_retries || !should_retry_transport_error(&err) {
                        return Err(RelayError::Transport(err.to_string()));
                    }

                    let delay = retry_backoff_delay(attempt);
                    tracing::debug!(
                        retry_attempt = attempt + 1,
                        delay_ms = delay.as_millis(),
                        error = %err,
                        "retrying upstream request after connect error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
