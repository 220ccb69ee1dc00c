use crate::error::{Error, Result};
use reqwest::{Client, header};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    base_delay_ms: u64,
}

impl HttpClient {
    /// The underlying client carries no total timeout so streamed bodies are
    /// never cut off. `timeout` bounds each call up to the response headers.
    pub fn new(user_agent: &str, connect_timeout: Duration, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::http(e.to_string()))?;

        Ok(Self {
            client,
            timeout,
            max_retries: 0,
            base_delay_ms: 500,
        })
    }

    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST a JSON body and return the full response text. Transient failures
    /// are retried; non-2xx responses come back as [`Error::Upstream`].
    pub async fn post_json_raw(
        &self,
        url: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> Result<String> {
        self.request_with_retry(|| {
            let mut req = self
                .client
                .post(url)
                .timeout(self.timeout)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_string());
            for (k, v) in headers {
                req = req.header(*k, *v);
            }
            req
        })
        .await
    }

    /// POST a JSON body with bearer auth and hand back the raw response once
    /// headers arrive. Single attempt; the status is left to the caller.
    pub async fn post_json_bearer(
        &self,
        url: &str,
        body: Vec<u8>,
        token: &str,
    ) -> Result<reqwest::Response> {
        let send = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(body)
            .send();

        match tokio::time::timeout(self.timeout, send).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(e)) => Err(Error::transport(e.to_string())),
            Err(_) => Err(Error::transport(format!(
                "upstream did not respond within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    async fn request_with_retry<F>(&self, build: F) -> Result<String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_error = Error::http("no attempts made");
        let mut delay = self.base_delay_ms;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt, delay_ms = delay, "retrying request");
                sleep(Duration::from_millis(delay)).await;
                delay = (delay * 2).min(10_000);
            }

            match build().send().await {
                Ok(resp) => return handle_response(resp).await,
                Err(e) => {
                    last_error = Error::http(e.to_string());
                    if e.is_timeout() || e.is_connect() {
                        warn!(attempt, "transient failure, will retry");
                        continue;
                    }
                    return Err(last_error);
                }
            }
        }

        Err(last_error)
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<String> {
    let status = resp.status();
    if status.is_success() {
        return resp.text().await.map_err(|e| Error::http(e.to_string()));
    }
    let content_type = content_type_of(&resp);
    let body = resp.bytes().await.unwrap_or_default();
    Err(Error::upstream(status.as_u16(), content_type, body))
}

pub(crate) fn content_type_of(resp: &reqwest::Response) -> Option<String> {
    resp.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

/// Join a base URL and a path without doubling the separator.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
