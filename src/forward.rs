//! Forward the adapted request upstream and relay the answer, buffered or streamed.

use crate::adapter::Credentials;
use crate::chat::ChatRequest;
use crate::config::UpstreamConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, content_type_of};
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// A successful upstream answer, ready to hand to the caller.
pub enum Relay {
    Json(serde_json::Value),
    Stream(ByteStream),
}

impl IntoResponse for Relay {
    fn into_response(self) -> Response {
        match self {
            Relay::Json(value) => axum::Json(value).into_response(),
            Relay::Stream(stream) => (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/event-stream"),
                    (header::CACHE_CONTROL, "no-cache"),
                    (header::CONNECTION, "keep-alive"),
                ],
                Body::from_stream(stream),
            )
                .into_response(),
        }
    }
}

pub struct UpstreamForwarder {
    http: HttpClient,
}

impl UpstreamForwarder {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let http = HttpClient::new(
            concat!("agent-relay/", env!("CARGO_PKG_VERSION")),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.response_timeout_secs),
        )?;
        Ok(Self::new(http))
    }

    /// Send `request` to the upstream named by `credentials`.
    ///
    /// Non-2xx answers become [`Error::Upstream`] carrying the status and raw
    /// body. Network failures and timeouts become [`Error::Transport`].
    pub async fn forward(&self, request: &ChatRequest, credentials: &Credentials) -> Result<Relay> {
        let url = credentials.endpoint();
        let streaming = request.is_stream();
        let body = serde_json::to_vec(request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let started = Instant::now();
        let resp = self
            .http
            .post_json_bearer(&url, body, &credentials.api_key)
            .await
            .inspect_err(|e| warn!(%url, error = %e, "upstream unreachable"))?;

        let status = resp.status();
        info!(
            %url,
            status = status.as_u16(),
            streaming,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream responded"
        );

        if !status.is_success() {
            let content_type = content_type_of(&resp);
            let body = self.read_body(resp).await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %String::from_utf8_lossy(&body), "upstream error");
            return Err(Error::upstream(status.as_u16(), content_type, body));
        }

        if streaming {
            return Ok(Relay::Stream(relay_stream(resp, started)));
        }

        let body = self.read_body(resp).await?;
        let value = serde_json::from_slice(&body)
            .map_err(|e| Error::parse(format!("upstream returned invalid JSON: {e}")))?;
        Ok(Relay::Json(value))
    }

    async fn read_body(&self, resp: reqwest::Response) -> Result<Bytes> {
        match tokio::time::timeout(self.http.timeout(), resp.bytes()).await {
            Ok(Ok(bytes)) => Ok(bytes),
            Ok(Err(e)) => Err(Error::transport(e.to_string())),
            Err(_) => Err(Error::transport("timed out reading upstream response")),
        }
    }
}

struct RelayState {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    started: Instant,
    bytes: u64,
    finished: bool,
}

impl RelayState {
    /// Mark the relay as ended by the upstream rather than by the caller.
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for RelayState {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        if self.finished {
            debug!(bytes = self.bytes, elapsed_ms, "stream relay finished");
        } else {
            info!(
                bytes = self.bytes,
                elapsed_ms, "caller disconnected, closing upstream stream"
            );
        }
    }
}

/// Pass upstream chunks through as they arrive. Dropping the returned stream
/// (the caller went away) drops the upstream body and closes its connection.
fn relay_stream(resp: reqwest::Response, started: Instant) -> ByteStream {
    let state = RelayState {
        inner: resp.bytes_stream().boxed(),
        started,
        bytes: 0,
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        match state.inner.next().await {
            Some(Ok(chunk)) => {
                state.bytes += chunk.len() as u64;
                Some((Ok(chunk), state))
            }
            Some(Err(e)) => {
                warn!(error = %e, bytes = state.bytes, "upstream stream failed mid-relay");
                state.finish();
                Some((Err(std::io::Error::other(e)), state))
            }
            None => {
                state.finish();
                None
            }
        }
    })
    .boxed()
}
