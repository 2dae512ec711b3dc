//! Shared HTTP plumbing for the provider adapters.

use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use strand_protocol::{ErrorKind, LlmModel, ProviderError};

/// Build the HTTP client every adapter shares. No overall request timeout:
/// responses are long-lived SSE streams. Connection establishment is
/// bounded instead.
pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(30))
        .build()
        .unwrap_or_default()
}

/// POST a JSON body and return the response, mapping transport failures.
pub(crate) async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    body: &Value,
) -> Result<reqwest::Response, ProviderError> {
    debug!(url, "sending provider request");
    let mut request = client.post(url).json(body);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            ProviderError::new(ErrorKind::Timeout, format!("request timed out: {e}"))
        } else {
            ProviderError::new(ErrorKind::Network, e.to_string())
        }
    })
}

/// Turn a non-2xx response into a classified error, honouring
/// `Retry-After`.
pub(crate) async fn status_error(resp: reqwest::Response) -> ProviderError {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = resp.text().await.unwrap_or_default();
    ProviderError::from_status(status, &body, retry_after)
}

/// The response body as a stream of byte chunks with transport errors
/// mapped to [`ProviderError`].
pub(crate) fn byte_stream(
    resp: reqwest::Response,
) -> impl Stream<Item = Result<Bytes, ProviderError>> + Unpin {
    resp.bytes_stream()
        .map(|chunk| chunk.map_err(|e| ProviderError::new(ErrorKind::Network, e.to_string())))
        .boxed()
}

/// Extra headers configured on the model, as a header list.
pub(crate) fn model_headers(model: &LlmModel) -> Vec<(String, String)> {
    model
        .headers
        .as_ref()
        .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default()
}
