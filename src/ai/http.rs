//! HTTP plumbing shared by the remote providers.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ProviderError;

/// Longest error body kept in a [`ProviderError`].
const MAX_ERROR_BODY: usize = 500;

/// Send a JSON body and decode a JSON response, mapping failures onto
/// [`ProviderError`].
pub(crate) async fn post_json<B, T>(
    request: RequestBuilder,
    body: &B,
    timeout: Duration,
) -> Result<T, ProviderError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = request
        .header("content-type", "application/json")
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(&e, timeout))?;

    let response = check_status(response).await?;

    let text = response.text().await.map_err(|e| transport_error(&e, timeout))?;
    serde_json::from_str(&text).map_err(|e| ProviderError::MalformedResponse(e.to_string()))
}

fn transport_error(error: &reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Network(error.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = truncate(&body, MAX_ERROR_BODY);

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Auth(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { message, retry_after },
        _ => ProviderError::Api { status: status.as_u16(), message },
    })
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
