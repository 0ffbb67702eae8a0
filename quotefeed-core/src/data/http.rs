//! Blocking HTTP plumbing shared by the adapters.

use crate::data::provider::{DataError, ProviderId};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, error};

/// Default per-request timeout; there is no other timeout in a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// User-Agent that gets past bot filtering on the unauthenticated index API.
pub const BROWSER_USER_AGENT: &str = "PostmanRuntime/7.28.1";

/// Longest body excerpt carried in an error.
const BODY_EXCERPT: usize = 200;

/// Build a blocking client with the given timeout.
pub fn build_client(provider: ProviderId, timeout: Duration) -> Result<Client, DataError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DataError::Network {
            provider,
            detail: format!("failed to build HTTP client: {e}"),
        })
}

/// A successful (HTTP 200) response, fully read.
#[derive(Debug)]
pub struct HttpBody {
    pub headers: HeaderMap,
    pub text: String,
}

impl HttpBody {
    /// The `filename` parameter of the `Content-Disposition` header.
    pub fn attachment_filename(&self, provider: ProviderId) -> Result<String, DataError> {
        let header = self
            .headers
            .get(CONTENT_DISPOSITION)
            .ok_or_else(|| DataError::MissingMetadata {
                provider,
                detail: "no Content-Disposition header".into(),
            })?
            .to_str()
            .map_err(|e| DataError::MissingMetadata {
                provider,
                detail: format!("Content-Disposition is not text: {e}"),
            })?;

        disposition_filename(header).ok_or_else(|| DataError::MissingMetadata {
            provider,
            detail: format!("no filename in Content-Disposition {header:?}"),
        })
    }
}

/// Send a request and return the body of a 200 response.
pub fn send(provider: ProviderId, request: RequestBuilder) -> Result<HttpBody, DataError> {
    let response = request.send().map_err(|e| DataError::Network {
        provider,
        detail: e.to_string(),
    })?;

    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().map_err(|e| DataError::Network {
        provider,
        detail: format!("failed to read body: {e}"),
    })?;
    debug!(%provider, %status, bytes = text.len(), "response received");

    check_status(provider, status, &headers, &text)?;
    Ok(HttpBody { headers, text })
}

/// Anything but 200 is a provider failure, except 429 which is a rate-limit
/// signal carrying the server's `Retry-After` when present.
pub fn check_status(
    provider: ProviderId,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> Result<(), DataError> {
    if status == StatusCode::OK {
        return Ok(());
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(DataError::RateLimited {
            provider,
            retry_after,
        });
    }

    let excerpt: String = body.chars().take(BODY_EXCERPT).collect();
    error!(%provider, status = status.as_u16(), body = %excerpt, "unable to get data");
    Err(DataError::HttpStatus {
        provider,
        status: status.as_u16(),
        body: excerpt,
    })
}

/// Extract `filename` from a `Content-Disposition` value such as
/// `attachment; filename="STOCK_DAY_ALL_20210312.csv"`.
pub fn disposition_filename(header: &str) -> Option<String> {
    header.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("filename") {
            return None;
        }
        let value = value.trim().trim_matches('"').trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}
