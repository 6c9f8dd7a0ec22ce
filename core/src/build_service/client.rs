/// HTTP submission of build requests
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION};
use reqwest::Client;
use std::time::Duration;

use super::retry::{
    evaluate_retry, is_retryable_status, retry_after_from_headers, RetryError, RetryPolicy,
};
use super::BuildServiceError;
use crate::config::BuildServiceOptions;
use crate::model::BuildRequest;
use crate::slug::slug_or_fallback;

/// Header carrying `BuildRequest::fingerprint`, so the service can cache
/// and deduplicate identical builds.
pub const FINGERPRINT_HEADER: &str = "x-comapeo-fingerprint";

const ARTIFACT_EXTENSION: &str = "comapeocat";

static FILENAME_STAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\*\s*=\s*(?:UTF-8|utf-8)?''([^;]+)"#).expect("valid filename* regex")
});

static FILENAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).expect("valid filename regex")
});

/// A built configuration archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub fingerprint: String,
    pub attempts: u32,
}

/// Percent-decoding for `filename*` values. Invalid escapes are kept as is.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'%' && index + 2 < bytes.len() {
            let hex = [bytes[index + 1], bytes[index + 2]];
            if let Some(byte) = std::str::from_utf8(&hex)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
            {
                decoded.push(byte);
                index += 3;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

/// File name from a `Content-Disposition` value, without any directory part.
pub fn file_name_from_disposition(value: &str) -> Option<String> {
    let raw = FILENAME_STAR_REGEX
        .captures(value)
        .map(|captures| percent_decode(captures[1].trim()))
        .or_else(|| {
            FILENAME_REGEX.captures(value).and_then(|captures| {
                captures
                    .get(1)
                    .or_else(|| captures.get(2))
                    .map(|name| name.as_str().to_string())
            })
        })?;
    let name = raw.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}

fn default_file_name(request: &BuildRequest) -> String {
    let name = slug_or_fallback(Some(&request.metadata.name), "config", 1);
    format!("{name}-{}.{ARTIFACT_EXTENSION}", request.metadata.version.trim())
}

fn disposition_name(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(file_name_from_disposition)
}

pub struct BuildServiceClient {
    client: Client,
    endpoint: String,
    policy: RetryPolicy,
    overall_timeout: Duration,
}

impl BuildServiceClient {
    pub fn new(options: &BuildServiceOptions) -> Result<Self, BuildServiceError> {
        let endpoint = options.endpoint.trim().to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(BuildServiceError::InvalidEndpoint(endpoint));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(options.request_timeout_secs))
            .user_agent(concat!("comapeo-config/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            policy: options.retry_policy(),
            overall_timeout: Duration::from_secs(options.overall_timeout_secs),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit `request`, retrying transient failures, within the overall
    /// timeout.
    pub async fn submit(&self, request: &BuildRequest) -> Result<BuildArtifact, BuildServiceError> {
        match tokio::time::timeout(self.overall_timeout, self.submit_with_retries(request)).await {
            Ok(result) => result,
            Err(_) => Err(BuildServiceError::Timeout(self.overall_timeout)),
        }
    }

    async fn submit_with_retries(
        &self,
        request: &BuildRequest,
    ) -> Result<BuildArtifact, BuildServiceError> {
        let fingerprint = request.fingerprint();
        let mut retries = 0u32;

        loop {
            let attempt = retries + 1;
            log::info!("submitting build {fingerprint} to {} (attempt {attempt})", self.endpoint);

            let (retry_error, failure) = match self
                .client
                .post(&self.endpoint)
                .header(FINGERPRINT_HEADER, &fingerprint)
                .json(request)
                .send()
                .await
            {
                Ok(response) if response.status().is_success() => {
                    let file_name = disposition_name(response.headers())
                        .unwrap_or_else(|| default_file_name(request));
                    let bytes = response.bytes().await?.to_vec();
                    if bytes.is_empty() {
                        return Err(BuildServiceError::EmptyArtifact);
                    }
                    log::info!("build {fingerprint} returned {file_name} ({} bytes)", bytes.len());
                    return Ok(BuildArtifact {
                        file_name,
                        bytes,
                        fingerprint,
                        attempts: attempt,
                    });
                }
                Ok(response) => {
                    let status = response.status();
                    let retry_after = retry_after_from_headers(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    let body: String = body.chars().take(500).collect();
                    (
                        RetryError::Http {
                            status,
                            retry_after,
                        },
                        BuildServiceError::Status {
                            status: status.as_u16(),
                            body,
                        },
                    )
                }
                Err(err) => {
                    let class = if err.is_timeout() || err.is_connect() || err.is_request() {
                        RetryError::Network
                    } else {
                        RetryError::Fatal
                    };
                    (class, BuildServiceError::Network(err))
                }
            };

            let decision = evaluate_retry(retry_error, self.policy, retries);
            if !decision.should_retry {
                let transient = match retry_error {
                    RetryError::Http { status, .. } => is_retryable_status(status),
                    RetryError::Network => true,
                    RetryError::Fatal => false,
                };
                return Err(if transient && retries > 0 {
                    BuildServiceError::Exhausted {
                        attempts: attempt,
                        last: failure.to_string(),
                    }
                } else {
                    failure
                });
            }

            log::warn!(
                "build attempt {attempt} failed ({failure}); retrying in {}ms{}",
                decision.delay.as_millis(),
                if decision.used_hint { " as the server asked" } else { "" }
            );
            tokio::time::sleep(decision.delay).await;
            retries += 1;
        }
    }
}
