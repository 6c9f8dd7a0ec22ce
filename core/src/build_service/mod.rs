/// Client for the external configuration build service
pub mod client;
pub mod retry;

use std::time::Duration;

pub use self::client::{BuildArtifact, BuildServiceClient, FINGERPRINT_HEADER};
pub use self::retry::{evaluate_retry, parse_retry_after, RetryDecision, RetryError, RetryPolicy};

#[derive(Debug, thiserror::Error)]
pub enum BuildServiceError {
    #[error("invalid build service endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("could not reach the build service: {0}")]
    Network(#[from] reqwest::Error),

    #[error("build service answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("build service still failing after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("build did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("build service returned an empty artifact")]
    EmptyArtifact,
}
