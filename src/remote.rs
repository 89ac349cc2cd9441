// A padding oracle reached over HTTP.
//
// Speaks the protocol of `crate::server`: the candidate goes hex-encoded in
// the `ciphertext` query parameter and the status code carries the answer.
// Anything other than a clear "valid" or "invalid" is reported as an
// `OracleError`, which the recoverer retries according to its
// `RetryPolicy`.

use crate::{OracleError, PaddingOracle};

use reqwest::{blocking::Client, StatusCode};
use tracing::trace;

use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RemoteOracle {
    client: Client,
    base_url: String,
}

impl RemoteOracle {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches the server's `IV || ciphertext` challenge.
    pub fn challenge(&self) -> Result<Vec<u8>, OracleError> {
        let response = self
            .client
            .get(format!("{}/challenge", self.base_url))
            .send()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(OracleError::UnexpectedResponse {
                status: response.status().as_u16(),
            });
        }
        let body = response
            .text()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        hex::decode(body.trim()).map_err(|e| OracleError::Transport(format!("bad challenge: {e}")))
    }
}

impl PaddingOracle for RemoteOracle {
    fn query(&self, candidate: &[u8]) -> Result<bool, OracleError> {
        let uri = format!(
            "{}/oracle?ciphertext={}",
            self.base_url,
            hex::encode(candidate)
        );
        let response = self
            .client
            .get(uri)
            .send()
            .map_err(|e| OracleError::Transport(e.to_string()))?;
        trace!(status = %response.status(), "oracle answered");

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::FORBIDDEN => Ok(false),
            StatusCode::BAD_REQUEST => Err(OracleError::InvalidCandidate {
                len: candidate.len(),
            }),
            status => Err(OracleError::UnexpectedResponse {
                status: status.as_u16(),
            }),
        }
    }
}
