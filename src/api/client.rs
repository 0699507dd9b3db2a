// HTTP client for the wizado.app license server

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LicenseConfig;

/// Failures talking to the license server.
///
/// The state machine relies on `Network` being distinguishable from an explicit
/// "license invalid" answer: a down server is routed through the offline grace
/// period, never treated as a revoked key.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not complete: connect failure, timeout, or HTTP 5xx.
    #[error("network error: {0}")]
    Network(String),
    /// The server answered but the body was not the expected JSON.
    #[error("invalid response from license server: {0}")]
    Malformed(String),
    /// The server rejected the request with a human-readable message.
    #[error("{0}")]
    Server(String),
}

#[derive(Debug, Serialize)]
struct VerifyRequest<'a> {
    email: &'a str,
    license: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateRequest<'a> {
    email: &'a str,
    license: &'a str,
    machine_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivateResponse {
    activated: bool,
    email: Option<String>,
    slots_used: Option<u32>,
    slots_total: Option<u32>,
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct RecoverRequest<'a> {
    email: &'a str,
}

#[derive(Debug, Deserialize)]
struct RecoverResponse {
    license: Option<String>,
    error: Option<String>,
}

/// Outcome of an activation attempt, as reported by the server.
#[derive(Debug, Clone)]
pub struct ActivationResult {
    pub activated: bool,
    pub email: Option<String>,
    pub slots_used: Option<u32>,
    pub slots_total: Option<u32>,
    pub message: String,
}

pub struct LicenseApiClient {
    client: reqwest::Client,
    api_url: String,
}

impl LicenseApiClient {
    pub fn new(config: &LicenseConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the server whether the key is still valid for this account.
    pub async fn verify(&self, email: &str, key: &str) -> Result<bool, ApiError> {
        let body = VerifyRequest {
            email,
            license: key,
        };

        let response = self
            .client
            .post(format!("{}/license/verify", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            warn!("License server returned {} on verify", status);
            return Err(ApiError::Network(format!("server returned {}", status)));
        }

        // 4xx bodies are still parsed; the server's verdict stands.
        let parsed: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        debug!("Verify response: valid={}", parsed.valid);
        Ok(parsed.valid)
    }

    /// Consume one of the key's activation slots for this machine.
    pub async fn activate(
        &self,
        email: &str,
        key: &str,
        machine_id: &str,
    ) -> Result<ActivationResult, ApiError> {
        let body = ActivateRequest {
            email,
            license: key,
            machine_id,
        };

        let response = self
            .client
            .post(format!("{}/license/activate", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            warn!("License server returned {} on activate", status);
            return Err(ApiError::Network(format!("server returned {}", status)));
        }

        let parsed: ActivateResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        let message = parsed
            .message
            .or(parsed.error)
            .unwrap_or_else(|| {
                if parsed.activated {
                    String::new()
                } else {
                    "Activation failed".to_string()
                }
            });

        Ok(ActivationResult {
            activated: parsed.activated,
            email: parsed.email,
            slots_used: parsed.slots_used,
            slots_total: parsed.slots_total,
            message,
        })
    }

    /// Best-effort key lookup by account email.
    pub async fn recover(&self, email: &str) -> Result<String, ApiError> {
        let body = RecoverRequest { email };

        let response = self
            .client
            .post(format!("{}/license/recover", self.api_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ApiError::Network(format!("server returned {}", status)));
        }

        let parsed: RecoverResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Malformed(e.to_string()))?;

        match (parsed.license, parsed.error) {
            (Some(key), _) => Ok(key),
            (None, Some(err)) => Err(ApiError::Server(err)),
            (None, None) => Err(ApiError::Server("license not found".to_string())),
        }
    }
}
