//! HTTP client for the verification backend.

use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::verify::{Decision, JoinTokenIssuer, VerificationOutcome, VoiceVerifier};
use async_trait::async_trait;
use serde::Deserialize;

/// Client for the backend's verification and token endpoints.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    api_url: String,
}

/// Raw verification response.
///
/// Backend versions disagree on field naming (`decision` vs `status`)
/// and older ones only return the boolean `verified`; intake accepts all
/// three and normalizes.
#[derive(Debug, Deserialize)]
struct VerifyResponse {
    decision: Option<String>,
    status: Option<String>,
    score: Option<f32>,
    reason: Option<String>,
    verified: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct JoinTokenResponse {
    token: String,
}

impl BackendClient {
    /// Create a client for the backend at `api_url` (no trailing slash).
    pub fn new(api_url: impl Into<String>) -> Self {
        let mut api_url = api_url.into();
        while api_url.ends_with('/') {
            api_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            api_url,
        }
    }
}

fn normalize_outcome(response: VerifyResponse) -> VerificationOutcome {
    let named = response.decision.or(response.status);
    let decision = match named.as_deref() {
        Some("VERIFIED") => Decision::Verified,
        Some("REPEAT") => Decision::Repeat,
        Some("DENIED") => Decision::Denied,
        // Fall back to the boolean for older backends
        _ => {
            if response.verified.unwrap_or(false) {
                Decision::Verified
            } else {
                Decision::Denied
            }
        }
    };
    VerificationOutcome {
        decision,
        score: response.score,
        reason: response.reason,
    }
}

#[async_trait]
impl VoiceVerifier for BackendClient {
    async fn verify(&self, wav: &[u8], access_token: &str) -> Result<VerificationOutcome> {
        let form = reqwest::multipart::Form::new().part(
            "audio",
            reqwest::multipart::Part::bytes(wav.to_vec())
                .file_name(defaults::CLIP_FILENAME)
                .mime_str("audio/wav")
                .map_err(|e| VoxgateError::VerificationRequestFailed {
                    message: e.to_string(),
                })?,
        );

        let response = self
            .client
            .post(format!("{}/verify-voice", self.api_url))
            .header("Authorization", format!("Bearer {}", access_token))
            .multipart(form)
            .send()
            .await
            .map_err(|e| VoxgateError::VerificationRequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(VoxgateError::VerificationRequestFailed {
                message: format!("backend returned {}: {}", status, body),
            });
        }

        let parsed: VerifyResponse =
            response
                .json()
                .await
                .map_err(|e| VoxgateError::VerificationRequestFailed {
                    message: format!("invalid response body: {}", e),
                })?;

        Ok(normalize_outcome(parsed))
    }
}

#[async_trait]
impl JoinTokenIssuer for BackendClient {
    async fn join_token(&self, access_token: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/join-token", self.api_url))
            .header("Authorization", format!("Bearer {}", access_token))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| VoxgateError::TokenRequestFailed {
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(VoxgateError::TokenRequestFailed {
                message: format!("backend returned {}", response.status()),
            });
        }

        let parsed: JoinTokenResponse =
            response
                .json()
                .await
                .map_err(|e| VoxgateError::TokenRequestFailed {
                    message: format!("invalid response body: {}", e),
                })?;

        Ok(parsed.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> VerifyResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_normalize_decision_field() {
        let outcome = normalize_outcome(response(
            r#"{"decision":"VERIFIED","score":0.91,"reason":null,"verified":true}"#,
        ));
        assert_eq!(outcome.decision, Decision::Verified);
        assert_eq!(outcome.score, Some(0.91));
        assert_eq!(outcome.reason, None);
    }

    #[test]
    fn test_normalize_status_field() {
        let outcome = normalize_outcome(response(r#"{"status":"REPEAT","score":0.55}"#));
        assert_eq!(outcome.decision, Decision::Repeat);
        assert_eq!(outcome.score, Some(0.55));
    }

    #[test]
    fn test_normalize_falls_back_to_verified_bool() {
        let verified = normalize_outcome(response(r#"{"verified":true,"score":0.88}"#));
        assert_eq!(verified.decision, Decision::Verified);

        let denied = normalize_outcome(response(r#"{"verified":false,"score":0.21}"#));
        assert_eq!(denied.decision, Decision::Denied);
    }

    #[test]
    fn test_normalize_unknown_name_uses_bool() {
        let outcome = normalize_outcome(response(r#"{"decision":"MAYBE","verified":false}"#));
        assert_eq!(outcome.decision, Decision::Denied);
    }

    #[test]
    fn test_normalize_keeps_reason() {
        let outcome = normalize_outcome(response(
            r#"{"decision":"DENIED","score":0.1,"reason":"spoof suspected"}"#,
        ));
        assert_eq!(outcome.reason.as_deref(), Some("spoof suspected"));
    }

    #[test]
    fn test_api_url_trailing_slash_trimmed() {
        let client = BackendClient::new("http://localhost:8000///");
        assert_eq!(client.api_url, "http://localhost:8000");
    }
}
