//! HTTP implementation of [`SecurityApi`]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{SecurityApi, UserId};
use crate::error::ApiError;
use crate::settings::RemoteSecuritySettings;

/// Connection settings for the security API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host, without a trailing slash (e.g. "https://api.example.com")
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PinRequest<'a> {
    pin: &'a str,
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserRequest<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BiometricRequest<'a> {
    user_id: &'a str,
    enabled: bool,
}

#[derive(Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Deserialize)]
struct AckResponse {
    #[serde(default)]
    ok: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// Security API over JSON/HTTP
///
/// Requests are sent once. A PIN verification must never be replayed
/// behind the caller's back, so there is no retry layer here.
pub struct HttpSecurityApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpSecurityApi {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    fn req(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .header(
                "User-Agent",
                format!("blockmint-lock/{}", env!("CARGO_PKG_VERSION")),
            )
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(url, request).await?;
        response.json::<T>().await.map_err(|e| ApiError::Decode {
            url: url.to_string(),
            error: e.to_string(),
        })
    }

    /// Send a mutation; an empty body or `{"ok": true}` is success
    async fn send_ack(&self, url: &str, request: RequestBuilder) -> Result<(), ApiError> {
        let response = self.send(url, request).await?;
        let body = response.bytes().await.map_err(|e| ApiError::Transport {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }

        let ack: AckResponse = serde_json::from_slice(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            error: e.to_string(),
        })?;

        match ack.ok {
            Some(false) => Err(ApiError::Rejected(
                ack.message.unwrap_or_else(|| "request not accepted".to_string()),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl SecurityApi for HttpSecurityApi {
    async fn fetch_settings(&self, user: &UserId) -> Result<RemoteSecuritySettings, ApiError> {
        let url = self.url("/api/security/settings");
        let request = self
            .req(Method::GET, &url)
            .query(&[("userId", user.as_str())]);
        self.send_json(&url, request).await
    }

    async fn verify_pin(&self, user: &UserId, pin: &str) -> Result<bool, ApiError> {
        let url = self.url("/api/security/verify-pin");
        let request = self.req(Method::POST, &url).json(&PinRequest {
            pin,
            user_id: user.as_str(),
        });
        let response: VerifyResponse = self.send_json(&url, request).await?;
        Ok(response.success)
    }

    async fn set_pin(&self, user: &UserId, pin: &str) -> Result<(), ApiError> {
        let url = self.url("/api/security/pin");
        let request = self.req(Method::POST, &url).json(&PinRequest {
            pin,
            user_id: user.as_str(),
        });
        self.send_ack(&url, request).await
    }

    async fn disable_pin(&self, user: &UserId) -> Result<(), ApiError> {
        let url = self.url("/api/security/pin/disable");
        let request = self.req(Method::POST, &url).json(&UserRequest {
            user_id: user.as_str(),
        });
        self.send_ack(&url, request).await
    }

    async fn set_biometric(&self, user: &UserId, enabled: bool) -> Result<(), ApiError> {
        let url = self.url("/api/security/biometric");
        let request = self.req(Method::POST, &url).json(&BiometricRequest {
            user_id: user.as_str(),
            enabled,
        });
        self.send_ack(&url, request).await
    }
}
