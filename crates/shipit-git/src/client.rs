//! Authenticated REST client shared by provider variants.

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shipit_core::Credential;
use std::time::Duration;
use tracing::debug;

use crate::{ProviderError, ProviderResult};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_millis(5_000);

const USER_AGENT: &str = "shipit";

/// A provider API response reduced to status and payload.
///
/// Non-success responses are data too: the provider layer decides what a
/// status means (404 is "absent", everything else is passed through).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The provider-reported error detail, if any.
    pub fn error_message(&self) -> String {
        match &self.body {
            Value::String(s) => s.clone(),
            Value::Null => format!("HTTP {}", self.status),
            body => body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string()),
        }
    }

    /// Deserialize a success payload; a non-success status becomes
    /// [`ProviderError::Api`].
    pub fn json<T: DeserializeOwned>(self) -> ProviderResult<T> {
        if !self.is_success() {
            return Err(ProviderError::Api {
                status: self.status,
                message: self.error_message(),
            });
        }

        serde_json::from_value(self.body).map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

/// HTTP client that authenticates with an `access_token` query parameter.
pub struct ProviderClient {
    client: reqwest::Client,
    base_url: String,
    token: Credential,
}

impl ProviderClient {
    pub fn new(base_url: impl Into<String>, token: Credential) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> ProviderResult<ApiResponse> {
        let mut request = self
            .client
            .get(self.url(path))
            .query(query)
            .query(&[("access_token", self.token.expose())]);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        debug!(method = "GET", path, "Provider request");
        self.send(request).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> ProviderResult<ApiResponse> {
        let mut request = self
            .client
            .post(self.url(path))
            .query(&[("access_token", self.token.expose())])
            .json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        debug!(method = "POST", path, "Provider request");
        self.send(request).await
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn send(&self, request: RequestBuilder) -> ProviderResult<ApiResponse> {
        // The URL carries the token, so it is stripped from transport errors.
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.without_url().to_string()))?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        debug!(status, "Provider response");
        Ok(ApiResponse::new(status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_prefers_message_field() {
        let response = ApiResponse::new(422, json!({"message": "name already exists"}));
        assert_eq!(response.error_message(), "name already exists");

        let response = ApiResponse::new(500, Value::Null);
        assert_eq!(response.error_message(), "HTTP 500");

        let response = ApiResponse::new(502, Value::String("bad gateway".into()));
        assert_eq!(response.error_message(), "bad gateway");
    }

    #[test]
    fn test_json_rejects_non_success() {
        let response = ApiResponse::new(401, json!({"message": "401 Unauthorized"}));
        let err = response.json::<Value>().unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 401, .. }));
    }

    #[test]
    fn test_url_joins_relative_paths_and_keeps_absolute() {
        let client = ProviderClient::new("https://gitee.com/api/v5/", Credential::new("t")).unwrap();
        assert_eq!(client.url("/user"), "https://gitee.com/api/v5/user");
        assert_eq!(client.url("user/repos"), "https://gitee.com/api/v5/user/repos");
        assert_eq!(
            client.url("https://gitee.com/api/v5/repos/a/b"),
            "https://gitee.com/api/v5/repos/a/b"
        );
    }
}
