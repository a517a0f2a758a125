//! Gitee backend.

use async_trait::async_trait;
use serde_json::json;
use shipit_core::{Credential, ProviderKind};
use tracing::debug;

use super::{GitHostingProvider, handle_response};
use crate::{ApiResponse, ProviderClient, ProviderError, ProviderResult};

pub const GITEE_API: &str = "https://gitee.com/api/v5";

/// Gitee API v5 client.
pub struct Gitee {
    base_url: String,
    request: Option<ProviderClient>,
}

impl Default for Gitee {
    fn default() -> Self {
        Self::new()
    }
}

impl Gitee {
    pub fn new() -> Self {
        Self::with_base_url(GITEE_API)
    }

    /// Point the client at a different API root (self-hosted or test server).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request: None,
        }
    }

    fn request(&self) -> ProviderResult<&ProviderClient> {
        self.request
            .as_ref()
            .ok_or(ProviderError::MissingToken("gitee"))
    }
}

#[async_trait]
impl GitHostingProvider for Gitee {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gitee
    }

    fn set_token(&mut self, token: Credential) -> ProviderResult<()> {
        self.request = Some(ProviderClient::new(self.base_url.clone(), token)?);
        Ok(())
    }

    async fn create_repo(&self, name: &str) -> ProviderResult<ApiResponse> {
        debug!(name, "Creating user repository");
        self.request()?
            .post("/user/repos", &json!({ "name": name }), &[])
            .await
    }

    async fn create_org_repo(&self, name: &str, org_login: &str) -> ProviderResult<ApiResponse> {
        debug!(name, org = org_login, "Creating organization repository");
        let path = format!("/orgs/{}/repos", urlencoding::encode(org_login));
        self.request()?
            .post(&path, &json!({ "name": name }), &[])
            .await
    }

    fn get_remote(&self, login: &str, name: &str) -> String {
        format!("git@gitee.com:{}/{}.git", login, name)
    }

    async fn get_repo(&self, login: &str, name: &str) -> ProviderResult<Option<ApiResponse>> {
        let path = format!(
            "/repos/{}/{}",
            urlencoding::encode(login),
            urlencoding::encode(name)
        );
        let response = self.request()?.get(&path, &[], &[]).await?;
        Ok(handle_response(response))
    }

    async fn get_user(&self) -> ProviderResult<ApiResponse> {
        self.request()?.get("/user", &[], &[]).await
    }

    async fn get_org(&self, username: &str) -> ProviderResult<ApiResponse> {
        let path = format!("/users/{}/orgs", urlencoding::encode(username));
        self.request()?
            .get(&path, &[("page", "1"), ("per_page", "100")], &[])
            .await
    }

    fn get_ssh_key_url(&self) -> &'static str {
        "https://gitee.com/profile/sshkeys"
    }

    fn get_token_help_url(&self) -> &'static str {
        "https://gitee.com/help/articles/4191"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_url_convention() {
        let gitee = Gitee::new();
        assert_eq!(gitee.get_remote("alice", "app"), "git@gitee.com:alice/app.git");
    }

    #[tokio::test]
    async fn test_requests_without_token_fail() {
        let gitee = Gitee::new();
        let err = gitee.get_user().await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingToken("gitee")));
    }
}
