//! GitHub backend.
//!
//! Only the pure operations are available; REST calls report
//! [`ProviderError::NotImplemented`] instead of silently succeeding.

use async_trait::async_trait;
use shipit_core::{Credential, ProviderKind};

use super::GitHostingProvider;
use crate::{ApiResponse, ProviderError, ProviderResult};

#[derive(Default)]
pub struct Github {
    token: Option<Credential>,
}

impl Github {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn not_implemented<T>(operation: &'static str) -> ProviderResult<T> {
        Err(ProviderError::NotImplemented {
            provider: "github",
            operation,
        })
    }
}

#[async_trait]
impl GitHostingProvider for Github {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
    }

    fn set_token(&mut self, token: Credential) -> ProviderResult<()> {
        self.token = Some(token);
        Ok(())
    }

    async fn create_repo(&self, _name: &str) -> ProviderResult<ApiResponse> {
        Self::not_implemented("create_repo")
    }

    async fn create_org_repo(&self, _name: &str, _org_login: &str) -> ProviderResult<ApiResponse> {
        Self::not_implemented("create_org_repo")
    }

    fn get_remote(&self, login: &str, name: &str) -> String {
        format!("git@github.com:{}/{}.git", login, name)
    }

    async fn get_repo(&self, _login: &str, _name: &str) -> ProviderResult<Option<ApiResponse>> {
        Self::not_implemented("get_repo")
    }

    async fn get_user(&self) -> ProviderResult<ApiResponse> {
        Self::not_implemented("get_user")
    }

    async fn get_org(&self, _username: &str) -> ProviderResult<ApiResponse> {
        Self::not_implemented("get_org")
    }

    fn get_ssh_key_url(&self) -> &'static str {
        "https://github.com/settings/keys"
    }

    fn get_token_help_url(&self) -> &'static str {
        "https://docs.github.com/en/github"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rest_operations_are_not_implemented() {
        let mut github = Github::new();
        github.set_token(Credential::new("ghp_x")).unwrap();
        assert!(github.has_token());

        assert!(matches!(
            github.create_repo("app").await,
            Err(ProviderError::NotImplemented { operation: "create_repo", .. })
        ));
        assert!(matches!(
            github.create_org_repo("app", "acme").await,
            Err(ProviderError::NotImplemented { .. })
        ));
        assert!(matches!(
            github.get_repo("alice", "app").await,
            Err(ProviderError::NotImplemented { .. })
        ));
        assert!(matches!(github.get_user().await, Err(ProviderError::NotImplemented { .. })));
        assert!(matches!(github.get_org("alice").await, Err(ProviderError::NotImplemented { .. })));
    }

    #[test]
    fn test_remote_url_convention() {
        assert_eq!(
            Github::new().get_remote("alice", "app"),
            "git@github.com:alice/app.git"
        );
    }
}
