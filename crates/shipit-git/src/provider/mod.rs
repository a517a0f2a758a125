//! Git hosting provider abstraction.
//!
//! Every backend implements [`GitHostingProvider`]. The set of backends is
//! closed ([`ProviderKind`]) and [`provider_for`] is the only constructor the
//! publish flow needs.

mod gitee;
mod github;

pub use gitee::{GITEE_API, Gitee};
pub use github::Github;

use async_trait::async_trait;
use shipit_core::{Credential, ProviderKind};

use crate::{ApiResponse, ProviderResult};

/// Capabilities every git hosting backend exposes.
#[async_trait]
pub trait GitHostingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Replace the active credential and rebuild the request client.
    fn set_token(&mut self, token: Credential) -> ProviderResult<()>;

    /// Create a repository owned by the authenticated user.
    async fn create_repo(&self, name: &str) -> ProviderResult<ApiResponse>;

    /// Create a repository owned by an organization.
    async fn create_org_repo(&self, name: &str, org_login: &str) -> ProviderResult<ApiResponse>;

    /// SSH remote URL for a repository. Pure string construction.
    fn get_remote(&self, login: &str, name: &str) -> String;

    /// Look up a repository; `None` when the provider reports 404.
    async fn get_repo(&self, login: &str, name: &str) -> ProviderResult<Option<ApiResponse>>;

    async fn get_user(&self) -> ProviderResult<ApiResponse>;

    /// Organizations of `username` (first page of 100).
    async fn get_org(&self, username: &str) -> ProviderResult<ApiResponse>;

    fn get_ssh_key_url(&self) -> &'static str;

    fn get_token_help_url(&self) -> &'static str;
}

/// Shared response policy: a response is absent only when its status is
/// exactly 404. Every other status goes back to the caller unchanged.
pub fn handle_response(response: ApiResponse) -> Option<ApiResponse> {
    if response.status == 404 {
        None
    } else {
        Some(response)
    }
}

/// Construct the provider for `kind` with no token set.
pub fn provider_for(kind: ProviderKind) -> Box<dyn GitHostingProvider> {
    match kind {
        ProviderKind::Gitee => Box::new(Gitee::new()),
        ProviderKind::Github => Box::new(Github::new()),
    }
}
