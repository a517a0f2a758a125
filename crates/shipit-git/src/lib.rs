//! Git hosting providers and local git operations.
//!
//! - [`client::ProviderClient`]: authenticated REST wrapper
//! - [`provider`]: the provider capability trait and its variants
//! - [`local::LocalRepo`]: the working copy being published

pub mod client;
pub mod error;
pub mod local;
pub mod provider;

pub use client::{ApiResponse, ProviderClient};
pub use error::{GitError, ProviderError, ProviderResult};
pub use local::LocalRepo;
pub use provider::{GitHostingProvider, Gitee, Github, handle_response, provider_for};
