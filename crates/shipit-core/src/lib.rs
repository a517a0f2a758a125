//! Core domain types for the shipit publish pipeline.
//!
//! This crate contains:
//! - Run identifiers
//! - The project manifest contract
//! - Credentials and repository descriptors
//! - Build session events and states
//! - The build command allowlist

pub mod build;
pub mod command;
pub mod credential;
pub mod error;
pub mod id;
pub mod manifest;
pub mod repository;

pub use credential::Credential;
pub use error::{Error, Result};
pub use id::RunId;
pub use manifest::Manifest;
pub use repository::{OwnerKind, ProviderKind, RepoDescriptor};
