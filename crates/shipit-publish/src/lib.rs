//! Publish orchestration.
//!
//! A [`PublishFlow`] takes a project from its working directory to a remote
//! build: it checks the manifest and build command, makes sure the hosted
//! repository exists, commits and tags the release locally, pushes it and
//! hands the result to a [`shipit_cloudbuild::CloudBuild`] session.

pub mod error;
pub mod flow;

pub use error::{PublishError, PublishResult};
pub use flow::{PublishFlow, PublishOptions, PublishState, REMOTE};
