//! CLI command implementations.

pub mod git;
pub mod publish;
