//! The project manifest contract.
//!
//! A publishable project carries a `package.json` with a `name`, a semantic
//! `version`, and a `scripts.build` command. Loading does no network I/O and
//! runs before anything else in a publish.

use serde_json::Value;
use std::path::Path;

use crate::{Error, Result};

pub const MANIFEST_FILE: &str = "package.json";

/// A validated project manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub version: semver::Version,
    /// `scripts.build`, the script the build service's command runs.
    pub build_script: String,
}

impl Manifest {
    /// Load and validate the manifest in `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::Precondition(format!(
                "{} not found in {}",
                MANIFEST_FILE,
                dir.display()
            )));
        }

        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content)
    }

    /// Validate manifest JSON text.
    pub fn parse(content: &str) -> Result<Self> {
        let doc: Value = serde_json::from_str(content)
            .map_err(|e| Error::Precondition(format!("{} is not valid JSON: {}", MANIFEST_FILE, e)))?;

        let name = non_empty_str(&doc, &["name"]).ok_or_else(|| missing("name"))?;
        let version = non_empty_str(&doc, &["version"]).ok_or_else(|| missing("version"))?;
        let build_script =
            non_empty_str(&doc, &["scripts", "build"]).ok_or_else(|| missing("scripts.build"))?;

        let version = semver::Version::parse(version).map_err(|e| {
            Error::Precondition(format!("version '{}' is not a semantic version: {}", version, e))
        })?;

        Ok(Self {
            name: name.to_string(),
            version,
            build_script: build_script.to_string(),
        })
    }
}

fn non_empty_str<'a>(doc: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(doc, |node, key| node.get(*key))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn missing(field: &str) -> Error {
    Error::Precondition(format!(
        "{} is incomplete: missing '{}' (name, version and scripts.build are required)",
        MANIFEST_FILE, field
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Manifest> {
        Manifest::parse(json)
    }

    #[test]
    fn test_parse_complete_manifest() {
        let manifest =
            parse(r#"{"name":"app","version":"1.0.0","scripts":{"build":"vite build"}}"#).unwrap();
        assert_eq!(manifest.name, "app");
        assert_eq!(manifest.version, semver::Version::new(1, 0, 0));
        assert_eq!(manifest.build_script, "vite build");
    }

    #[test]
    fn test_missing_fields_are_precondition_errors() {
        let cases = [
            r#"{"version":"1.0.0","scripts":{"build":"vite build"}}"#,
            r#"{"name":"app","scripts":{"build":"vite build"}}"#,
            r#"{"name":"app","version":"1.0.0"}"#,
            r#"{"name":"app","version":"1.0.0","scripts":{"serve":"vite"}}"#,
            r#"{"name":"","version":"1.0.0","scripts":{"build":"vite build"}}"#,
        ];

        for case in cases {
            assert!(
                matches!(parse(case), Err(Error::Precondition(_))),
                "expected precondition error for {case}"
            );
        }
    }

    #[test]
    fn test_non_semver_version_is_rejected() {
        let result = parse(r#"{"name":"app","version":"1.0","scripts":{"build":"x"}}"#);
        assert!(matches!(result, Err(Error::Precondition(msg)) if msg.contains("semantic")));
    }

    #[test]
    fn test_load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Precondition(msg) if msg.contains("not found")));
    }

    #[test]
    fn test_load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            r#"{"name":"app","version":"2.1.0","scripts":{"build":"vite build"}}"#,
        )
        .unwrap();

        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.version.to_string(), "2.1.0");
        assert_eq!(manifest.build_script, "vite build");
    }
}
