//! Repository types for publishing to a git hosting provider.

use serde::{Deserialize, Serialize};

/// Git hosting provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gitee,
    Github,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Gitee, ProviderKind::Github];
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gitee => write!(f, "gitee"),
            ProviderKind::Github => write!(f, "github"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gitee" => Ok(ProviderKind::Gitee),
            "github" => Ok(ProviderKind::Github),
            _ => Err(format!("Unknown git provider: {}", s)),
        }
    }
}

/// Whether the remote repository lives under the user or an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    #[default]
    User,
    Org,
}

impl std::fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OwnerKind::User => write!(f, "user"),
            OwnerKind::Org => write!(f, "org"),
        }
    }
}

impl std::str::FromStr for OwnerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "user" => Ok(OwnerKind::User),
            "org" | "organization" => Ok(OwnerKind::Org),
            _ => Err(format!("Unknown owner type: {}", s)),
        }
    }
}

/// Identifies the remote repository and the ref being published.
///
/// Built once per publish run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    login: String,
    name: String,
    branch: String,
    version: String,
    remote: String,
}

impl RepoDescriptor {
    pub fn new(
        login: impl Into<String>,
        name: impl Into<String>,
        branch: impl Into<String>,
        version: impl Into<String>,
        remote: impl Into<String>,
    ) -> Self {
        Self {
            login: login.into(),
            name: name.into(),
            branch: branch.into(),
            version: version.into(),
            remote: remote.into(),
        }
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The git remote URL (e.g. `git@gitee.com:login/name.git`).
    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// Tag name for the published version.
    pub fn tag(&self) -> String {
        format!("v{}", self.version)
    }
}

/// The account behind a provider token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// An organization the user belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitOrg {
    pub login: String,
}

/// A repository as reported by a provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRepo {
    #[serde(default)]
    pub id: Option<i64>,
    pub full_name: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub ssh_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_strings() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("GitHub".parse::<ProviderKind>().unwrap(), ProviderKind::Github);
        assert!("gitlab".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn owner_kind_accepts_organization_alias() {
        assert_eq!("organization".parse::<OwnerKind>().unwrap(), OwnerKind::Org);
        assert_eq!(OwnerKind::default(), OwnerKind::User);
    }

    #[test]
    fn descriptor_derives_tag_from_version() {
        let repo = RepoDescriptor::new(
            "alice",
            "app",
            "dev/1.0.0",
            "1.0.0",
            "git@gitee.com:alice/app.git",
        );
        assert_eq!(repo.tag(), "v1.0.0");
        assert_eq!(repo.branch(), "dev/1.0.0");
    }
}
