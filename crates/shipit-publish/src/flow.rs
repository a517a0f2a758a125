//! The publish flow: `prepare -> commit -> publish`.

use shipit_cloudbuild::{BuildSession, CloudBuild, CloudBuildOptions, Connector, SessionUpdate};
use shipit_config::{BuildSettings, CloudBuildSettings};
use shipit_core::build::BuildRequest;
use shipit_core::command::check_command;
use shipit_core::repository::{GitOrg, GitUser, RemoteRepo};
use shipit_core::{Credential, Manifest, OwnerKind, RepoDescriptor, RunId};
use shipit_git::{GitHostingProvider, LocalRepo};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::{PublishError, PublishResult};

/// Remote every publish pushes to.
pub const REMOTE: &str = "origin";

/// State of a publish run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PublishState {
    #[default]
    Idle,
    Prepared,
    Committed,
    Published,
    Done,
    Failed { reason: String },
}

impl PublishState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PublishState::Done | PublishState::Failed { .. })
    }
}

/// Everything a publish run needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Project directory holding the manifest.
    pub dir: PathBuf,
    pub token: Option<Credential>,
    pub owner: OwnerKind,
    /// Organization to publish under when `owner` is an organization.
    pub login: Option<String>,
    pub build: BuildSettings,
    pub cloudbuild: CloudBuildSettings,
}

impl PublishOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            token: None,
            owner: OwnerKind::User,
            login: None,
            build: BuildSettings::default(),
            cloudbuild: CloudBuildSettings::default(),
        }
    }
}

/// Sequences one publish run.
///
/// Stages must run in order. Any stage failure moves the flow to
/// [`PublishState::Failed`] and later stages refuse to run.
pub struct PublishFlow<C: Connector> {
    run_id: RunId,
    options: PublishOptions,
    provider: Box<dyn GitHostingProvider>,
    connector: C,
    local: LocalRepo,
    state: PublishState,
    manifest: Option<Manifest>,
    repo: Option<RepoDescriptor>,
    session: Option<BuildSession>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl<C: Connector> PublishFlow<C> {
    pub fn new(options: PublishOptions, provider: Box<dyn GitHostingProvider>, connector: C) -> Self {
        let local = LocalRepo::new(options.dir.clone());
        Self {
            run_id: RunId::new(),
            options,
            provider,
            connector,
            local,
            state: PublishState::Idle,
            manifest: None,
            repo: None,
            session: None,
            updates: None,
        }
    }

    /// Forward build session progress to `tx`.
    pub fn with_updates(mut self, tx: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(tx);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn state(&self) -> &PublishState {
        &self.state
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    /// The repository being published, known after `prepare`.
    pub fn repo(&self) -> Option<&RepoDescriptor> {
        self.repo.as_ref()
    }

    /// The build session, once `publish` has run one.
    pub fn session(&self) -> Option<&BuildSession> {
        self.session.as_ref()
    }

    /// Validate the project, resolve the account and make sure the remote
    /// repository and the local working copy exist.
    pub async fn prepare(&mut self) -> PublishResult<&RepoDescriptor> {
        self.expect_state(PublishState::Idle, "prepare")?;
        let result = self.prepare_inner().await;
        let repo = self.complete(result, PublishState::Prepared)?;
        self.repo = Some(repo);
        self.repo
            .as_ref()
            .ok_or_else(|| PublishError::Precondition("repository was not resolved".to_string()))
    }

    /// Commit local changes on the release branch and tag the version.
    pub async fn commit(&mut self) -> PublishResult<()> {
        self.expect_state(PublishState::Prepared, "commit")?;
        let result = self.commit_inner().await;
        self.complete(result, PublishState::Committed)
    }

    /// Push the release branch and tag, then run the remote build.
    pub async fn publish(&mut self) -> PublishResult<()> {
        self.expect_state(PublishState::Committed, "publish")?;
        let result = self.publish_inner().await;
        self.complete(result, PublishState::Done)
    }

    async fn prepare_inner(&mut self) -> PublishResult<RepoDescriptor> {
        let manifest = Manifest::load(&self.options.dir)?;
        info!(
            run_id = %self.run_id,
            name = %manifest.name,
            version = %manifest.version,
            build_script = %manifest.build_script,
            "Loaded manifest"
        );

        let command = check_command(
            &self.options.build.command,
            &self.options.build.allowed_commands,
        )?;
        info!(command = %command, "Build command accepted");

        let token = match self.options.token.clone() {
            Some(token) if !token.is_empty() => token,
            _ => {
                return Err(PublishError::Precondition(format!(
                    "no {} access token; create one at {}",
                    self.provider.kind(),
                    self.provider.get_token_help_url()
                )));
            }
        };
        self.provider.set_token(token)?;

        let user: GitUser = self.provider.get_user().await?.json()?;
        info!(login = %user.login, provider = %self.provider.kind(), "Authenticated");

        let login = match self.options.owner {
            OwnerKind::User => user.login,
            OwnerKind::Org => self.resolve_org(&user.login).await?,
        };

        self.ensure_remote_repo(&login, &manifest.name).await?;

        let remote = self.provider.get_remote(&login, &manifest.name);
        let version = manifest.version.to_string();
        let repo = RepoDescriptor::new(
            login,
            manifest.name.clone(),
            format!("dev/{}", version),
            version,
            remote,
        );

        self.local.ensure_init().await?;
        self.local.ensure_remote(REMOTE, repo.remote()).await?;
        self.local.ensure_gitignore().await?;

        self.manifest = Some(manifest);
        Ok(repo)
    }

    /// Pick the organization to publish under and check membership.
    async fn resolve_org(&self, username: &str) -> PublishResult<String> {
        let orgs: Vec<GitOrg> = self.provider.get_org(username).await?.json()?;
        let logins: Vec<&str> = orgs.iter().map(|o| o.login.as_str()).collect();

        match self.options.login.as_deref() {
            Some(login) if logins.contains(&login) => Ok(login.to_string()),
            Some(login) => Err(PublishError::Precondition(format!(
                "{} is not a member of organization '{}'",
                username, login
            ))),
            None => match logins.as_slice() {
                [only] => Ok(only.to_string()),
                [] => Err(PublishError::Precondition(format!(
                    "{} does not belong to any organization",
                    username
                ))),
                many => Err(PublishError::Precondition(format!(
                    "choose an organization with --login (one of: {})",
                    many.join(", ")
                ))),
            },
        }
    }

    async fn ensure_remote_repo(&self, login: &str, name: &str) -> PublishResult<()> {
        if let Some(response) = self.provider.get_repo(login, name).await? {
            let existing: RemoteRepo = response.json()?;
            info!(repo = %existing.full_name, "Remote repository exists");
            return Ok(());
        }

        info!(login, name, owner = %self.options.owner, "Remote repository not found, creating");
        let response = match self.options.owner {
            OwnerKind::User => self.provider.create_repo(name).await?,
            OwnerKind::Org => self.provider.create_org_repo(name, login).await?,
        };
        let created: RemoteRepo = response.json()?;
        info!(repo = %created.full_name, "Created remote repository");
        Ok(())
    }

    async fn commit_inner(&mut self) -> PublishResult<()> {
        let repo = self.prepared_repo("commit")?.clone();

        let conflicts = self.local.conflicted_files().await?;
        if !conflicts.is_empty() {
            return Err(PublishError::Conflict(conflicts));
        }

        self.local.checkout_branch(repo.branch()).await?;

        let tag = repo.tag();
        let message = format!("release {}", tag);
        if !self.local.commit_all(&message).await? {
            info!(branch = %repo.branch(), "Nothing to commit");
        }

        if !self.local.tag(&tag).await? {
            warn!(tag = %tag, "Tag already exists, keeping it");
        }
        Ok(())
    }

    async fn publish_inner(&mut self) -> PublishResult<()> {
        let repo = self.prepared_repo("publish")?.clone();
        let tag = repo.tag();

        self.local.push_branch(REMOTE, repo.branch()).await?;
        self.local.push_tag(REMOTE, &tag).await?;
        self.state = PublishState::Published;
        info!(run_id = %self.run_id, branch = %repo.branch(), tag = %tag, "Pushed release");

        let request = BuildRequest {
            repo: repo.remote().to_string(),
            name: repo.name().to_string(),
            branch: repo.branch().to_string(),
            version: repo.version().to_string(),
            build_command: self.options.build.command.clone(),
        };
        let endpoint = self.options.cloudbuild.endpoint.clone();
        let transport = self.connector.open(&endpoint, &request)?;
        let options = CloudBuildOptions {
            connect_timeout: self.options.cloudbuild.connect_timeout,
            build_timeout: self.options.cloudbuild.build_timeout,
        };

        let mut cloud = CloudBuild::new(transport, endpoint, request, options);
        if let Some(tx) = &self.updates {
            cloud = cloud.with_updates(tx.clone());
        }

        let result = async {
            cloud.init().await?;
            cloud.build().await
        }
        .await;
        cloud.shutdown().await;
        self.session = Some(cloud.session().clone());

        result?;
        info!(run_id = %self.run_id, "Remote build succeeded");
        Ok(())
    }

    fn prepared_repo(&self, operation: &'static str) -> PublishResult<&RepoDescriptor> {
        self.repo.as_ref().ok_or_else(|| PublishError::InvalidState {
            operation,
            state: "no repository was prepared".to_string(),
        })
    }

    fn expect_state(&self, expected: PublishState, operation: &'static str) -> PublishResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PublishError::InvalidState {
                operation,
                state: format!("publish is {:?}", self.state),
            })
        }
    }

    /// Record the stage outcome: `next` on success, `Failed` otherwise.
    fn complete<T>(&mut self, result: PublishResult<T>, next: PublishState) -> PublishResult<T> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "Publish stage failed");
                self.state = PublishState::Failed {
                    reason: e.to_string(),
                };
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_done_and_failed_are_terminal() {
        assert!(!PublishState::Idle.is_terminal());
        assert!(!PublishState::Published.is_terminal());
        assert!(PublishState::Done.is_terminal());
        assert!(
            PublishState::Failed {
                reason: "x".to_string()
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_default_options() {
        let options = PublishOptions::new("/tmp/app");
        assert_eq!(options.owner, OwnerKind::User);
        assert_eq!(options.build.command, "npm run build");
        assert!(options.token.is_none());
    }
}
