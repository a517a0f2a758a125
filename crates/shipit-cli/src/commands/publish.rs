//! `shipit publish`.

use anyhow::{Context, Result, bail};
use clap::Args;
use shipit_cloudbuild::{SessionUpdate, WsConnector};
use shipit_config::{GitStateStore, SETTINGS_FILE, load_settings, shipit_home};
use shipit_core::{Credential, OwnerKind, ProviderKind};
use shipit_git::provider_for;
use shipit_publish::{PublishFlow, PublishOptions};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Args, Debug, Default)]
pub struct PublishArgs {
    /// Command the build service runs (overrides settings.kdl)
    #[arg(long)]
    pub build_cmd: Option<String>,

    /// Git hosting provider
    #[arg(long)]
    pub server: Option<ProviderKind>,

    /// Provider access token
    #[arg(long, env = "SHIPIT_GIT_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Publish under the user or an organization
    #[arg(long)]
    pub owner: Option<OwnerKind>,

    /// Organization login when publishing under an organization
    #[arg(long)]
    pub login: Option<String>,

    /// Replace the stored provider with --server
    #[arg(long)]
    pub refresh_server: bool,

    /// Replace the stored token with --token
    #[arg(long)]
    pub refresh_token: bool,

    /// Replace the stored owner type and login with --owner/--login
    /// (a missing --login forgets the stored one)
    #[arg(long)]
    pub refresh_owner: bool,

    /// Project directory
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,
}

/// Provider settings for one run after flags and the store are merged.
#[derive(Debug)]
pub struct GitState {
    pub server: ProviderKind,
    pub token: Option<Credential>,
    pub owner: OwnerKind,
    pub login: Option<String>,
}

/// Merge flags with the stored state. Flags win for this run; they are
/// written back when nothing is stored yet or a `--refresh-*` flag asks
/// for it.
pub fn resolve_git_state(store: &GitStateStore, args: &PublishArgs) -> Result<GitState> {
    let server = resolve(
        args.server,
        store.server()?,
        args.refresh_server,
        "--refresh-server needs --server",
        |kind| store.set_server(*kind),
    )?
    .unwrap_or(ProviderKind::Gitee);

    let token = resolve(
        args.token.as_deref().map(Credential::new).filter(|t| !t.is_empty()),
        store.token()?,
        args.refresh_token,
        "--refresh-token needs --token or SHIPIT_GIT_TOKEN",
        |token| store.set_token(token),
    )?;

    let owner = resolve(
        args.owner,
        store.owner()?,
        args.refresh_owner,
        "--refresh-owner needs --owner",
        |owner| store.set_owner(*owner),
    )?
    .unwrap_or_default();

    // Without a login the flow picks the user's only organization.
    let login = match owner {
        OwnerKind::User => {
            if store.owner()? == Some(OwnerKind::User) {
                store.clear_login().context("failed to store git state")?;
            }
            None
        }
        OwnerKind::Org => match args.login.clone() {
            Some(login) => {
                if args.refresh_owner || store.login()?.is_none() {
                    store.set_login(&login).context("failed to store git state")?;
                }
                Some(login)
            }
            None if args.refresh_owner => {
                store.clear_login().context("failed to store git state")?;
                None
            }
            None => store.login()?,
        },
    };

    Ok(GitState {
        server,
        token,
        owner,
        login,
    })
}

fn resolve<T, F>(
    flag: Option<T>,
    stored: Option<T>,
    refresh: bool,
    missing: &str,
    save: F,
) -> Result<Option<T>>
where
    F: FnOnce(&T) -> shipit_config::ConfigResult<()>,
{
    match (flag, stored) {
        (Some(value), stored) => {
            if refresh || stored.is_none() {
                save(&value).context("failed to store git state")?;
            }
            Ok(Some(value))
        }
        (None, _) if refresh => bail!("{}", missing),
        (None, stored) => Ok(stored),
    }
}

pub async fn run(args: PublishArgs) -> Result<()> {
    let started = Instant::now();

    let home = shipit_home()?;
    let settings = load_settings(&home.join(SETTINGS_FILE))
        .with_context(|| format!("failed to load {}", home.join(SETTINGS_FILE).display()))?;
    let store = GitStateStore::new(&home);
    let git = resolve_git_state(&store, &args)?;
    debug!(server = %git.server, owner = %git.owner, login = ?git.login, "Resolved git state");

    let mut options = PublishOptions::new(&args.dir);
    options.token = git.token;
    options.owner = git.owner;
    options.login = git.login;
    options.build = settings.build;
    options.cloudbuild = settings.cloudbuild;
    if let Some(command) = args.build_cmd {
        options.build.command = command;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_updates(rx));

    let mut flow = PublishFlow::new(options, provider_for(git.server), WsConnector).with_updates(tx);
    info!(run_id = %flow.run_id(), dir = %args.dir.display(), "Starting publish");

    let result = async {
        let repo = flow.prepare().await?;
        println!("Prepared {} ({})", repo.name(), repo.remote());
        flow.commit().await?;
        println!("Committed and tagged");
        flow.publish().await
    }
    .await;

    // Dropping the flow closes the update channel so the printer can finish.
    let repo = flow.repo().cloned();
    drop(flow);
    let _ = printer.await;

    result.context("publish failed")?;
    if let Some(repo) = repo {
        println!(
            "Published {}@{} in {:.2}s",
            repo.name(),
            repo.version(),
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

async fn print_updates(mut rx: mpsc::UnboundedReceiver<SessionUpdate>) {
    while let Some(update) = rx.recv().await {
        match update {
            SessionUpdate::Connected { id } => println!("Build session {}", id),
            SessionUpdate::Progress(event) => println!("[{}] {}", event.action, event.message),
            SessionUpdate::Log(line) => match line.as_str() {
                Some(text) => println!("{}", text),
                None => println!("{}", line),
            },
            SessionUpdate::StateChanged(state) => debug!(?state, "Build state"),
        }
    }
}
