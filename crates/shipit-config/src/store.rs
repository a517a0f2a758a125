//! Persisted git hosting state.
//!
//! Each value lives in its own file under `<home>/.git/` so a single value
//! can be replaced (`--refresh-token`) without touching the others.

use crate::{ConfigError, ConfigResult};
use shipit_core::{Credential, OwnerKind, ProviderKind};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

const SERVER_FILE: &str = "server";
const TOKEN_FILE: &str = "token";
const OWNER_FILE: &str = "owner";
const LOGIN_FILE: &str = "login";

/// File-backed store for the chosen provider, token, owner type and login.
#[derive(Debug, Clone)]
pub struct GitStateStore {
    dir: PathBuf,
}

impl GitStateStore {
    /// Store rooted at `<home>/.git`.
    pub fn new(home: &Path) -> Self {
        Self {
            dir: home.join(".git"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn server(&self) -> ConfigResult<Option<ProviderKind>> {
        self.read(SERVER_FILE)?
            .map(|raw| {
                raw.parse::<ProviderKind>().map_err(|message| ConfigError::InvalidValue {
                    field: "git server".to_string(),
                    message,
                })
            })
            .transpose()
    }

    pub fn set_server(&self, kind: ProviderKind) -> ConfigResult<()> {
        self.write(SERVER_FILE, &kind.to_string())
    }

    pub fn token(&self) -> ConfigResult<Option<Credential>> {
        Ok(self
            .read(TOKEN_FILE)?
            .map(Credential::new)
            .filter(|c| !c.is_empty()))
    }

    /// The token file is created owner-only; an existing file is narrowed
    /// to owner-only before it is rewritten.
    pub fn set_token(&self, token: &Credential) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(TOKEN_FILE);
        if path.exists() {
            restrict_permissions(&path)?;
        }

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;
        file.write_all(token.expose().trim().as_bytes())?;
        debug!(file = TOKEN_FILE, "Stored git state");
        Ok(())
    }

    pub fn owner(&self) -> ConfigResult<Option<OwnerKind>> {
        self.read(OWNER_FILE)?
            .map(|raw| {
                raw.parse::<OwnerKind>().map_err(|message| ConfigError::InvalidValue {
                    field: "git owner".to_string(),
                    message,
                })
            })
            .transpose()
    }

    pub fn set_owner(&self, owner: OwnerKind) -> ConfigResult<()> {
        self.write(OWNER_FILE, &owner.to_string())
    }

    pub fn login(&self) -> ConfigResult<Option<String>> {
        self.read(LOGIN_FILE)
    }

    pub fn set_login(&self, login: &str) -> ConfigResult<()> {
        self.write(LOGIN_FILE, login)
    }

    pub fn clear_login(&self) -> ConfigResult<()> {
        self.remove(LOGIN_FILE)
    }

    /// Remove every stored value.
    pub fn clear(&self) -> ConfigResult<()> {
        for file in [SERVER_FILE, TOKEN_FILE, OWNER_FILE, LOGIN_FILE] {
            self.remove(file)?;
        }
        debug!(dir = %self.dir.display(), "Cleared git state");
        Ok(())
    }

    fn read(&self, file: &str) -> ConfigResult<Option<String>> {
        let path = self.dir.join(file);
        if !path.is_file() {
            return Ok(None);
        }

        let value = std::fs::read_to_string(&path)?.trim().to_string();
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    fn remove(&self, file: &str) -> ConfigResult<()> {
        let path = self.dir.join(file);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn write(&self, file: &str, value: &str) -> ConfigResult<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.dir.join(file), value.trim())?;
        debug!(file, "Stored git state");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> ConfigResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> ConfigResult<()> {
    Ok(())
}
