//! `shipit git` commands.

use anyhow::Result;
use shipit_config::{GitStateStore, shipit_home};
use shipit_core::ProviderKind;
use shipit_git::provider_for;

pub fn show() -> Result<()> {
    let store = GitStateStore::new(&shipit_home()?);

    let server = store.server()?;
    let display = |value: Option<String>| value.unwrap_or_else(|| "(not set)".to_string());

    println!("Git state in {}", store.dir().display());
    println!("  server: {}", display(server.map(|s| s.to_string())));
    println!("  owner:  {}", display(store.owner()?.map(|o| o.to_string())));
    println!("  login:  {}", display(store.login()?));
    println!(
        "  token:  {}",
        if store.token()?.is_some() { "set" } else { "(not set)" }
    );

    let provider = provider_for(server.unwrap_or(ProviderKind::Gitee));
    println!();
    println!("SSH keys:      {}", provider.get_ssh_key_url());
    println!("Access tokens: {}", provider.get_token_help_url());
    Ok(())
}

pub fn clear() -> Result<()> {
    let store = GitStateStore::new(&shipit_home()?);
    store.clear()?;
    println!("Cleared git state in {}", store.dir().display());
    Ok(())
}
