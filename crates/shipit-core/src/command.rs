//! Allowlist for commands shipit hands to other programs.

use crate::{Error, Result};

/// Executables permitted by default.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &["npm", "cnpm"];

/// A command split into program and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl std::fmt::Display for CommandLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Split `command` on whitespace and check its executable against `allowed`.
pub fn check_command<S: AsRef<str>>(command: &str, allowed: &[S]) -> Result<CommandLine> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Error::InvalidInput("command is empty".to_string()))?;

    if !allowed.iter().any(|a| a.as_ref() == program) {
        return Err(Error::CommandNotAllowed {
            command: program.to_string(),
            allowed: allowed
                .iter()
                .map(|a| a.as_ref())
                .collect::<Vec<_>>()
                .join(", "),
        });
    }

    Ok(CommandLine {
        program: program.to_string(),
        args: parts.map(str::to_string).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_command_is_split() {
        let cmd = check_command("npm run build", DEFAULT_ALLOWED_COMMANDS).unwrap();
        assert_eq!(cmd.program, "npm");
        assert_eq!(cmd.args, vec!["run", "build"]);
        assert_eq!(cmd.to_string(), "npm run build");
    }

    #[test]
    fn test_disallowed_executable() {
        let err = check_command("rm -rf /", DEFAULT_ALLOWED_COMMANDS).unwrap_err();
        assert!(matches!(err, Error::CommandNotAllowed { command, .. } if command == "rm"));
    }

    #[test]
    fn test_prefix_is_not_enough() {
        // "npmx" must not pass because it starts with "npm".
        assert!(check_command("npmx install", DEFAULT_ALLOWED_COMMANDS).is_err());
    }

    #[test]
    fn test_empty_command() {
        assert!(matches!(
            check_command("   ", DEFAULT_ALLOWED_COMMANDS),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_custom_allowlist() {
        let allowed = vec!["pnpm".to_string()];
        assert!(check_command("pnpm build", &allowed).is_ok());
        assert!(check_command("npm run build", &allowed).is_err());
    }
}
