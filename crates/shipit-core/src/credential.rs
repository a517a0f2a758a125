//! Access tokens for git hosting providers.

use std::fmt;

/// An opaque provider access token.
///
/// `Debug` and `Display` never render the token, so a `Credential` can sit
/// inside structs that get logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    /// The raw token, for placing on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_is_never_formatted() {
        let token = Credential::new("52d8a69c4f06");
        assert_eq!(format!("{}", token), "[REDACTED]");
        assert!(!format!("{:?}", token).contains("52d8"));
        assert_eq!(token.expose(), "52d8a69c4f06");
    }

    #[test]
    fn credential_trims_whitespace() {
        let token = Credential::new("  abc\n");
        assert_eq!(token.expose(), "abc");
        assert!(Credential::new("   ").is_empty());
    }
}
