// src/mode.rs
use crate::error::PacError;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

// Unanchored on purpose: PAC dialects decorate the mode word.
static MODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("SOCKS5|SOCKS|DIRECT|PROXY").expect("mode pattern is valid"));

/// Proxy type of a PAC directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Direct,
    Proxy,
    Socks,
    Socks5,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Direct => "DIRECT",
            Mode::Proxy => "PROXY",
            Mode::Socks => "SOCKS",
            Mode::Socks5 => "SOCKS5",
        }
    }

    /// Scheme given to an address that carries none. `DIRECT` has no mapping.
    pub fn default_scheme(&self) -> Option<&'static str> {
        match self {
            Mode::Direct => None,
            Mode::Proxy => Some("http"),
            Mode::Socks => Some("socks"),
            Mode::Socks5 => Some("socks5"),
        }
    }

    /// Case-insensitive test for a mode word anywhere in `token`.
    pub fn is_valid_token(token: &str) -> bool {
        MODE_PATTERN.is_match(&token.to_uppercase())
    }

    /// Classify `token` by the leftmost mode word it contains.
    pub fn classify(token: &str) -> Option<Mode> {
        let upper = token.to_uppercase();
        MODE_PATTERN
            .find(&upper)
            .and_then(|m| match m.as_str() {
                "SOCKS5" => Some(Mode::Socks5),
                "SOCKS" => Some(Mode::Socks),
                "DIRECT" => Some(Mode::Direct),
                "PROXY" => Some(Mode::Proxy),
                _ => None,
            })
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::classify(s).ok_or_else(|| PacError::InvalidDirective(format!("unknown mode `{}`", s)))
    }
}
