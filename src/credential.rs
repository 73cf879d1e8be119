// src/credential.rs
use crate::error::{PacError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static BASIC_AUTH_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^:\s]+:\S+$").expect("basic auth pattern is valid"));

/// A basic-auth username/password pair.
///
/// Both `Display` and `Debug` redact the password, so a credential can be
/// logged or embedded in an error without leaking it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let password = password.into();
        if username.is_empty() || password.is_empty() {
            return Err(PacError::InvalidCredential(
                "username and password are required".to_string(),
            ));
        }
        let credential = Self { username, password };
        if credential.username.contains(':')
            || !BASIC_AUTH_SHAPE
                .is_match(&format!("{}:{}", credential.username, credential.password))
        {
            return Err(PacError::InvalidCredential(format!(
                "`{}` is not in username:password form",
                credential
            )));
        }
        Ok(credential)
    }

    /// Parse a `username:password` token, splitting on the first `:`.
    pub fn parse(token: &str) -> Result<Self> {
        match token.split_once(':') {
            Some((username, password)) => Self::new(username, password),
            None => Err(PacError::InvalidCredential(
                "expected username:password".to_string(),
            )),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Base64 of `username:password`, as sent in a Basic `Authorization` header.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.password))
    }

    /// `username:` followed by one `*` per password character.
    pub fn display(&self) -> String {
        format!("{}:{}", self.username, mask(&self.password))
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.username, mask(&self.password))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .finish()
    }
}

impl FromStr for Credential {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

pub(crate) fn mask(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

/// Mask the password in the userinfo of a URI-like string.
///
/// Works on raw text so that URIs which fail to parse can still be
/// rendered safely.
pub(crate) fn redact_uri(raw: &str) -> String {
    let Some(scheme_end) = raw.find("://") else {
        return raw.to_string();
    };
    let authority_start = scheme_end + 3;
    let rest = &raw[authority_start..];
    let authority_len = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..authority_len];
    let Some(at) = authority.rfind('@') else {
        return raw.to_string();
    };
    let userinfo = &authority[..at];
    let redacted = match userinfo.split_once(':') {
        Some((user, password)) => format!("{}:{}", user, mask(password)),
        None => userinfo.to_string(),
    };
    format!(
        "{}{}{}",
        &raw[..authority_start],
        redacted,
        &raw[authority_start + at..]
    )
}
