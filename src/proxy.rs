// src/proxy.rs
//! Typed proxy candidates parsed from a `FindProxyForURL` result.
//!
//! A decision string such as `"PROXY 4.5.6.7:8080; SOCKS5 4.5.6.7:8083; DIRECT"`
//! becomes an ordered list of [`ProxyCandidate`]s. Order is the client's
//! preference order and is never changed.

use crate::credential::{mask, redact_uri, Credential};
use crate::error::{PacError, Result};
use crate::mode::Mode;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use url::Url;

static PROXY_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("http|https|socks5|socks|quic").expect("proxy scheme pattern is valid")
});

/// An absolute proxy URI with a host.
///
/// Renders without the trailing `/` that `url` adds to special schemes, so
/// `http://4.5.6.7:8080` stays `http://4.5.6.7:8080`.
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyUri(Url);

impl ProxyUri {
    pub fn parse(address: &str) -> Result<Self> {
        let url = Url::parse(address).map_err(|e| PacError::InvalidProxyUri {
            uri: redact_uri(address),
            reason: e.to_string(),
        })?;
        if url.cannot_be_a_base() || url.host_str().map_or(true, str::is_empty) {
            return Err(PacError::InvalidProxyUri {
                uri: redact_uri(address),
                reason: "missing host".to_string(),
            });
        }
        Ok(Self(url))
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    /// Host as it appears in the URI (IPv6 in brackets).
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    /// Explicit port, or the scheme's default when it has one.
    pub fn port(&self) -> Option<u16> {
        self.0.port_or_known_default()
    }

    /// `host:port`, or just `host` when no port can be determined.
    pub fn authority(&self) -> String {
        match self.port() {
            Some(port) => format!("{}:{}", self.host(), port),
            None => self.host().to_string(),
        }
    }

    /// The credential embedded in the userinfo, if both parts are present.
    pub fn credential(&self) -> Option<Credential> {
        let password = self.0.password()?;
        let username = urlencoding::decode(self.0.username()).ok()?;
        let password = urlencoding::decode(password).ok()?;
        Credential::new(username.into_owned(), password.into_owned()).ok()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// String form with the password masked, for logs.
    pub fn redacted(&self) -> String {
        self.render(true)
    }

    pub(crate) fn set_credential(&mut self, credential: &Credential) -> Result<()> {
        let applied = self
            .0
            .set_username(credential.username())
            .and_then(|_| self.0.set_password(Some(credential.password())));
        applied.map_err(|_| PacError::InvalidProxyUri {
            uri: self.render(true),
            reason: "cannot carry credentials".to_string(),
        })
    }

    fn render(&self, redact: bool) -> String {
        let url = &self.0;
        let mut out = format!("{}://", url.scheme());
        if !url.username().is_empty() {
            out.push_str(url.username());
            if let Some(password) = url.password() {
                out.push(':');
                if redact {
                    out.push_str(&mask(password));
                } else {
                    out.push_str(password);
                }
            }
            out.push('@');
        }
        out.push_str(self.host());
        if let Some(port) = url.port() {
            out.push(':');
            out.push_str(&port.to_string());
        }
        if url.path() != "/" {
            out.push_str(url.path());
        }
        if let Some(query) = url.query() {
            out.push('?');
            out.push_str(query);
        }
        out
    }
}

impl fmt::Display for ProxyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl fmt::Debug for ProxyUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProxyUri").field(&self.render(true)).finish()
    }
}

/// One directive of a decision string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCandidate {
    mode: Mode,
    address: String,
    uri: Option<ProxyUri>,
}

impl ProxyCandidate {
    fn bare(mode: Mode) -> Self {
        Self {
            mode,
            address: String::new(),
            uri: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The address as parsed, with a scheme added when it had none.
    /// Empty for bare directives such as `DIRECT`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Proxy URI; always `None` for `DIRECT`.
    pub fn uri(&self) -> Option<&ProxyUri> {
        match self.mode {
            Mode::Direct => None,
            _ => self.uri.as_ref(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.mode == Mode::Direct
    }

    /// Embed `credential` in the URI's userinfo. Scheme, host and port are untouched.
    pub(crate) fn attach_credential(&mut self, credential: &Credential) -> Result<()> {
        match self.uri.as_mut() {
            Some(uri) if self.mode != Mode::Direct => uri.set_credential(credential),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.uri() {
            Some(uri) => write!(f, "{} {}", self.mode, uri),
            None => f.write_str(self.mode.as_str()),
        }
    }
}

/// Parse the raw result of `FindProxyForURL` into ordered candidates.
///
/// Segments with zero or more than two fields are skipped. Any other
/// malformed segment fails the whole parse.
pub fn parse_proxies(decision: &str) -> Result<Vec<ProxyCandidate>> {
    let mut candidates = Vec::new();

    for segment in decision.split(';') {
        let fields: Vec<&str> = segment.split_whitespace().collect();
        match fields.as_slice() {
            [token] => candidates.push(ProxyCandidate::bare(classify(token)?)),
            [token, address] => candidates.push(parse_directive(classify(token)?, address)?),
            _ => continue,
        }
    }

    Ok(candidates)
}

fn classify(token: &str) -> Result<Mode> {
    Mode::classify(token)
        .ok_or_else(|| PacError::InvalidDirective(format!("unknown mode `{}`", token)))
}

fn parse_directive(mode: Mode, address: &str) -> Result<ProxyCandidate> {
    if address.is_empty() {
        return Err(PacError::InvalidDirective(format!(
            "{} directive without address",
            mode
        )));
    }

    let address = match mode.default_scheme() {
        Some(scheme) if !PROXY_SCHEME.is_match(address) => format!("{}://{}", scheme, address),
        _ => address.to_string(),
    };

    let uri = ProxyUri::parse(&address)?;

    Ok(ProxyCandidate {
        mode,
        address,
        uri: Some(uri),
    })
}
