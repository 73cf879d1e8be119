// src/pac/source.rs
use super::engine::DECISION_FUNCTION;
use crate::credential::{redact_uri, Credential};
use crate::error::{PacError, Result};
use crate::log::Logger;
use crate::{log_debug, log_error, log_info};
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Where PAC content comes from, decided by looking at the specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PacOrigin {
    Remote,
    Text,
    File,
}

impl PacOrigin {
    pub(crate) fn detect(specifier: &str) -> Self {
        if specifier.starts_with("http://") || specifier.starts_with("https://") {
            PacOrigin::Remote
        } else if specifier.contains(DECISION_FUNCTION) {
            PacOrigin::Text
        } else {
            PacOrigin::File
        }
    }
}

/// Content plus the label the session reports as its source.
pub(crate) struct Loaded {
    pub label: String,
    pub content: String,
}

pub(crate) struct FetchSettings<'a> {
    pub timeout: Duration,
    pub credential: Option<&'a Credential>,
}

pub(crate) fn load(specifier: &str, fetch: &FetchSettings<'_>, logger: &Logger) -> Result<Loaded> {
    let loaded = match PacOrigin::detect(specifier) {
        PacOrigin::Remote => {
            let content = download_pac(specifier, fetch, logger)?;
            Loaded {
                label: redact_uri(specifier),
                content,
            }
        }
        PacOrigin::Text => Loaded {
            label: "text".to_string(),
            content: specifier.to_string(),
        },
        PacOrigin::File => {
            let path = resolve_file_path(specifier)?;
            let label = path.display().to_string();
            let content = fs::read_to_string(&path).map_err(|source| PacError::Read {
                path: label.clone(),
                source,
            })?;
            log_info!(logger, path = %label, bytes = content.len(), "PAC file loaded");
            Loaded { label, content }
        }
    };

    validate_content(&loaded.content)?;
    Ok(loaded)
}

/// Turn a file specifier into a filesystem path.
///
/// Bare and relative paths pass through untouched. `file://` URIs are
/// percent-decoded, and a Windows drive form such as `file:///C:/pac/x.pac`
/// loses the slash in front of the drive letter.
pub fn resolve_file_path(specifier: &str) -> Result<PathBuf> {
    if !specifier.contains("file://") {
        return Ok(PathBuf::from(specifier));
    }

    let url = Url::parse(specifier.trim()).map_err(|err| PacError::InvalidUrl {
        url: redact_uri(specifier),
        reason: err.to_string(),
    })?;
    let decoded = urlencoding::decode(url.path())
        .map_err(|err| PacError::InvalidUrl {
            url: redact_uri(specifier),
            reason: err.to_string(),
        })?
        .into_owned();

    let bytes = decoded.as_bytes();
    let drive_form = bytes.len() >= 4
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b':'
        && bytes[3] == b'/';
    if drive_form {
        Ok(PathBuf::from(&decoded[1..]))
    } else {
        Ok(PathBuf::from(decoded))
    }
}

pub(crate) fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(PacError::InvalidContent("content is empty".to_string()));
    }
    if !content.contains(DECISION_FUNCTION) {
        return Err(PacError::InvalidContent(format!(
            "`{}` is not defined",
            DECISION_FUNCTION
        )));
    }
    Ok(())
}

/// Clamp a status code into the range HTTP defines, falling back to 500.
pub(crate) fn sanitize_status(status: u16) -> u16 {
    if (100..=511).contains(&status) {
        status
    } else {
        StatusCode::INTERNAL_SERVER_ERROR.as_u16()
    }
}

fn download_pac(pac_url: &str, fetch: &FetchSettings<'_>, logger: &Logger) -> Result<String> {
    let origin = redact_uri(pac_url);
    let mut url = Url::parse(pac_url).map_err(|err| PacError::InvalidUrl {
        url: origin.clone(),
        reason: err.to_string(),
    })?;

    let embedded = userinfo_credential(&url);
    let _ = url.set_username("");
    let _ = url.set_password(None);
    let credential = fetch.credential.cloned().or(embedded);

    log_info!(logger, url = %origin, "Downloading PAC script");

    let client = Client::builder()
        .timeout(fetch.timeout)
        .build()
        .map_err(|source| PacError::Fetch {
            origin: origin.clone(),
            source,
        })?;

    let mut request = client.get(url);
    if let Some(credential) = &credential {
        log_debug!(logger, credential = %credential, "Attaching basic auth to PAC request");
        request = request.header(AUTHORIZATION, format!("Basic {}", credential.to_base64()));
    }

    let response = request.send().map_err(|source| PacError::Fetch {
        origin: origin.clone(),
        source,
    })?;

    let status = response.status();
    if status != StatusCode::OK {
        log_error!(logger, url = %origin, status = status.as_u16(), "PAC download failed");
        return Err(PacError::FetchStatus {
            origin,
            status: sanitize_status(status.as_u16()),
        });
    }

    let text = response.text().map_err(|source| PacError::Fetch {
        origin: origin.clone(),
        source,
    })?;
    log_info!(logger, url = %origin, bytes = text.len(), "PAC script downloaded");
    Ok(text)
}

fn userinfo_credential(url: &Url) -> Option<Credential> {
    let password = url.password()?;
    if url.username().is_empty() {
        return None;
    }
    let username = urlencoding::decode(url.username()).ok()?;
    let password = urlencoding::decode(password).ok()?;
    Credential::new(username.into_owned(), password.into_owned()).ok()
}
