//! Resolve a source string into text: a URL is fetched, a file is read and
//! anything else is taken literally.

use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::errors::ResolveError;
use crate::USER_AGENT;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const FILE_SCHEME: &str = "file://";

/// Where resolved text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Literal,
    File,
    Url,
}

impl SourceKind {
    /// Classify an input. URLs win over files, files over literal text.
    ///
    /// A `file://` input is a file even when the path does not exist, so a
    /// typo fails loudly instead of being sent as prompt text.
    pub fn classify(input: &str) -> Self {
        if is_url(input) {
            SourceKind::Url
        } else if is_file_path(input) {
            SourceKind::File
        } else {
            SourceKind::Literal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub text: String,
    pub kind: SourceKind,
}

pub fn resolve(input: &str) -> Result<ResolvedContent, ResolveError> {
    if input.is_empty() {
        return Ok(ResolvedContent {
            text: String::new(),
            kind: SourceKind::Literal,
        });
    }

    let kind = SourceKind::classify(input);
    let text = match kind {
        SourceKind::Url => load_from_url(input)?,
        SourceKind::File => load_from_file(input)?,
        SourceKind::Literal => input.to_string(),
    };
    debug!(kind = ?kind, bytes = text.len(), "resolved content");

    Ok(ResolvedContent { text, kind })
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn is_file_path(input: &str) -> bool {
    let path = input.strip_prefix(FILE_SCHEME).unwrap_or(input);
    Path::new(path).exists() || input.starts_with(FILE_SCHEME)
}

fn load_from_url(url: &str) -> Result<String, ResolveError> {
    let fetch_error = |source| ResolveError::Fetch {
        url: url.to_string(),
        source,
    };

    let client = Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(fetch_error)?;

    let response = client.get(url).send().map_err(fetch_error)?;
    if response.status() != StatusCode::OK {
        return Err(ResolveError::FetchStatus {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    response.text().map_err(fetch_error)
}

fn load_from_file(input: &str) -> Result<String, ResolveError> {
    let path = PathBuf::from(input.strip_prefix(FILE_SCHEME).unwrap_or(input));
    let bytes = fs::read(&path).map_err(|source| ResolveError::FileRead {
        path: path.clone(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
