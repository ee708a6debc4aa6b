//! Protected list retrieval from a local file or an HTTP(S) endpoint.
//!
//! The endpoint serves `{"protected": ["/store/...", ...]}`. Local files may
//! hold the same JSON document or a plain newline-delimited list (`#` starts a
//! comment). A failed fetch is always an error; only a successfully parsed
//! empty list yields an empty index.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::Deserialize;

use crate::core::errors::{Result, UmcError};

/// Where the protected list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectedListSource {
    /// Fetched with `curl`, bounded by `timeout`.
    Url { url: String, timeout: Duration },
    File(PathBuf),
}

#[derive(Debug, Deserialize)]
struct ProtectedDocument {
    protected: Vec<String>,
}

impl ProtectedListSource {
    /// Interpret a configured source string: `http://` and `https://` are
    /// URLs, anything else is a file path (an optional `file://` prefix is
    /// stripped).
    pub fn parse(source: &str, timeout: Duration) -> Self {
        let trimmed = source.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Url {
                url: trimmed.to_string(),
                timeout,
            }
        } else {
            Self::File(PathBuf::from(
                trimmed.strip_prefix("file://").unwrap_or(trimmed),
            ))
        }
    }

    /// Human-readable label for messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Url { url, .. } => url.clone(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Fetch and parse the list. Called once per run, before any walk.
    pub fn fetch(&self) -> Result<Vec<String>> {
        match self {
            Self::Url { url, timeout } => {
                let body = curl_get(url, *timeout)?;
                parse_json(&body).map_err(|details| UmcError::protected_list(url, details))
            }
            Self::File(path) => {
                let body = read_file(path)?;
                parse_payload(&body)
                    .map_err(|details| UmcError::protected_list(path.display().to_string(), details))
            }
        }
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| UmcError::protected_list(path.display().to_string(), e.to_string()))
}

fn curl_get(url: &str, timeout: Duration) -> Result<String> {
    let max_time = timeout.as_secs().max(1).to_string();
    let output = Command::new("curl")
        .args(["-fsSL", "--max-time", &max_time, "-H", "Accept: application/json", url])
        .output()
        .map_err(|e| UmcError::protected_list(url, format!("curl not found or failed: {e}")))?;

    if !output.status.success() {
        // curl exits 28 on --max-time expiry.
        let details = if output.status.code() == Some(28) {
            format!("request timed out after {max_time}s")
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            format!("request failed ({}): {}", output.status, stderr.trim())
        };
        return Err(UmcError::protected_list(url, details));
    }

    String::from_utf8(output.stdout)
        .map_err(|e| UmcError::protected_list(url, format!("response is not UTF-8: {e}")))
}

fn parse_json(body: &str) -> std::result::Result<Vec<String>, String> {
    serde_json::from_str::<ProtectedDocument>(body)
        .map(|doc| doc.protected)
        .map_err(|e| format!("malformed protected list: {e}"))
}

/// JSON document if the payload looks like one, newline list otherwise.
pub fn parse_payload(body: &str) -> std::result::Result<Vec<String>, String> {
    if body.trim_start().starts_with('{') {
        return parse_json(body);
    }
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}
