//! Utility functions for base URLs, target URIs and wordlists.

use crate::error::ProbeError;
use reqwest::Url;
use std::path::Path;

/// Parse and normalize a base URL.
///
/// Only `http` and `https` are accepted and a host is required. The fragment
/// is dropped and the path always ends with `/`, so candidates are appended
/// below the given path rather than replacing its last segment.
///
/// # Example
///
/// ```rust
/// use dirprobe_lib::parse_base_url;
///
/// let base = parse_base_url("https://example.com/app").unwrap();
/// assert_eq!(base.as_str(), "https://example.com/app/");
/// ```
pub fn parse_base_url(input: &str) -> Result<Url, ProbeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ProbeError::invalid_base_url(input, "URL cannot be empty"));
    }

    let mut url =
        Url::parse(trimmed).map_err(|e| ProbeError::invalid_base_url(trimmed, e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProbeError::invalid_base_url(
                trimmed,
                format!("unsupported scheme '{}'", other),
            ))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ProbeError::invalid_base_url(trimmed, "URL has no host"));
    }

    url.set_fragment(None);
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Build the target URI for one candidate.
///
/// Leading slashes are stripped from the candidate so that a wordlist entry
/// like `//other.host` stays a path under the base host. Dot segments
/// (`.`, `..` and their `%2e` spellings) are dropped from the candidate's
/// path, so `../secret` resolves to `<base>/secret` and never climbs above
/// the base path. If the combined string does not parse, it is returned
/// as-is and the probe reports the failure as an invalid target.
pub fn resolve_target(base: &Url, candidate: &str) -> String {
    let candidate = without_dot_segments(candidate.trim());
    let candidate = candidate.trim_start_matches('/');

    // Query is kept separate so the candidate lands in the path
    let mut prefix = base.clone();
    let query = prefix.query().map(str::to_string);
    prefix.set_query(None);

    let raw = format!("{}{}", prefix.as_str(), candidate);
    match Url::parse(&raw) {
        Ok(mut url) => {
            if url.query().is_none() {
                if let Some(query) = query.as_deref() {
                    url.set_query(Some(query));
                }
            }
            url.to_string()
        }
        Err(_) => raw,
    }
}

/// Remove dot segments from the path part of a candidate.
///
/// Backslashes count as separators, the same as in http(s) URL parsing.
/// The query and fragment are left untouched.
fn without_dot_segments(candidate: &str) -> String {
    let split = candidate.find(['?', '#']).unwrap_or(candidate.len());
    let (path, rest) = candidate.split_at(split);

    let path = path
        .split(['/', '\\'])
        .filter(|segment| !is_dot_segment(segment))
        .collect::<Vec<_>>()
        .join("/");
    format!("{}{}", path, rest)
}

fn is_dot_segment(segment: &str) -> bool {
    matches!(
        segment.to_ascii_lowercase().as_str(),
        "." | "%2e" | ".." | ".%2e" | "%2e." | "%2e%2e"
    )
}

/// Extract candidates from wordlist text.
///
/// Blank lines and `#` comments are skipped, inline comments and
/// surrounding whitespace are stripped. Order is preserved.
pub fn parse_wordlist(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let entry = line.split('#').next().unwrap_or("").trim();
            if entry.is_empty() {
                None
            } else {
                Some(entry.to_string())
            }
        })
        .collect()
}

/// Read a wordlist file and return its candidates.
///
/// # Errors
///
/// Returns `ProbeError::FileError` if the file cannot be read or contains
/// no candidates.
pub async fn load_wordlist<P: AsRef<Path>>(path: P) -> Result<Vec<String>, ProbeError> {
    let path = path.as_ref();
    let shown = path.to_string_lossy();

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProbeError::file_error(shown.as_ref(), e.to_string()))?;

    let candidates = parse_wordlist(&content);
    if candidates.is_empty() {
        return Err(ProbeError::file_error(
            shown.as_ref(),
            "No candidates found in wordlist",
        ));
    }

    tracing::debug!(path = %path.display(), count = candidates.len(), "loaded wordlist");
    Ok(candidates)
}
