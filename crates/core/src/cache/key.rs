//! Content-addressed cache key generation.
//!
//! ### URL normalization
//! - Trim whitespace, default scheme `https` when none is given
//! - Lowercase scheme and host, strip the scheme's default port
//! - Collapse trailing slashes (the root path `/` is kept)
//! - Sort query parameters by key, then value
//! - Drop the fragment
//!
//! ### Project names
//! - Trim, collapse internal whitespace runs to one space, keep case

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::Error;
use crate::identity::ProcessIdentity;

const URL_HASH_LEN: usize = 16;
const PROJECT_HASH_LEN: usize = 8;

/// Hash components shared by every cache file for one (URL, project) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub url_hash: String,
    pub project_hash: String,
}

impl CacheKey {
    /// Build the key for a URL and project name.
    pub fn new(url: &str, project: &str) -> Result<Self, Error> {
        Ok(Self { url_hash: url_hash(url)?, project_hash: project_hash(project)? })
    }

    /// File name for this key owned by the given worker.
    pub fn file_name(&self, identity: &dyn ProcessIdentity) -> String {
        format!(
            "cache_{}_{}_{}_{}.txt",
            self.url_hash,
            self.project_hash,
            identity.process_id(),
            identity.unit_id()
        )
    }
}

/// Normalize a URL so that logically equal URLs serialize identically.
pub fn normalize_url(input: &str) -> Result<String, Error> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()));
    }

    // url::Url lowercases scheme/host and drops default ports while parsing.
    let invalid = |e: url::ParseError| Error::InvalidInput(format!("invalid url {trimmed}: {e}"));
    let mut parsed = match url::Url::parse(trimmed) {
        Ok(url) if is_bare_host_port(trimmed, &url) => url::Url::parse(&format!("https://{trimmed}")).map_err(invalid)?,
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            url::Url::parse(&format!("https://{trimmed}")).map_err(invalid)?
        }
        Err(e) => return Err(invalid(e)),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidInput(format!("unsupported scheme: {scheme}"))),
    }

    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(if path.is_empty() { "/" } else { &path });

    let mut pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs);
    }

    parsed.set_fragment(None);

    Ok(parsed.into())
}

/// `example.com:8080/path` parses with scheme `example.com`; treat it as host and port.
fn is_bare_host_port(input: &str, parsed: &url::Url) -> bool {
    !input.contains("://")
        && !matches!(parsed.scheme(), "http" | "https")
        && input
            .get(parsed.scheme().len()..)
            .and_then(|rest| rest.strip_prefix(':'))
            .is_some_and(|port| port.starts_with(|c: char| c.is_ascii_digit()))
}

/// First 16 hex chars of the SHA-256 of the normalized URL.
pub fn url_hash(url: &str) -> Result<String, Error> {
    let normalized = normalize_url(url)?;
    Ok(truncated_digest(&normalized, URL_HASH_LEN))
}

/// Trim and collapse whitespace runs; case is preserved.
pub fn normalize_project_name(name: &str) -> Result<String, Error> {
    let normalized = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err(Error::InvalidInput("project name cannot be empty".into()));
    }
    Ok(normalized)
}

/// First 8 hex chars of the SHA-256 of the normalized project name.
pub fn project_hash(name: &str) -> Result<String, Error> {
    let normalized = normalize_project_name(name)?;
    Ok(truncated_digest(&normalized, PROJECT_HASH_LEN))
}

/// Full cache path for a URL/project pair owned by `identity`.
pub fn cache_file_name(
    cache_dir: &Path, url: &str, project: &str, identity: &dyn ProcessIdentity,
) -> Result<PathBuf, Error> {
    if url.trim().is_empty() {
        return Err(Error::InvalidInput("url must be a non-empty string".into()));
    }
    if project.trim().is_empty() {
        return Err(Error::InvalidInput("project name must be a non-empty string".into()));
    }
    let key = CacheKey::new(url, project)?;
    Ok(cache_dir.join(key.file_name(identity)))
}

fn truncated_digest(input: &str, len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(len);
    digest
}
