//! Binary-side utility functions
//!
//! Path expansion, HTTP fetching and template source resolution used when
//! loading configuration and templates.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::export::{FileTemplate, InlineTemplate, TemplateSource};
use crate::get_version;

// ============================================================================
// Path Utilities
// ============================================================================

/// Whether the location is an `http(s)://` URL rather than a path
pub fn is_remote(path_or_url: &str) -> bool {
    path_or_url.starts_with("http://") || path_or_url.starts_with("https://")
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &str) -> String {
    if (path.starts_with("~/") || path == "~")
        && let Some(home) = dirs_home()
    {
        return path.replacen("~", &home, 1);
    }
    path.to_string()
}

/// Get home directory path
pub fn dirs_home() -> Option<String> {
    #[cfg(windows)]
    {
        std::env::var("USERPROFILE").ok()
    }
    #[cfg(not(windows))]
    {
        std::env::var("HOME").ok()
    }
}

// ============================================================================
// HTTP Utilities
// ============================================================================

/// Fetch text content from a URL
pub async fn fetch_text(url: &str) -> Result<String> {
    debug!("Fetching URL: {}", url);

    let client = reqwest::Client::builder()
        .user_agent(format!("vpnconv/{}", get_version()))
        .build()
        .context("Failed to build HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to fetch URL: {}", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("HTTP request failed with status {}: {}", status, url);
    }

    let text = response
        .text()
        .await
        .with_context(|| format!("Failed to read response body from: {}", url))?;

    Ok(text)
}

// ============================================================================
// Template Sources
// ============================================================================

/// Turns a template location into a [`TemplateSource`]
///
/// URLs are fetched once here and held in memory; paths are re-read on
/// every conversion.
pub async fn resolve_template(path_or_url: &str) -> Result<Arc<dyn TemplateSource>> {
    if is_remote(path_or_url) {
        info!("Fetching template from {}", path_or_url);
        let text = fetch_text(path_or_url)
            .await
            .with_context(|| format!("Failed to fetch template from {}", path_or_url))?;
        Ok(Arc::new(InlineTemplate::new(text, path_or_url)))
    } else {
        let expanded = expand_tilde(path_or_url);
        debug!("Using template file {}", expanded);
        Ok(Arc::new(FileTemplate::new(expanded)))
    }
}
