//! Converter configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file
//! at all) yields a working configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::export::GroupRules;
use crate::helpers::{expand_tilde, fetch_text, is_remote};
use crate::parser::Base64Policy;

// ============================================================================
// Converter Config Types
// ============================================================================

/// Converter configuration parsed from TOML file
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConverterConfig {
    /// Clash template file path or URL, default "configs/template_clash.yaml"
    #[serde(default = "default_clash_template")]
    pub clash_template: String,

    /// sing-box template file path or URL, default "configs/template_singbox.json"
    #[serde(default = "default_singbox_template")]
    pub singbox_template: String,

    /// Group membership rules used when injecting nodes into templates
    #[serde(default)]
    pub groups: GroupRules,

    /// Base64 alphabets and padding repair order used by the parsers
    #[serde(default)]
    pub base64: Base64Policy,
}

fn default_clash_template() -> String {
    "configs/template_clash.yaml".to_string()
}

fn default_singbox_template() -> String {
    "configs/template_singbox.json".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            clash_template: default_clash_template(),
            singbox_template: default_singbox_template(),
            groups: GroupRules::default(),
            base64: Base64Policy::default(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl ConverterConfig {
    /// Parse converter config from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ConverterConfig =
            toml::from_str(content).context("Failed to parse converter config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.base64.alphabets.is_empty() {
            anyhow::bail!("base64.alphabets must list at least one alphabet");
        }

        for rule in &self.groups.regions {
            let code = rule.country.as_str();
            if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                anyhow::bail!(
                    "Invalid country code '{}' for group '{}': expected two ASCII letters",
                    rule.country,
                    rule.group
                );
            }
            if rule.group.trim().is_empty() {
                anyhow::bail!("Region rule for '{}' has an empty group name", rule.country);
            }
        }

        if self.groups.direct_fallback.trim().is_empty() {
            anyhow::bail!("groups.direct_fallback must not be empty");
        }

        Ok(())
    }

    /// Load converter config from file path
    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read converter config from {:?}", path))?;
        Self::from_toml(&content)
    }

    /// Load converter config from file path or URL
    pub async fn load(path_or_url: &str) -> Result<Self> {
        if is_remote(path_or_url) {
            Self::from_url(path_or_url).await
        } else {
            let expanded = expand_tilde(path_or_url);
            debug!("Reading converter config from {}", expanded);
            Self::from_file(Path::new(&expanded)).await
        }
    }

    /// Load converter config from URL
    pub async fn from_url(url: &str) -> Result<Self> {
        let content = fetch_text(url).await?;
        Self::from_toml(&content)
    }
}
