//! Format exporters
//!
//! Each exporter renders one [`Profile`] into a client-specific document:
//!
//! | Format    | Output                                        | Extension |
//! |-----------|-----------------------------------------------|-----------|
//! | `clash`   | Clash YAML template with the node injected    | `yaml`    |
//! | `singbox` | sing-box JSON template with the node injected | `json`    |
//! | `v2ray`   | single-outbound V2Ray JSON                    | `json`    |
//! | `raw`     | `proto://server:port` plus a JSON dump        | `txt`     |

pub mod clash;
pub mod raw;
pub mod singbox;
pub mod template;
pub mod v2ray;

pub use clash::ClashExporter;
pub use raw::RawExporter;
pub use singbox::SingBoxExporter;
pub use template::{FileTemplate, GroupRules, InlineTemplate, RegionRule, TemplateSource};
pub use v2ray::V2RayExporter;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::RenderError;
use crate::profile::Profile;

// ============================================================================
// Exporter Trait
// ============================================================================

/// Trait for rendering a profile into one output format
pub trait Exporter: Send + Sync {
    /// Format name used for lookup (e.g., "clash")
    fn name(&self) -> &str;

    /// File extension of the rendered document, without the dot
    fn file_extension(&self) -> &str;

    /// Renders the profile
    fn render(&self, profile: &Profile) -> Result<String, RenderError>;
}

// ============================================================================
// Exporter Registry
// ============================================================================

/// Registry of exporters keyed by format name
///
/// Built once; there is no way to add exporters after construction.
pub struct ExporterRegistry {
    exporters: HashMap<String, Arc<dyn Exporter>>,
}

impl ExporterRegistry {
    /// Creates a registry with all built-in exporters
    pub fn with_builtin_exporters(
        clash_template: Arc<dyn TemplateSource>,
        singbox_template: Arc<dyn TemplateSource>,
        rules: GroupRules,
    ) -> Self {
        let mut registry = Self {
            exporters: HashMap::new(),
        };
        registry.register(Arc::new(ClashExporter::new(clash_template, rules.clone())));
        registry.register(Arc::new(SingBoxExporter::new(singbox_template, rules)));
        registry.register(Arc::new(V2RayExporter));
        registry.register(Arc::new(RawExporter));
        registry
    }

    fn register(&mut self, exporter: Arc<dyn Exporter>) {
        self.exporters.insert(exporter.name().to_string(), exporter);
    }

    /// Gets the exporter for a format name
    pub fn get(&self, format: &str) -> Option<&Arc<dyn Exporter>> {
        self.exporters.get(format)
    }

    /// Registered format names, sorted
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.exporters.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }
}

/// Rejects port `0` for exporters whose documents need a real port
pub(crate) fn require_port(profile: &Profile, format: &'static str) -> Result<u16, RenderError> {
    if profile.has_valid_port() {
        Ok(profile.port)
    } else {
        Err(RenderError::InvalidPort {
            format,
            port: profile.port,
        })
    }
}
