//! Conversion entry point
//!
//! [`Converter`] owns the scheme and format registries, both built once in
//! [`Converter::new`] and read-only afterwards, so a single converter can
//! serve concurrent calls.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::ConverterConfig;
use crate::error::ConvertError;
use crate::export::{ExporterRegistry, TemplateSource};
use crate::parser::ProtocolRegistry;
use crate::profile::Profile;

/// Link to document converter
pub struct Converter {
    protocols: ProtocolRegistry,
    exporters: ExporterRegistry,
}

impl Converter {
    /// Builds the registries from the configuration and the two template
    /// sources
    pub fn new(
        config: &ConverterConfig,
        clash_template: Arc<dyn TemplateSource>,
        singbox_template: Arc<dyn TemplateSource>,
    ) -> Self {
        Self {
            protocols: ProtocolRegistry::with_builtin_parsers(&config.base64),
            exporters: ExporterRegistry::with_builtin_exporters(
                clash_template,
                singbox_template,
                config.groups.clone(),
            ),
        }
    }

    /// Converts one share link into a document of the given format
    ///
    /// Stops at the first failing stage: scheme lookup, parsing, format
    /// lookup, rendering.
    pub fn convert(&self, uri: &str, format: &str) -> Result<String, ConvertError> {
        let profile = self.parse(uri)?;
        if !profile.has_valid_port() {
            warn!(
                node = profile.display_name(),
                "Link has no usable port, strict formats will reject it"
            );
        }

        let exporter = self
            .exporters
            .get(format)
            .ok_or_else(|| ConvertError::UnsupportedFormat(format.to_string()))?;
        debug!(
            "Rendering '{}' as {}",
            profile.display_name(),
            exporter.name()
        );

        Ok(exporter.render(&profile)?)
    }

    /// Parses a share link without rendering it
    pub fn parse(&self, uri: &str) -> Result<Profile, ConvertError> {
        self.protocols.parse_uri(uri)
    }

    /// Supported link schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        self.protocols.schemes()
    }

    /// Supported output formats, sorted
    pub fn formats(&self) -> Vec<&str> {
        self.exporters.formats()
    }

    /// File extension for a format's documents
    pub fn file_extension(&self, format: &str) -> Option<&str> {
        self.exporters.get(format).map(|e| e.file_extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RenderError;
    use crate::export::InlineTemplate;

    fn converter() -> Converter {
        Converter::new(
            &ConverterConfig::default(),
            Arc::new(InlineTemplate::new("proxies: []\n", "inline")),
            Arc::new(InlineTemplate::new("{\"outbounds\": []}", "inline")),
        )
    }

    #[test]
    fn test_converter_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Converter>();
    }

    #[test]
    fn test_lists_schemes_and_formats() {
        let converter = converter();
        assert_eq!(converter.schemes(), vec!["ss", "trojan", "vless", "vmess", "wg"]);
        assert_eq!(converter.formats(), vec!["clash", "raw", "singbox", "v2ray"]);
        assert_eq!(converter.file_extension("clash"), Some("yaml"));
        assert_eq!(converter.file_extension("surge"), None);
    }

    #[test]
    fn test_unknown_scheme() {
        let err = converter().convert("foo://bar", "clash").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedScheme(ref s) if s == "foo"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_unknown_format_after_successful_parse() {
        let err = converter()
            .convert("trojan://pw@example.com:443", "surge")
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedFormat(ref f) if f == "surge"));
    }

    #[test]
    fn test_parse_error_wins_over_unknown_format() {
        let err = converter().convert("trojan://@example.com:443", "surge").unwrap_err();
        assert!(matches!(err, ConvertError::Parse(_)));
    }

    #[test]
    fn test_port_zero_is_rejected_by_strict_formats_only() {
        let converter = converter();
        let uri = "trojan://pw@example.com";
        assert!(converter.convert(uri, "raw").is_ok());
        let err = converter.convert(uri, "clash").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Render(RenderError::InvalidPort { port: 0, .. })
        ));
    }
}
