//! Protocol parsers module
//!
//! This module contains one parser per supported link scheme. Each parser
//! implements the `ProtocolParser` trait to turn a share link into a
//! [`Profile`].

mod shadowsocks;
mod trojan;
mod vless;
mod vmess;
mod wireguard;

pub use shadowsocks::ShadowsocksParser;
pub use trojan::TrojanParser;
pub use vless::VLessParser;
pub use vmess::VMessParser;
pub use wireguard::WireGuardParser;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::base64::Base64Policy;
use crate::error::{ConvertError, ParseCause, ParseError};
use crate::profile::Profile;

// ============================================================================
// Protocol Parser Trait
// ============================================================================

/// Trait for parsing individual protocol URIs
pub trait ProtocolParser: Send + Sync {
    /// Returns the protocol scheme this parser handles (e.g., "ss", "vmess")
    fn scheme(&self) -> &str;

    /// Parses a URI string into a profile
    fn parse(&self, uri: &str) -> Result<Profile, ParseError>;

    /// Checks if this parser can handle the given URI
    fn can_parse(&self, uri: &str) -> bool {
        extract_scheme(uri).is_some_and(|s| s == self.scheme())
    }
}

// ============================================================================
// Protocol Registry
// ============================================================================

/// Registry for protocol parsers with dynamic dispatch
///
/// Built once; there is no way to add parsers after construction.
pub struct ProtocolRegistry {
    parsers: HashMap<String, Arc<dyn ProtocolParser>>,
}

impl ProtocolRegistry {
    /// Creates a registry with all built-in parsers registered
    pub fn with_builtin_parsers(policy: &Base64Policy) -> Self {
        let mut registry = Self {
            parsers: HashMap::new(),
        };
        registry.register(Arc::new(VMessParser::new(policy.clone())));
        registry.register(Arc::new(VLessParser));
        registry.register(Arc::new(TrojanParser));
        registry.register(Arc::new(ShadowsocksParser::new(policy.clone())));
        registry.register(Arc::new(WireGuardParser));
        registry
    }

    fn register(&mut self, parser: Arc<dyn ProtocolParser>) {
        self.parsers.insert(parser.scheme().to_string(), parser);
    }

    /// Gets a parser for the given scheme
    pub fn get(&self, scheme: &str) -> Option<&Arc<dyn ProtocolParser>> {
        self.parsers.get(scheme)
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.parsers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }

    /// Parses a URI using the appropriate parser
    ///
    /// An unknown scheme is reported before any parser runs.
    pub fn parse_uri(&self, uri: &str) -> Result<Profile, ConvertError> {
        let uri = uri.trim();
        let scheme =
            extract_scheme(uri).ok_or_else(|| ParseError::new("", ParseCause::MissingScheme))?;
        debug!("Parsing URI with scheme '{}'", scheme);

        let parser = self
            .parsers
            .get(&scheme)
            .ok_or_else(|| ConvertError::UnsupportedScheme(scheme.clone()))?;

        let result = parser.parse(uri);
        match &result {
            Ok(profile) => {
                debug!(
                    "Successfully parsed {} URI -> profile '{}'",
                    scheme,
                    profile.display_name()
                );
            }
            Err(e) => {
                debug!("Failed to parse {} URI: {}", scheme, e);
            }
        }
        Ok(result?)
    }
}

/// Extracts the lowercased scheme from a URI
///
/// Returns `None` when the `://` separator is missing or the scheme is empty.
pub fn extract_scheme(uri: &str) -> Option<String> {
    uri.trim()
        .split_once("://")
        .map(|(scheme, _)| scheme.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProtocolRegistry {
        ProtocolRegistry::with_builtin_parsers(&Base64Policy::default())
    }

    #[test]
    fn test_extract_scheme() {
        assert_eq!(extract_scheme("vless://x").as_deref(), Some("vless"));
        assert_eq!(extract_scheme("  VMess://x").as_deref(), Some("vmess"));
        assert_eq!(extract_scheme("://x"), None);
        assert_eq!(extract_scheme("no-scheme"), None);
    }

    #[test]
    fn test_registry_schemes() {
        assert_eq!(
            registry().schemes(),
            vec!["ss", "trojan", "vless", "vmess", "wg"]
        );
    }

    #[test]
    fn test_can_parse() {
        let registry = registry();
        let parser = registry.get("vless").unwrap();
        assert!(parser.can_parse("vless://uuid@host:443"));
        assert!(parser.can_parse("VLESS://uuid@host:443"));
        assert!(!parser.can_parse("vmess://abc"));
    }

    #[test]
    fn test_parse_uri_unknown_scheme() {
        let err = registry().parse_uri("foo://bar").unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedScheme(s) if s == "foo"));
    }

    #[test]
    fn test_parse_uri_missing_scheme() {
        let err = registry().parse_uri("example.com:443").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Parse(ParseError {
                cause: ParseCause::MissingScheme,
                ..
            })
        ));
    }

    #[test]
    fn test_parse_uri_dispatches_uppercase_scheme() {
        let profile = registry()
            .parse_uri("TROJAN://secret@example.com:443#Node")
            .unwrap();
        assert_eq!(profile.proto().as_str(), "trojan");
        assert_eq!(profile.id, "Node");
    }

    #[test]
    fn test_parse_uri_wraps_parse_errors() {
        let err = registry().parse_uri("vless://@example.com:443").unwrap_err();
        assert!(matches!(err, ConvertError::Parse(ref e) if e.scheme == "vless"));
    }
}
