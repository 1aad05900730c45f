//! Shadowsocks protocol parser
//!
//! This module provides parsing for Shadowsocks (ss://) URIs.
//! Supports both SIP002 format and legacy format, as well as SIP003 plugins.

use std::collections::HashMap;

use tracing::{trace, warn};

use crate::error::{ParseCause, ParseError};
use crate::parser::base64::Base64Policy;
use crate::parser::{apply_query, first_param, parse_host_port, split_fragment, strip_scheme};
use crate::profile::{Auth, PluginOpts, Profile, TlsSettings, TransportKind, TransportSettings};

use super::ProtocolParser;

const SCHEME: &str = "ss";

// ============================================================================
// Shadowsocks Parser
// ============================================================================

/// Parser for Shadowsocks (ss://) URIs
///
/// Supports both SIP002 format and legacy format, as well as SIP003 plugins:
/// - SIP002: ss://BASE64(method:password)@host:port#tag
/// - SIP002 with userinfo: ss://method:password@host:port#tag
/// - SIP002 with SIP003 plugin: ss://userinfo@host:port/?plugin=plugin-name;plugin-opts#tag
/// - Legacy: ss://BASE64(method:password@host:port)#tag
pub struct ShadowsocksParser {
    policy: Base64Policy,
}

impl ShadowsocksParser {
    pub fn new(policy: Base64Policy) -> Self {
        Self { policy }
    }
}

impl ProtocolParser for ShadowsocksParser {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn parse(&self, uri: &str) -> Result<Profile, ParseError> {
        trace!("Parsing Shadowsocks URI");
        let (body, tag) = split_fragment(strip_scheme(uri.trim()));

        let before_query = body.split_once('?').map_or(body, |(b, _)| b);
        if before_query.contains('@') {
            trace!("Parsing as SIP002 format (found @ separator)");
            return self.parse_sip002(body, tag);
        }

        trace!("Parsing as legacy Base64 format");
        self.parse_legacy(body, tag)
    }
}

impl ShadowsocksParser {
    /// Parses legacy format: BASE64(method:password@host:port)[?query]
    ///
    /// The decoded body goes through the SIP002 path with the original tag
    /// and any query found outside the Base64 part.
    fn parse_legacy(&self, body: &str, tag: String) -> Result<Profile, ParseError> {
        let (encoded, query) = match body.split_once('?') {
            Some((encoded, query)) => (encoded, Some(query)),
            None => (body, None),
        };
        let encoded = encoded.trim_end_matches('/');
        let encoded = urlencoding::decode(encoded).unwrap_or_else(|_| encoded.into());

        let decoded = self
            .policy
            .decode_text(&encoded)
            .map_err(|e| ParseError::new(SCHEME, e))?;
        let decoded = decoded.trim();

        if !decoded.contains('@') {
            return Err(ParseError::new(
                SCHEME,
                ParseCause::Malformed("legacy body is missing the '@' separator".to_string()),
            ));
        }

        match query {
            Some(query) if !decoded.contains('?') => {
                self.parse_sip002(&format!("{}?{}", decoded, query), tag)
            }
            _ => self.parse_sip002(decoded, tag),
        }
    }

    /// Parses SIP002 format: BASE64(method:password)@host:port or method:password@host:port
    /// Also handles SIP003 plugin query parameter: host:port/?plugin=plugin-name;plugin-opts
    fn parse_sip002(&self, body: &str, tag: String) -> Result<Profile, ParseError> {
        let err = |cause: ParseCause| ParseError::new(SCHEME, cause);

        let (userinfo, hostinfo) = body
            .split_once('@')
            .ok_or_else(|| err(ParseCause::Missing("userinfo")))?;

        // Split off query string if present: host:port/?plugin=... or host:port?plugin=...
        let (hostport, query) = match hostinfo.split_once('?') {
            Some((hostport, query)) => (hostport, query),
            None => (hostinfo, ""),
        };
        let hostport = hostport.trim_end_matches('/');

        let (server, port) = parse_host_port(hostport).map_err(err)?;
        let (method, password) = self.parse_userinfo(userinfo)?;

        let params: HashMap<String, String> =
            url::form_urlencoded::parse(query.as_bytes()).into_owned().collect();

        let mut profile = Profile::new(Auth::Shadowsocks { method, password }, server, port)
            .with_id(tag);

        match first_param(&params, &["plugin"]).and_then(parse_plugin_string) {
            Some(plugin) => {
                if plugin.name == "v2ray-plugin" {
                    apply_v2ray_plugin(&mut profile, &plugin, &params);
                }
                profile.plugin = Some(plugin);
            }
            None => apply_query(&mut profile, &params, false),
        }

        Ok(profile)
    }

    /// Parses userinfo which can be Base64(method:password) or method:password
    ///
    /// The userinfo is URL-unescaped first. A Base64 decode only counts when
    /// it yields UTF-8 text containing `:`; otherwise the unescaped text is
    /// split as-is.
    fn parse_userinfo(&self, userinfo: &str) -> Result<(String, String), ParseError> {
        let unescaped = urlencoding::decode(userinfo)
            .unwrap_or_else(|_| userinfo.into())
            .into_owned();

        let credentials = match self.policy.decode_text(&unescaped) {
            Ok(decoded) if decoded.contains(':') => {
                trace!("Decoded Base64 userinfo");
                decoded
            }
            _ => {
                trace!("Userinfo is not Base64, using plain text");
                unescaped
            }
        };

        let (method, password) = credentials.split_once(':').ok_or_else(|| {
            ParseError::new(
                SCHEME,
                ParseCause::Malformed(
                    "userinfo is neither Base64 nor method:password".to_string(),
                ),
            )
        })?;

        if method.trim().is_empty() {
            return Err(ParseError::new(SCHEME, ParseCause::Missing("method")));
        }
        Ok((method.trim().to_string(), password.to_string()))
    }
}

// ============================================================================
// SIP003 Plugins
// ============================================================================

/// Parses a SIP003 plugin string: `name;key=value;flag`
///
/// Bare flags get the value `"true"`. Returns `None` for an empty name.
fn parse_plugin_string(plugin: &str) -> Option<PluginOpts> {
    let mut parts = plugin.split(';').map(str::trim);
    let name = parts.next().filter(|n| !n.is_empty())?;

    let mut opts = PluginOpts::new(normalize_plugin(name));
    for part in parts.filter(|p| !p.is_empty()) {
        let (key, value) = part.split_once('=').unwrap_or((part, "true"));
        opts.options.push((key.trim().to_string(), value.trim().to_string()));
    }
    Some(opts)
}

/// Maps deprecated SIP003 plugin names to their supported equivalents.
///
/// | Deprecated name  | Replaced with  |
/// |------------------|----------------|
/// | `simple-obfs`    | `obfs-local`   |
fn normalize_plugin(plugin: &str) -> String {
    match plugin {
        "simple-obfs" => {
            warn!(
                deprecated = "simple-obfs",
                replacement = "obfs-local",
                "Deprecated SIP003 plugin substituted with supported alternative"
            );
            "obfs-local".to_string()
        }
        "obfs-local" | "v2ray-plugin" => plugin.to_string(),
        other => {
            warn!(
                plugin = other,
                "Unknown SIP003 plugin; only 'obfs-local' and 'v2ray-plugin' can be exported"
            );
            plugin.to_string()
        }
    }
}

/// Derives the WebSocket transport and TLS settings carried by v2ray-plugin
/// options, falling back to the link's own `path`/`host`/`security`.
fn apply_v2ray_plugin(
    profile: &mut Profile,
    plugin: &PluginOpts,
    params: &HashMap<String, String>,
) {
    let pick = |key: &str| {
        plugin
            .get(key)
            .filter(|v| !v.is_empty())
            .or_else(|| first_param(params, &[key]))
            .map(str::to_string)
    };

    let mut transport = TransportSettings::new(TransportKind::WebSocket);
    transport.path = pick("path");
    transport.host = pick("host");

    let tls_requested = plugin.has_flag("tls")
        || first_param(params, &["security"]).is_some_and(|s| s.eq_ignore_ascii_case("tls"));
    if tls_requested {
        profile.tls = Some(TlsSettings::new(transport.host.clone(), false));
    }
    profile.transport = Some(transport);
}
