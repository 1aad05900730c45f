//! Share-link parsing
//!
//! This module provides:
//! - Base64 decoding under a configurable [`Base64Policy`]
//! - One [`ProtocolParser`] per link scheme (`vmess`, `vless`, `trojan`, `ss`, `wg`)
//! - The [`ProtocolRegistry`] dispatching a link to its parser
//! - Helpers shared by the URI-shaped schemes: lenient link splitting and the
//!   query-parameter synthesis of TLS, transport and extension keys

pub mod base64;
pub mod protocols;

pub use base64::{Base64Alphabet, Base64Policy, PaddingRepair};
pub use protocols::{
    ProtocolParser, ProtocolRegistry, ShadowsocksParser, TrojanParser, VLessParser, VMessParser,
    WireGuardParser,
};

use std::collections::HashMap;

use tracing::warn;
use url::{Host, Url};

use crate::error::ParseCause;
use crate::profile::{
    Extensions, Profile, RealitySettings, TlsSettings, TransportKind, TransportSettings,
};

// ============================================================================
// Link Splitting
// ============================================================================

/// Returns everything after `scheme://`, or the input when there is no scheme
pub(crate) fn strip_scheme(uri: &str) -> &str {
    uri.split_once("://").map_or(uri, |(_, rest)| rest)
}

/// Splits the `#tag` fragment off a link
///
/// The tag is URL-unescaped and trimmed; a link without fragment yields an
/// empty tag.
pub(crate) fn split_fragment(uri: &str) -> (&str, String) {
    match uri.split_once('#') {
        Some((body, fragment)) => {
            let tag = urlencoding::decode(fragment)
                .unwrap_or_else(|_| fragment.into())
                .trim()
                .to_string();
            (body, tag)
        }
        None => (uri, String::new()),
    }
}

/// Parses a port, returning `0` for anything outside `1..=65535`
pub(crate) fn parse_port_lenient(port: &str) -> u16 {
    let port = port.trim();
    if port.is_empty() {
        return 0;
    }
    match port.parse::<u16>() {
        Ok(p) => p,
        Err(_) => {
            warn!("Invalid port '{}', continuing with port 0", port);
            0
        }
    }
}

/// Parses `host[:port]`, handling IPv6 addresses in brackets
///
/// A missing or unparsable port yields `0`; a missing host is an error.
pub(crate) fn parse_host_port(hostport: &str) -> Result<(String, u16), ParseCause> {
    let hostport = hostport.trim();

    // Handle IPv6 addresses: [::1]:8080
    if let Some(rest) = hostport.strip_prefix('[') {
        let bracket_end = rest.find(']').ok_or_else(|| {
            ParseCause::Malformed("invalid IPv6 address: missing closing bracket".to_string())
        })?;
        let host = &rest[..bracket_end];
        if host.is_empty() {
            return Err(ParseCause::Missing("host"));
        }
        let port = rest[bracket_end + 1..]
            .strip_prefix(':')
            .map_or(0, parse_port_lenient);
        return Ok((host.to_string(), port));
    }

    let (host, port) = match hostport.rsplit_once(':') {
        Some((host, port)) => (host, parse_port_lenient(port)),
        None => (hostport, 0),
    };
    if host.is_empty() {
        return Err(ParseCause::Missing("host"));
    }
    Ok((host.to_string(), port))
}

/// Removes the `:port` part from a link's authority
fn strip_authority_port(body: &str) -> Option<String> {
    let (scheme, rest) = body.split_once("://")?;
    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(end);
    let host_start = authority.rfind('@').map_or(0, |i| i + 1);
    let hostport = &authority[host_start..];
    let port_sep = if hostport.starts_with('[') {
        hostport.find("]:").map(|i| i + 1)?
    } else {
        hostport.rfind(':')?
    };
    Some(format!(
        "{}://{}{}",
        scheme,
        &authority[..host_start + port_sep],
        tail
    ))
}

/// Parses a link body with [`Url`], retrying without the port when the
/// port is not a valid `u16`
fn parse_url_lenient(body: &str) -> Result<Url, ParseCause> {
    match Url::parse(body) {
        Ok(url) => Ok(url),
        Err(url::ParseError::InvalidPort) => {
            warn!("Invalid port in link, continuing with port 0");
            let stripped = strip_authority_port(body).ok_or(url::ParseError::InvalidPort)?;
            Ok(Url::parse(&stripped)?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Splits off a userinfo that contains an unescaped `/`
///
/// Base64 keys often carry a raw `/`, which ends the authority for a strict
/// URL parser. When the authority itself has no `@`, the last `@` before
/// the query is taken as the userinfo separator instead. Returns the raw
/// userinfo and the link rebuilt without it.
fn split_raw_userinfo(body: &str) -> Option<(&str, String)> {
    let (scheme, rest) = body.split_once("://")?;
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    if rest[..authority_end].contains('@') {
        return None;
    }
    let query_start = rest.find('?').unwrap_or(rest.len());
    let at = rest[..query_start].rfind('@')?;
    Some((&rest[..at], format!("{}://{}", scheme, &rest[at + 1..])))
}

/// A `scheme://userinfo@host:port?query#tag` link split into its parts
///
/// Used by every scheme that follows the standard URI layout.
#[derive(Debug)]
pub(crate) struct Link {
    pub tag: String,
    /// URL-unescaped userinfo, `user:password` when both are present
    pub userinfo: String,
    pub host: String,
    pub port: u16,
    pub params: HashMap<String, String>,
}

impl Link {
    pub fn parse(uri: &str) -> Result<Self, ParseCause> {
        let (body, tag) = split_fragment(uri.trim());
        let decode = |s: &str| {
            urlencoding::decode(s)
                .unwrap_or_else(|_| s.into())
                .into_owned()
        };

        let (url, userinfo) = match split_raw_userinfo(body) {
            Some((raw, rest)) => (parse_url_lenient(&rest)?, decode(raw)),
            None => {
                let url = parse_url_lenient(body)?;
                let mut userinfo = decode(url.username());
                if let Some(password) = url.password() {
                    userinfo.push(':');
                    userinfo.push_str(&decode(password));
                }
                (url, userinfo)
            }
        };

        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => String::new(),
        };
        if host.is_empty() {
            return Err(ParseCause::Missing("host"));
        }

        let params: HashMap<String, String> = url.query_pairs().into_owned().collect();

        Ok(Self {
            tag,
            userinfo,
            host,
            port: url.port().unwrap_or(0),
            params,
        })
    }
}

// ============================================================================
// Query Synthesis
// ============================================================================

/// First non-empty value among `keys`
pub(crate) fn first_param<'a>(
    params: &'a HashMap<String, String>,
    keys: &[&str],
) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

/// `1` / `true` in any case
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}

/// Splits a comma separated list, dropping empty items
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Builds the transport from `type`, `path`, `host` and `serviceName`
///
/// Raw TCP yields `None`; so does an unknown type, with a warning.
pub(crate) fn build_transport(params: &HashMap<String, String>) -> Option<TransportSettings> {
    let name = first_param(params, &["type"])?;
    let Some(kind) = TransportKind::from_name(name) else {
        if !matches!(name.to_ascii_lowercase().as_str(), "tcp" | "none" | "raw") {
            warn!(transport = name, "Unknown transport type, falling back to tcp");
        }
        return None;
    };

    let mut transport = TransportSettings::new(kind);
    transport.path = first_param(params, &["path"]).map(str::to_string);
    transport.host = first_param(params, &["host", "sni", "peer"]).map(str::to_string);
    transport.service_name = first_param(params, &["serviceName"]).map(str::to_string);
    Some(transport)
}

/// Builds TLS settings when `security` asks for them, or unconditionally
/// when `force` is set
pub(crate) fn build_tls(params: &HashMap<String, String>, force: bool) -> Option<TlsSettings> {
    let security = first_param(params, &["security"])
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !force && security != "tls" && security != "reality" {
        return None;
    }

    let server_name = first_param(params, &["sni", "peer", "host"]).map(str::to_string);
    let insecure = ["allowInsecure", "insecure"]
        .iter()
        .filter_map(|k| params.get(*k))
        .any(|v| is_truthy(v));
    Some(TlsSettings::new(server_name, insecure))
}

/// Fills extension keys from `fp`, `alpn`, `flow`, `pbk`, `sid` and
/// `packetEncoding`
pub(crate) fn apply_extensions(params: &HashMap<String, String>, extra: &mut Extensions) {
    extra.fingerprint = first_param(params, &["fp"]).map(str::to_string);
    extra.alpn = first_param(params, &["alpn"])
        .map(split_list)
        .unwrap_or_default();
    extra.flow = first_param(params, &["flow"]).map(str::to_string);
    extra.packet_encoding = first_param(params, &["packetEncoding"]).map(str::to_string);

    let is_reality = first_param(params, &["security"])
        .is_some_and(|s| s.eq_ignore_ascii_case("reality"));
    if is_reality && let Some(public_key) = first_param(params, &["pbk"]) {
        extra.reality = Some(RealitySettings {
            public_key: public_key.to_string(),
            short_id: first_param(params, &["sid"]).map(str::to_string),
        });
    }
}

/// Applies the shared query synthesis (TLS, transport, extension keys)
pub(crate) fn apply_query(
    profile: &mut Profile,
    params: &HashMap<String, String>,
    force_tls: bool,
) {
    profile.tls = build_tls(params, force_tls);
    profile.transport = build_transport(params);
    apply_extensions(params, &mut profile.extra);
}
