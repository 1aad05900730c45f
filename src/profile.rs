//! Canonical proxy profile
//!
//! A [`Profile`] is the scheme- and format-independent description of one
//! proxy endpoint. Parsers produce exactly one profile per link and exporters
//! consume it; nothing here is persisted or shared between conversions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

// ============================================================================
// Protocol
// ============================================================================

/// Protocols a profile can describe
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    #[serde(rename = "vmess")]
    VMess,
    #[serde(rename = "vless")]
    VLess,
    #[serde(rename = "trojan")]
    Trojan,
    #[serde(rename = "ss")]
    Shadowsocks,
    #[serde(rename = "wg")]
    WireGuard,
}

impl Protocol {
    pub const ALL: [Protocol; 5] = [
        Protocol::VMess,
        Protocol::VLess,
        Protocol::Trojan,
        Protocol::Shadowsocks,
        Protocol::WireGuard,
    ];

    /// Link scheme and protocol tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::VMess => "vmess",
            Protocol::VLess => "vless",
            Protocol::Trojan => "trojan",
            Protocol::Shadowsocks => "ss",
            Protocol::WireGuard => "wg",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Protocol::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown protocol: {}", s))
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Protocol-specific credentials
///
/// The variant fixes the profile's [`Protocol`], so the two can never disagree.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Auth {
    VMess { uuid: String },
    VLess { uuid: String },
    Trojan { password: String },
    Shadowsocks { method: String, password: String },
    WireGuard { private_key: String },
}

impl Auth {
    pub fn protocol(&self) -> Protocol {
        match self {
            Auth::VMess { .. } => Protocol::VMess,
            Auth::VLess { .. } => Protocol::VLess,
            Auth::Trojan { .. } => Protocol::Trojan,
            Auth::Shadowsocks { .. } => Protocol::Shadowsocks,
            Auth::WireGuard { .. } => Protocol::WireGuard,
        }
    }

    /// User id for the uuid-based protocols (vmess, vless)
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Auth::VMess { uuid } | Auth::VLess { uuid } => Some(uuid),
            _ => None,
        }
    }
}

// ============================================================================
// TLS / Transport
// ============================================================================

/// TLS (or REALITY) wrapping of the stream
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TlsSettings {
    pub enabled: bool,
    pub insecure: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
}

impl TlsSettings {
    pub fn new(server_name: Option<String>, insecure: bool) -> Self {
        Self {
            enabled: true,
            insecure,
            server_name: server_name.filter(|s| !s.is_empty()),
        }
    }
}

/// Stream transports beyond raw TCP
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    #[serde(rename = "ws")]
    WebSocket,
    #[serde(rename = "grpc")]
    Grpc,
    #[serde(rename = "httpupgrade")]
    HttpUpgrade,
    #[serde(rename = "h2")]
    Http2,
}

impl TransportKind {
    /// Maps a link's `type`/`net` value to a transport.
    ///
    /// Returns `None` for raw TCP and for names no exporter can express.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "ws" | "websocket" => Some(TransportKind::WebSocket),
            "grpc" | "gun" => Some(TransportKind::Grpc),
            "httpupgrade" => Some(TransportKind::HttpUpgrade),
            "h2" | "http" => Some(TransportKind::Http2),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "ws",
            TransportKind::Grpc => "grpc",
            TransportKind::HttpUpgrade => "httpupgrade",
            TransportKind::Http2 => "h2",
        }
    }
}

/// Non-raw stream transport
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct TransportSettings {
    #[serde(rename = "type")]
    pub kind: TransportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

impl TransportSettings {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            path: None,
            host: None,
            service_name: None,
        }
    }
}

// ============================================================================
// Shadowsocks plugin
// ============================================================================

/// Decoded SIP002 plugin string (`name;key=value;flag`)
///
/// Options keep their order of appearance. Bare flags carry the value `"true"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginOpts {
    pub name: String,
    pub options: Vec<(String, String)>,
}

impl PluginOpts {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v == "true" || v == "1")
    }

    /// Option string without the plugin name, flags rendered bare
    /// (`mux=0;path=/ws;tls`).
    pub fn options_string(&self) -> String {
        self.options
            .iter()
            .map(|(k, v)| {
                if v == "true" {
                    k.clone()
                } else {
                    format!("{}={}", k, v)
                }
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl Serialize for PluginOpts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.options.len() + 1))?;
        map.serialize_entry("name", &self.name)?;
        for (k, v) in &self.options {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

// ============================================================================
// Extension keys
// ============================================================================

/// REALITY parameters (`pbk`, `sid`)
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RealitySettings {
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

/// WireGuard peer and interface parameters taken from the link query
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WireGuardSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_address: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

/// Optional per-protocol fields that have no place in the common model
///
/// | Field             | Source                      | Used by                |
/// |-------------------|-----------------------------|------------------------|
/// | `cipher`          | vmess `scy`                 | vmess                  |
/// | `alter_id`        | vmess `aid`                 | vmess                  |
/// | `flow`            | vless `flow`                | vless                  |
/// | `fingerprint`     | `fp`                        | any TLS profile        |
/// | `alpn`            | `alpn` (comma separated)    | any TLS profile        |
/// | `reality`         | `pbk` / `sid`               | `security=reality`     |
/// | `packet_encoding` | `packetEncoding`            | vmess, vless           |
/// | `wireguard`       | wg query                    | wg                     |
/// | `other`           | anything else, stringified  | inspection only        |
#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Extensions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alter_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality: Option<RealitySettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wireguard: Option<WireGuardSettings>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub other: BTreeMap<String, String>,
}

// ============================================================================
// Profile
// ============================================================================

/// Canonical representation of one proxy endpoint
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Profile {
    /// Display label; may be empty
    pub id: String,
    proto: Protocol,
    pub server: String,
    /// `0` when the link carried no usable port
    pub port: u16,
    auth: Auth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginOpts>,
    pub extra: Extensions,
}

impl Profile {
    pub fn new(auth: Auth, server: impl Into<String>, port: u16) -> Self {
        Self {
            id: String::new(),
            proto: auth.protocol(),
            server: server.into(),
            port,
            auth,
            tls: None,
            transport: None,
            plugin: None,
            extra: Extensions::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn proto(&self) -> Protocol {
        self.proto
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Label used as node name in rendered documents, falling back to the
    /// server host name when the link had no tag.
    pub fn display_name(&self) -> &str {
        if self.id.trim().is_empty() {
            &self.server
        } else {
            &self.id
        }
    }

    pub fn has_valid_port(&self) -> bool {
        self.port != 0
    }

    /// SNI to present, falling back to the transport's Host header
    pub fn effective_server_name(&self) -> Option<&str> {
        self.tls
            .as_ref()
            .and_then(|t| t.server_name.as_deref())
            .or_else(|| self.transport.as_ref().and_then(|t| t.host.as_deref()))
    }
}
