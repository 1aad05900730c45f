//! sing-box JSON exporter
//!
//! Builds a sing-box outbound for the profile and injects it into the
//! sing-box template, where nodes and selector groups share the top-level
//! `outbounds` list.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::export::template::{
    GroupRules, TemplateLayout, TemplateSource, inject_node, load_template,
};
use crate::export::{Exporter, require_port};
use crate::profile::{Auth, Profile, TransportKind, TransportSettings};
use crate::util::{is_false, is_zero_u32};

const FORMAT: &str = "singbox";

const LAYOUT: TemplateLayout = TemplateLayout {
    format: FORMAT,
    nodes_key: "outbounds",
    groups_key: "outbounds",
    group_name_key: "tag",
    group_members_key: "outbounds",
    latency_group_type: "urltest",
};

/// Header carrying WebSocket early data, as expected by Xray/V2Ray servers
const EARLY_DATA_HEADER: &str = "Sec-WebSocket-Protocol";
const MAX_EARLY_DATA: u32 = 2048;

// ============================================================================
// Outbound Model
// ============================================================================

/// Outbound types this exporter produces
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    VMess(VMessOutbound),
    VLess(VLessOutbound),
    Trojan(TrojanOutbound),
    Shadowsocks(ShadowsocksOutbound),
    WireGuard(WireGuardOutbound),
}

/// TLS configuration for outbound (client) connections.
#[derive(Serialize, Clone, Debug, Default)]
pub struct OutboundTlsConfig {
    /// Enable TLS
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Server name for verification and SNI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,

    /// Accept any server certificate
    #[serde(skip_serializing_if = "is_false")]
    pub insecure: bool,

    /// List of supported ALPN protocols
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,

    /// uTLS configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utls: Option<UtlsConfig>,

    /// Reality configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reality: Option<OutboundRealityConfig>,
}

/// uTLS configuration for TLS fingerprint resistance.
#[derive(Serialize, Clone, Debug, Default)]
pub struct UtlsConfig {
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Fingerprint to use: chrome, firefox, edge, safari, ...
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct OutboundRealityConfig {
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Short ID (hex string, 0-8 digits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_id: Option<String>,
}

/// V2Ray transport configuration
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum V2RayTransport {
    Http(HttpTransport),
    #[serde(rename = "ws")]
    WebSocket(WebSocketTransport),
    #[serde(rename = "grpc")]
    Grpc(GrpcTransport),
    #[serde(rename = "httpupgrade")]
    HttpUpgrade(HttpUpgradeTransport),
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct HttpTransport {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct WebSocketTransport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Allowed payload size in the request
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_early_data: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_data_header_name: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct GrpcTransport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct HttpUpgradeTransport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Multiplex configuration for outbound
#[derive(Serialize, Clone, Debug)]
pub struct OutboundMultiplex {
    #[serde(skip_serializing_if = "is_false")]
    pub enabled: bool,

    /// Multiplex protocol: smux, yamux, h2mux
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_streams: Option<u32>,
}

impl Default for OutboundMultiplex {
    fn default() -> Self {
        Self {
            enabled: true,
            protocol: Some("smux".to_string()),
            max_streams: Some(8),
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct VMessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,

    /// Security: auto, none, zero, aes-128-gcm, chacha20-poly1305
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<String>,

    /// Alter ID (0 = AEAD, 1 = legacy)
    #[serde(skip_serializing_if = "is_zero_u32")]
    pub alter_id: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    /// UDP packet encoding: packetaddr, xudp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Clone, Debug)]
pub struct VLessOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub uuid: String,

    /// VLESS sub-protocol: xtls-rprx-vision
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub packet_encoding: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Clone, Debug)]
pub struct TrojanOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub password: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<OutboundTlsConfig>,

    pub multiplex: OutboundMultiplex,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<V2RayTransport>,
}

#[derive(Serialize, Clone, Debug)]
pub struct ShadowsocksOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,
    pub method: String,
    pub password: String,

    /// Shadowsocks SIP003 plugin: obfs-local, v2ray-plugin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct WireGuardOutbound {
    pub tag: String,
    pub server: String,
    pub server_port: u16,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local_address: Vec<String>,

    pub private_key: String,
    pub peer_public_key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
}

// ============================================================================
// Profile -> Outbound
// ============================================================================

/// Builds the sing-box outbound for a profile
pub fn build_outbound(profile: &Profile) -> Result<Outbound, RenderError> {
    let server_port = require_port(profile, FORMAT)?;
    let tag = profile.display_name().to_string();
    let server = profile.server.clone();
    let transport = profile.transport.as_ref().map(build_transport);

    let outbound = match profile.auth() {
        Auth::VMess { uuid } => Outbound::VMess(VMessOutbound {
            tag,
            server,
            server_port,
            uuid: uuid.clone(),
            security: profile.extra.cipher.clone(),
            alter_id: profile.extra.alter_id.unwrap_or(0),
            tls: build_tls(profile),
            packet_encoding: profile.extra.packet_encoding.clone(),
            transport,
        }),
        Auth::VLess { uuid } => Outbound::VLess(VLessOutbound {
            tag,
            server,
            server_port,
            uuid: uuid.clone(),
            flow: profile.extra.flow.clone(),
            tls: build_tls(profile),
            packet_encoding: profile.extra.packet_encoding.clone(),
            transport,
        }),
        Auth::Trojan { password } => Outbound::Trojan(TrojanOutbound {
            tag,
            server,
            server_port,
            password: password.clone(),
            tls: build_tls(profile),
            multiplex: OutboundMultiplex::default(),
            transport,
        }),
        Auth::Shadowsocks { method, password } => {
            let (plugin, plugin_opts) = build_ss_plugin(profile);
            Outbound::Shadowsocks(ShadowsocksOutbound {
                tag,
                server,
                server_port,
                method: method.clone(),
                password: password.clone(),
                plugin,
                plugin_opts,
            })
        }
        Auth::WireGuard { private_key } => {
            let wg = profile.extra.wireguard.clone().unwrap_or_default();
            let peer_public_key = wg.public_key.ok_or(RenderError::MissingField {
                format: FORMAT,
                field: "peer public key",
            })?;
            Outbound::WireGuard(WireGuardOutbound {
                tag,
                server,
                server_port,
                local_address: wg.local_address,
                private_key: private_key.clone(),
                peer_public_key,
                pre_shared_key: wg.pre_shared_key,
                reserved: wg.reserved,
                mtu: wg.mtu,
            })
        }
    };
    Ok(outbound)
}

fn build_tls(profile: &Profile) -> Option<OutboundTlsConfig> {
    let tls = profile.tls.as_ref().filter(|t| t.enabled)?;

    let utls = profile.extra.fingerprint.as_ref().map(|fp| UtlsConfig {
        enabled: true,
        fingerprint: Some(fp.clone()),
    });
    let reality = profile
        .extra
        .reality
        .as_ref()
        .map(|r| OutboundRealityConfig {
            enabled: true,
            public_key: Some(r.public_key.clone()),
            short_id: r.short_id.clone(),
        });

    Some(OutboundTlsConfig {
        enabled: true,
        server_name: profile.effective_server_name().map(str::to_string),
        insecure: tls.insecure,
        alpn: profile.extra.alpn.clone(),
        utls,
        reality,
    })
}

fn build_transport(transport: &TransportSettings) -> V2RayTransport {
    match transport.kind {
        TransportKind::WebSocket => {
            let mut headers = HashMap::new();
            if let Some(host) = &transport.host {
                headers.insert("Host".to_string(), host.clone());
            }
            V2RayTransport::WebSocket(WebSocketTransport {
                path: transport.path.clone(),
                headers,
                max_early_data: MAX_EARLY_DATA,
                early_data_header_name: Some(EARLY_DATA_HEADER.to_string()),
            })
        }
        TransportKind::Grpc => V2RayTransport::Grpc(GrpcTransport {
            service_name: transport.service_name.clone(),
        }),
        TransportKind::HttpUpgrade => V2RayTransport::HttpUpgrade(HttpUpgradeTransport {
            host: transport.host.clone(),
            path: transport.path.clone(),
        }),
        TransportKind::Http2 => V2RayTransport::Http(HttpTransport {
            host: transport.host.iter().cloned().collect(),
            path: transport.path.clone(),
        }),
    }
}

/// sing-box takes SIP003 plugin options as a single string
fn build_ss_plugin(profile: &Profile) -> (Option<String>, Option<String>) {
    if let Some(plugin) = &profile.plugin {
        let name = match plugin.name.as_str() {
            "simple-obfs" => "obfs-local",
            name @ ("obfs-local" | "v2ray-plugin") => name,
            other => {
                warn!(plugin = other, "sing-box may not support this SIP003 plugin");
                other
            }
        };
        let opts = plugin.options_string();
        return (Some(name.to_string()), (!opts.is_empty()).then_some(opts));
    }

    let Some(transport) = profile
        .transport
        .as_ref()
        .filter(|t| t.kind == TransportKind::WebSocket)
    else {
        return (None, None);
    };

    debug!("Expressing Shadowsocks WebSocket transport as v2ray-plugin");
    let mut opts = Vec::new();
    if profile.tls.as_ref().is_some_and(|t| t.enabled) {
        opts.push("tls".to_string());
    }
    if let Some(host) = &transport.host {
        opts.push(format!("host={}", host));
    }
    if let Some(path) = &transport.path {
        opts.push(format!("path={}", path));
    }
    (Some("v2ray-plugin".to_string()), Some(opts.join(";")))
}

// ============================================================================
// Exporter
// ============================================================================

/// Exporter for sing-box JSON configurations
pub struct SingBoxExporter {
    template: Arc<dyn TemplateSource>,
    rules: GroupRules,
}

impl SingBoxExporter {
    pub fn new(template: Arc<dyn TemplateSource>, rules: GroupRules) -> Self {
        Self { template, rules }
    }
}

impl Exporter for SingBoxExporter {
    fn name(&self) -> &str {
        FORMAT
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn render(&self, profile: &Profile) -> Result<String, RenderError> {
        let outbound = build_outbound(profile)?;
        let node = serde_json::to_value(&outbound).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })?;

        let text = load_template(self.template.as_ref(), FORMAT)?;
        let mut tree: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| RenderError::TemplateParse {
                format: FORMAT,
                reason: e.to_string(),
            })?
        };

        inject_node(
            &mut tree,
            &LAYOUT,
            node,
            profile.display_name(),
            &self.rules,
        )?;

        serde_json::to_string_pretty(&tree).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::InlineTemplate;
    use crate::profile::{PluginOpts, RealitySettings, TlsSettings, WireGuardSettings};
    use serde_json::json;

    const TEMPLATE: &str = r#"{
  "log": {"level": "info"},
  "outbounds": [
    {"type": "selector", "tag": "Internet", "outbounds": ["Best Latency 🚀"]},
    {"type": "urltest", "tag": "Best Latency 🚀", "outbounds": []},
    {"type": "urltest", "tag": "Latency ID", "outbounds": []},
    {"type": "direct", "tag": "direct"}
  ]
}"#;

    fn to_json(outbound: &Outbound) -> Value {
        serde_json::to_value(outbound).unwrap()
    }

    fn reality_vless() -> Profile {
        let mut profile = Profile::new(
            Auth::VLess {
                uuid: "uuid".to_string(),
            },
            "example.com",
            443,
        )
        .with_id("🇮🇩 Jakarta");
        profile.tls = Some(TlsSettings::new(Some("www.microsoft.com".to_string()), false));
        profile.extra.flow = Some("xtls-rprx-vision".to_string());
        profile.extra.fingerprint = Some("chrome".to_string());
        profile.extra.reality = Some(RealitySettings {
            public_key: "pbk".to_string(),
            short_id: Some("abcd".to_string()),
        });
        profile
    }

    #[test]
    fn test_vless_reality_outbound() {
        let node = to_json(&build_outbound(&reality_vless()).unwrap());
        assert_eq!(node["type"], "vless");
        assert_eq!(node["tag"], "🇮🇩 Jakarta");
        assert_eq!(node["server_port"], 443);
        assert_eq!(node["flow"], "xtls-rprx-vision");
        assert_eq!(
            node["tls"],
            json!({
                "enabled": true,
                "server_name": "www.microsoft.com",
                "utls": {"enabled": true, "fingerprint": "chrome"},
                "reality": {"enabled": true, "public_key": "pbk", "short_id": "abcd"}
            })
        );
        assert!(node.get("transport").is_none());
    }

    #[test]
    fn test_ws_transport_defaults() {
        let mut profile = Profile::new(
            Auth::VMess {
                uuid: "u".to_string(),
            },
            "example.com",
            443,
        );
        let mut transport = TransportSettings::new(TransportKind::WebSocket);
        transport.path = Some("/ws".to_string());
        transport.host = Some("cdn.example.com".to_string());
        profile.transport = Some(transport);
        profile.tls = Some(TlsSettings::new(None, true));

        let node = to_json(&build_outbound(&profile).unwrap());
        assert_eq!(node["type"], "vmess");
        assert_eq!(
            node["transport"],
            json!({
                "type": "ws",
                "path": "/ws",
                "headers": {"Host": "cdn.example.com"},
                "max_early_data": 2048,
                "early_data_header_name": "Sec-WebSocket-Protocol"
            })
        );
        assert_eq!(node["tls"]["server_name"], "cdn.example.com");
        assert_eq!(node["tls"]["insecure"], true);
    }

    #[test]
    fn test_trojan_multiplex_and_grpc() {
        let mut profile = Profile::new(
            Auth::Trojan {
                password: "pw".to_string(),
            },
            "example.com",
            443,
        );
        profile.tls = Some(TlsSettings::new(None, false));
        let mut transport = TransportSettings::new(TransportKind::Grpc);
        transport.service_name = Some("svc".to_string());
        profile.transport = Some(transport);

        let node = to_json(&build_outbound(&profile).unwrap());
        assert_eq!(node["type"], "trojan");
        assert_eq!(
            node["multiplex"],
            json!({"enabled": true, "protocol": "smux", "max_streams": 8})
        );
        assert_eq!(node["transport"], json!({"type": "grpc", "service_name": "svc"}));
        assert_eq!(node["tls"], json!({"enabled": true}));
    }

    #[test]
    fn test_shadowsocks_plugin_string() {
        let mut profile = Profile::new(
            Auth::Shadowsocks {
                method: "aes-256-gcm".to_string(),
                password: "pw".to_string(),
            },
            "example.com",
            8388,
        );
        let mut plugin = PluginOpts::new("v2ray-plugin");
        for (k, v) in [("mux", "0"), ("path", "/ws"), ("tls", "true")] {
            plugin.options.push((k.to_string(), v.to_string()));
        }
        profile.plugin = Some(plugin);

        let node = to_json(&build_outbound(&profile).unwrap());
        assert_eq!(node["type"], "shadowsocks");
        assert_eq!(node["method"], "aes-256-gcm");
        assert_eq!(node["plugin"], "v2ray-plugin");
        assert_eq!(node["plugin_opts"], "mux=0;path=/ws;tls");
    }

    #[test]
    fn test_shadowsocks_ws_transport_becomes_plugin() {
        let mut profile = Profile::new(
            Auth::Shadowsocks {
                method: "aes-256-gcm".to_string(),
                password: "pw".to_string(),
            },
            "example.com",
            443,
        );
        let mut transport = TransportSettings::new(TransportKind::WebSocket);
        transport.path = Some("/ws".to_string());
        transport.host = Some("cdn.com".to_string());
        profile.transport = Some(transport);
        profile.tls = Some(TlsSettings::new(Some("cdn.com".to_string()), false));

        let node = to_json(&build_outbound(&profile).unwrap());
        assert_eq!(node["plugin"], "v2ray-plugin");
        assert_eq!(node["plugin_opts"], "tls;host=cdn.com;path=/ws");
    }

    #[test]
    fn test_wireguard_outbound() {
        let mut profile = Profile::new(
            Auth::WireGuard {
                private_key: "priv".to_string(),
            },
            "162.159.192.1",
            2408,
        );
        profile.extra.wireguard = Some(WireGuardSettings {
            public_key: Some("pub".to_string()),
            local_address: vec!["172.16.0.2/32".to_string()],
            ..Default::default()
        });

        let node = to_json(&build_outbound(&profile).unwrap());
        assert_eq!(node["type"], "wireguard");
        assert_eq!(node["peer_public_key"], "pub");
        assert_eq!(node["local_address"], json!(["172.16.0.2/32"]));
        assert!(node.get("reserved").is_none());
    }

    #[test]
    fn test_render_injects_into_shared_outbounds() {
        let exporter = SingBoxExporter::new(
            Arc::new(InlineTemplate::new(TEMPLATE, "inline")),
            GroupRules::default(),
        );
        let text = exporter.render(&reality_vless()).unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(doc["log"]["level"], "info");
        let outbounds = doc["outbounds"].as_array().unwrap();
        assert_eq!(outbounds.len(), 5);
        assert_eq!(
            outbounds[0]["outbounds"],
            json!(["Best Latency 🚀", "🇮🇩 Jakarta"])
        );
        assert_eq!(outbounds[1]["outbounds"], json!(["🇮🇩 Jakarta"]));
        assert_eq!(outbounds[2]["outbounds"], json!(["🇮🇩 Jakarta"]));
        assert_eq!(outbounds[4]["type"], "vless");
    }

    #[test]
    fn test_render_reports_invalid_json_template() {
        let exporter = SingBoxExporter::new(
            Arc::new(InlineTemplate::new("{\"outbounds\": [", "inline")),
            GroupRules::default(),
        );
        let err = exporter.render(&reality_vless()).unwrap_err();
        assert!(matches!(err, RenderError::TemplateParse { .. }));
    }
}
