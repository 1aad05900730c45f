//! Clash (mihomo) YAML exporter
//!
//! Renders the profile as a Clash proxy entry and injects it into the Clash
//! template: the node goes to `proxies`, its name to the matching
//! `proxy-groups`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::RenderError;
use crate::export::template::{
    GroupRules, TemplateLayout, TemplateSource, inject_node, load_template,
};
use crate::export::{Exporter, require_port};
use crate::profile::{Auth, PluginOpts, Profile, TransportKind, TransportSettings};
use crate::util::{is_false, is_zero_u32};

const FORMAT: &str = "clash";

const LAYOUT: TemplateLayout = TemplateLayout {
    format: FORMAT,
    nodes_key: "proxies",
    groups_key: "proxy-groups",
    group_name_key: "name",
    group_members_key: "proxies",
    latency_group_type: "url-test",
};

// ============================================================================
// Proxy Model
// ============================================================================

/// Clash proxy entry
#[derive(Serialize, Clone, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClashProxy {
    Vmess(VmessProxy),
    Trojan(TrojanProxy),
    Ss(ShadowsocksProxy),
    Wireguard(WireGuardProxy),
}

/// TLS keys shared by vmess and trojan entries
#[derive(Serialize, Clone, Debug, Default)]
pub struct ClashTls {
    #[serde(skip_serializing_if = "is_false")]
    pub tls: bool,
    #[serde(rename = "skip-cert-verify", skip_serializing_if = "is_false")]
    pub skip_cert_verify: bool,
    #[serde(rename = "client-fingerprint", skip_serializing_if = "Option::is_none")]
    pub client_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alpn: Vec<String>,
}

/// `network` and its matching `*-opts` block
#[derive(Serialize, Clone, Debug, Default)]
pub struct ClashNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<&'static str>,
    #[serde(rename = "ws-opts", skip_serializing_if = "Option::is_none")]
    pub ws_opts: Option<WsOpts>,
    #[serde(rename = "grpc-opts", skip_serializing_if = "Option::is_none")]
    pub grpc_opts: Option<GrpcOpts>,
    #[serde(rename = "h2-opts", skip_serializing_if = "Option::is_none")]
    pub h2_opts: Option<H2Opts>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct WsOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "v2ray-http-upgrade", skip_serializing_if = "is_false")]
    pub v2ray_http_upgrade: bool,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct GrpcOpts {
    #[serde(rename = "grpc-service-name", skip_serializing_if = "Option::is_none")]
    pub grpc_service_name: Option<String>,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct H2Opts {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub host: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// VMess entry; VLESS profiles are emitted in this shape too
#[derive(Serialize, Clone, Debug)]
pub struct VmessProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub uuid: String,
    #[serde(rename = "alterId")]
    pub alter_id: u32,
    pub cipher: String,
    #[serde(flatten)]
    pub tls: ClashTls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servername: Option<String>,
    #[serde(flatten)]
    pub network: ClashNetwork,
}

/// Stream multiplexing block
#[derive(Serialize, Clone, Debug)]
pub struct Smux {
    pub enabled: bool,
    pub protocol: String,
    #[serde(rename = "max-streams", skip_serializing_if = "is_zero_u32")]
    pub max_streams: u32,
}

impl Default for Smux {
    fn default() -> Self {
        Self {
            enabled: true,
            protocol: "smux".to_string(),
            max_streams: 8,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct TrojanProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub password: String,
    #[serde(flatten)]
    pub tls: ClashTls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    #[serde(flatten)]
    pub network: ClashNetwork,
    pub smux: Smux,
}

#[derive(Serialize, Clone, Debug)]
pub struct ShadowsocksProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    pub cipher: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(rename = "plugin-opts", skip_serializing_if = "Option::is_none")]
    pub plugin_opts: Option<Map<String, Value>>,
}

#[derive(Serialize, Clone, Debug)]
pub struct WireGuardProxy {
    pub name: String,
    pub server: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
    #[serde(rename = "private-key")]
    pub private_key: String,
    #[serde(rename = "public-key")]
    pub public_key: String,
    #[serde(rename = "pre-shared-key", skip_serializing_if = "Option::is_none")]
    pub pre_shared_key: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,
    pub udp: bool,
}

// ============================================================================
// Profile -> Proxy
// ============================================================================

/// Builds the Clash proxy entry for a profile
pub fn build_proxy(profile: &Profile) -> Result<ClashProxy, RenderError> {
    let port = require_port(profile, FORMAT)?;
    let name = profile.display_name().to_string();
    let server = profile.server.clone();

    let proxy = match profile.auth() {
        Auth::VMess { uuid } | Auth::VLess { uuid } => {
            let is_vless = matches!(profile.auth(), Auth::VLess { .. });
            if is_vless && (profile.extra.flow.is_some() || profile.extra.reality.is_some()) {
                warn!(
                    node = name.as_str(),
                    "VLESS flow/REALITY settings are dropped when exporting as Clash vmess"
                );
            }
            let (alter_id, cipher) = if is_vless {
                (0, "auto".to_string())
            } else {
                (
                    profile.extra.alter_id.unwrap_or(0),
                    profile
                        .extra
                        .cipher
                        .clone()
                        .unwrap_or_else(|| "auto".to_string()),
                )
            };
            let tls = build_tls(profile);
            ClashProxy::Vmess(VmessProxy {
                name,
                server,
                port,
                uuid: uuid.clone(),
                alter_id,
                cipher,
                servername: tls_server_name(profile),
                tls,
                network: build_network(profile.transport.as_ref()),
            })
        }
        Auth::Trojan { password } => ClashProxy::Trojan(TrojanProxy {
            name,
            server,
            port,
            password: password.clone(),
            tls: build_tls(profile),
            sni: tls_server_name(profile),
            network: build_network(profile.transport.as_ref()),
            smux: Smux::default(),
        }),
        Auth::Shadowsocks { method, password } => {
            let (plugin, plugin_opts) = build_ss_plugin(profile);
            ClashProxy::Ss(ShadowsocksProxy {
                name,
                server,
                port,
                cipher: method.clone(),
                password: password.clone(),
                plugin,
                plugin_opts,
            })
        }
        Auth::WireGuard { private_key } => {
            let wg = profile.extra.wireguard.clone().unwrap_or_default();
            let public_key = wg.public_key.ok_or(RenderError::MissingField {
                format: FORMAT,
                field: "peer public key",
            })?;
            let strip_prefix = |addr: &String| addr.split('/').next().unwrap_or(addr).to_string();
            ClashProxy::Wireguard(WireGuardProxy {
                name,
                server,
                port,
                ip: wg
                    .local_address
                    .iter()
                    .find(|a| !a.contains(':'))
                    .map(strip_prefix),
                ipv6: wg
                    .local_address
                    .iter()
                    .find(|a| a.contains(':'))
                    .map(strip_prefix),
                private_key: private_key.clone(),
                public_key,
                pre_shared_key: wg.pre_shared_key,
                reserved: wg.reserved,
                mtu: wg.mtu,
                udp: true,
            })
        }
    };
    Ok(proxy)
}

fn build_tls(profile: &Profile) -> ClashTls {
    match &profile.tls {
        Some(tls) if tls.enabled => ClashTls {
            tls: true,
            skip_cert_verify: tls.insecure,
            client_fingerprint: profile.extra.fingerprint.clone(),
            alpn: profile.extra.alpn.clone(),
        },
        _ => ClashTls::default(),
    }
}

/// SNI for TLS profiles, falling back to the transport host
fn tls_server_name(profile: &Profile) -> Option<String> {
    profile
        .tls
        .as_ref()
        .filter(|t| t.enabled)
        .and_then(|_| profile.effective_server_name())
        .map(str::to_string)
}

fn build_network(transport: Option<&TransportSettings>) -> ClashNetwork {
    let Some(transport) = transport else {
        return ClashNetwork::default();
    };

    let host_headers = || {
        transport
            .host
            .iter()
            .map(|h| ("Host".to_string(), h.clone()))
            .collect::<BTreeMap<_, _>>()
    };

    match transport.kind {
        TransportKind::WebSocket | TransportKind::HttpUpgrade => ClashNetwork {
            network: Some("ws"),
            ws_opts: Some(WsOpts {
                path: transport.path.clone(),
                headers: host_headers(),
                v2ray_http_upgrade: transport.kind == TransportKind::HttpUpgrade,
            }),
            ..Default::default()
        },
        TransportKind::Grpc => ClashNetwork {
            network: Some("grpc"),
            grpc_opts: Some(GrpcOpts {
                grpc_service_name: transport.service_name.clone(),
            }),
            ..Default::default()
        },
        TransportKind::Http2 => ClashNetwork {
            network: Some("h2"),
            h2_opts: Some(H2Opts {
                host: transport.host.iter().cloned().collect(),
                path: transport.path.clone(),
            }),
            ..Default::default()
        },
    }
}

/// Maps SIP003 plugins to Clash `plugin` / `plugin-opts`
///
/// A WebSocket transport without plugin is expressed as `v2ray-plugin`.
fn build_ss_plugin(profile: &Profile) -> (Option<String>, Option<Map<String, Value>>) {
    let tls = profile.tls.as_ref().filter(|t| t.enabled);
    let ws_transport = profile
        .transport
        .as_ref()
        .filter(|t| t.kind == TransportKind::WebSocket);

    match &profile.plugin {
        Some(plugin) if plugin.name == "obfs-local" || plugin.name == "simple-obfs" => {
            let mut opts = Map::new();
            if let Some(mode) = plugin.get("obfs").or_else(|| plugin.get("mode")) {
                opts.insert("mode".to_string(), Value::from(mode));
            }
            if let Some(host) = plugin.get("obfs-host").or_else(|| plugin.get("host")) {
                opts.insert("host".to_string(), Value::from(host));
            }
            (Some("obfs".to_string()), Some(opts))
        }
        Some(plugin) if plugin.name == "v2ray-plugin" => {
            let mut opts = Map::new();
            opts.insert(
                "mode".to_string(),
                Value::from(plugin.get("mode").unwrap_or("websocket")),
            );
            let host = plugin
                .get("host")
                .map(str::to_string)
                .or_else(|| ws_transport.and_then(|t| t.host.clone()));
            if let Some(host) = host {
                opts.insert("host".to_string(), Value::from(host));
            }
            let path = plugin
                .get("path")
                .map(str::to_string)
                .or_else(|| ws_transport.and_then(|t| t.path.clone()));
            if let Some(path) = path {
                opts.insert("path".to_string(), Value::from(path));
            }
            if plugin.has_flag("tls") || tls.is_some() {
                opts.insert("tls".to_string(), Value::Bool(true));
            }
            if let Some(mux) = plugin.get("mux") {
                opts.insert("mux".to_string(), Value::Bool(mux != "0" && mux != "false"));
            }
            if tls.is_some_and(|t| t.insecure) {
                opts.insert("skip-cert-verify".to_string(), Value::Bool(true));
            }
            (Some("v2ray-plugin".to_string()), Some(opts))
        }
        Some(plugin) => {
            warn!(
                plugin = plugin.name.as_str(),
                "Clash has no mapping for this SIP003 plugin, passing options through"
            );
            (Some(plugin.name.clone()), Some(passthrough_opts(plugin)))
        }
        None => match ws_transport {
            Some(transport) => {
                debug!("Expressing Shadowsocks WebSocket transport as v2ray-plugin");
                let mut opts = Map::new();
                opts.insert("mode".to_string(), Value::from("websocket"));
                if let Some(host) = &transport.host {
                    opts.insert("host".to_string(), Value::from(host.as_str()));
                }
                if let Some(path) = &transport.path {
                    opts.insert("path".to_string(), Value::from(path.as_str()));
                }
                if tls.is_some() {
                    opts.insert("tls".to_string(), Value::Bool(true));
                }
                (Some("v2ray-plugin".to_string()), Some(opts))
            }
            None => (None, None),
        },
    }
}

fn passthrough_opts(plugin: &PluginOpts) -> Map<String, Value> {
    plugin
        .options
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
        .collect()
}

// ============================================================================
// Exporter
// ============================================================================

/// Exporter for Clash YAML configurations
pub struct ClashExporter {
    template: Arc<dyn TemplateSource>,
    rules: GroupRules,
}

impl ClashExporter {
    pub fn new(template: Arc<dyn TemplateSource>, rules: GroupRules) -> Self {
        Self { template, rules }
    }
}

impl Exporter for ClashExporter {
    fn name(&self) -> &str {
        FORMAT
    }

    fn file_extension(&self) -> &str {
        "yaml"
    }

    fn render(&self, profile: &Profile) -> Result<String, RenderError> {
        let proxy = build_proxy(profile)?;
        let node = serde_json::to_value(&proxy).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })?;

        let text = load_template(self.template.as_ref(), FORMAT)?;
        let mut tree: Value =
            serde_yml::from_str(&text).map_err(|e| RenderError::TemplateParse {
                format: FORMAT,
                reason: e.to_string(),
            })?;

        inject_node(
            &mut tree,
            &LAYOUT,
            node,
            profile.display_name(),
            &self.rules,
        )?;

        serde_yml::to_string(&tree).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })
    }
}
