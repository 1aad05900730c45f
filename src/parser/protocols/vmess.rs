//! VMess protocol parser
//!
//! This module provides parsing for VMess (vmess://) URIs.
//! VMess URIs are Base64 encoded JSON containing connection details.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::{ParseCause, ParseError};
use crate::parser::base64::Base64Policy;
use crate::parser::{is_truthy, parse_port_lenient, split_fragment, split_list, strip_scheme};
use crate::profile::{
    Auth, Profile, RealitySettings, TlsSettings, TransportKind, TransportSettings,
};

use super::ProtocolParser;

const SCHEME: &str = "vmess";

// ============================================================================
// VMess Parser
// ============================================================================

/// Parser for VMess (vmess://) URIs
///
/// VMess URIs are Base64 encoded JSON:
/// vmess://BASE64({ "v": "2", "ps": "name", "add": "host", "port": 443, ... })
pub struct VMessParser {
    policy: Base64Policy,
}

impl VMessParser {
    pub fn new(policy: Base64Policy) -> Self {
        Self { policy }
    }
}

/// VMess URI JSON structure
///
/// Generators disagree on value types, so every field accepts strings,
/// numbers and booleans alike. Keys not listed here end up in `other`.
#[derive(Deserialize, Debug, Default)]
#[allow(dead_code)]
struct VMessJson {
    /// Version (usually "2")
    #[serde(default, deserialize_with = "deserialize_scalar")]
    v: Option<String>,
    /// Remark/name
    #[serde(default, deserialize_with = "deserialize_scalar")]
    ps: Option<String>,
    /// Server address
    #[serde(default, deserialize_with = "deserialize_scalar")]
    add: Option<String>,
    /// Server port (string, integer or integral float)
    #[serde(default, deserialize_with = "deserialize_port")]
    port: Option<u16>,
    /// UUID
    #[serde(default, deserialize_with = "deserialize_scalar")]
    id: Option<String>,
    /// Alter ID (string or number)
    #[serde(default, deserialize_with = "deserialize_scalar")]
    aid: Option<String>,
    /// Security/encryption method
    #[serde(default, deserialize_with = "deserialize_scalar")]
    scy: Option<String>,
    /// Network type (tcp, ws, grpc, ...)
    #[serde(default, deserialize_with = "deserialize_scalar")]
    net: Option<String>,
    /// Transport host / WebSocket Host header
    #[serde(default, deserialize_with = "deserialize_scalar")]
    host: Option<String>,
    /// Transport path (gRPC service name for some generators)
    #[serde(default, deserialize_with = "deserialize_scalar")]
    path: Option<String>,
    #[serde(
        default,
        rename = "serviceName",
        deserialize_with = "deserialize_scalar"
    )]
    service_name: Option<String>,
    /// `tls`, `reality` or empty
    #[serde(default, deserialize_with = "deserialize_scalar")]
    tls: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    sni: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    alpn: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    fp: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    pbk: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    sid: Option<String>,
    #[serde(
        default,
        rename = "allowInsecure",
        deserialize_with = "deserialize_scalar"
    )]
    allow_insecure: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    insecure: Option<String>,
    #[serde(default, deserialize_with = "deserialize_scalar")]
    verify: Option<String>,
    #[serde(
        default,
        rename = "packetEncoding",
        deserialize_with = "deserialize_scalar"
    )]
    packet_encoding: Option<String>,
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

impl ProtocolParser for VMessParser {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn parse(&self, uri: &str) -> Result<Profile, ParseError> {
        trace!("Parsing VMess URI");
        let err = |cause: ParseCause| ParseError::new(SCHEME, cause);

        let (body, fragment_tag) = split_fragment(strip_scheme(uri.trim()));
        let encoded = urlencoding::decode(body).unwrap_or_else(|_| body.into());

        let decoded = self.policy.decode_text(&encoded).map_err(err)?;
        trace!("Decoded VMess JSON: {}", decoded);

        let json: VMessJson =
            serde_json::from_str(&decoded).map_err(|e| err(ParseCause::Json(e)))?;

        let server = json.add.clone().ok_or_else(|| err(ParseCause::Missing("address")))?;
        let uuid = json.id.clone().ok_or_else(|| err(ParseCause::Missing("uuid")))?;
        let port = json.port.unwrap_or(0);

        trace!(
            "VMess config: server={}:{}, net={:?}, tls={:?}",
            server, port, json.net, json.tls
        );

        let tag = json.ps.clone().unwrap_or(fragment_tag);
        let mut profile = Profile::new(Auth::VMess { uuid }, server, port).with_id(tag.trim());

        profile.tls = self.build_tls(&json);
        profile.transport = self.build_transport(&json);

        let extra = &mut profile.extra;
        extra.cipher = json.scy.clone();
        extra.alter_id = json.aid.as_deref().and_then(|aid| match aid.parse::<u32>() {
            Ok(aid) => Some(aid),
            Err(_) => {
                warn!(aid, "Ignoring invalid VMess alter id");
                None
            }
        });
        extra.fingerprint = json.fp.clone();
        extra.alpn = json.alpn.as_deref().map(split_list).unwrap_or_default();
        extra.packet_encoding = json.packet_encoding.clone();
        if is_reality(&json)
            && let Some(public_key) = &json.pbk
        {
            extra.reality = Some(RealitySettings {
                public_key: public_key.clone(),
                short_id: json.sid.clone(),
            });
        }
        extra.other = json
            .other
            .iter()
            .filter_map(|(k, v)| value_to_raw_string(v).map(|v| (k.clone(), v)))
            .collect();

        Ok(profile)
    }
}

impl VMessParser {
    fn build_tls(&self, json: &VMessJson) -> Option<TlsSettings> {
        let security = json.tls.as_deref().unwrap_or_default().to_ascii_lowercase();
        if security != "tls" && security != "reality" {
            return None;
        }

        let insecure = json.allow_insecure.as_deref().is_some_and(is_truthy)
            || json.insecure.as_deref().is_some_and(is_truthy)
            || json
                .verify
                .as_deref()
                .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "false" | "0"));

        let server_name = json.sni.clone().or_else(|| json.host.clone());
        Some(TlsSettings::new(server_name, insecure))
    }

    fn build_transport(&self, json: &VMessJson) -> Option<TransportSettings> {
        let net = json.net.as_deref()?;
        let Some(kind) = TransportKind::from_name(net) else {
            if !matches!(net.to_ascii_lowercase().as_str(), "tcp" | "none" | "raw") {
                warn!(transport = net, "Unknown VMess network, falling back to tcp");
            }
            return None;
        };

        let mut transport = TransportSettings::new(kind);
        transport.path = json.path.clone();
        transport.host = json.host.clone().or_else(|| json.sni.clone());
        transport.service_name = match kind {
            TransportKind::Grpc => json.service_name.clone().or_else(|| json.path.clone()),
            _ => json.service_name.clone(),
        };
        Some(transport)
    }
}

fn is_reality(json: &VMessJson) -> bool {
    json.tls
        .as_deref()
        .is_some_and(|t| t.eq_ignore_ascii_case("reality"))
}

/// Stringifies a JSON value; `null` and empty strings yield `None`
fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Stringifies a JSON value without trimming; only `null` yields `None`
fn value_to_raw_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Reads a port from a string or a JSON number
///
/// Integral floats such as `443.0` are accepted. Anything else that does not
/// fit a `u16` becomes `0`.
fn port_from_value(value: &Value) -> u16 {
    match value {
        Value::String(s) => parse_port_lenient(s),
        Value::Number(n) => {
            let port = n.as_u64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u16::MAX))
                    .map(|f| f as u64)
            });
            match port.and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    warn!(port = %n, "Invalid VMess port, continuing with port 0");
                    0
                }
            }
        }
        Value::Null => 0,
        other => {
            warn!(port = %other, "Invalid VMess port, continuing with port 0");
            0
        }
    }
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(port_from_value))
}

/// Custom deserializer accepting any JSON value as an optional string
fn deserialize_scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_string))
}
