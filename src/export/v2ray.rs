//! V2Ray JSON exporter
//!
//! Emits a minimal document with a single `vnext` outbound. Only the
//! uuid-based protocols have a `vnext` form; TLS and transport settings are
//! not carried over.

use serde::Serialize;

use crate::error::RenderError;
use crate::export::{Exporter, require_port};
use crate::profile::{Auth, Profile};
use crate::util::is_zero_u32;

const FORMAT: &str = "v2ray";

#[derive(Serialize, Debug)]
struct V2RayDocument {
    outbounds: Vec<V2RayOutbound>,
}

#[derive(Serialize, Debug)]
struct V2RayOutbound {
    tag: String,
    protocol: &'static str,
    settings: VnextSettings,
}

#[derive(Serialize, Debug)]
struct VnextSettings {
    vnext: Vec<VnextServer>,
}

#[derive(Serialize, Debug)]
struct VnextServer {
    address: String,
    port: u16,
    users: Vec<VnextUser>,
}

#[derive(Serialize, Debug)]
#[serde(untagged)]
enum VnextUser {
    VMess {
        id: String,
        #[serde(rename = "alterId", skip_serializing_if = "is_zero_u32")]
        alter_id: u32,
        security: String,
    },
    VLess {
        id: String,
        encryption: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        flow: Option<String>,
    },
}

/// Exporter for single-outbound V2Ray JSON
pub struct V2RayExporter;

impl Exporter for V2RayExporter {
    fn name(&self) -> &str {
        FORMAT
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn render(&self, profile: &Profile) -> Result<String, RenderError> {
        let user = match profile.auth() {
            Auth::VMess { uuid } => VnextUser::VMess {
                id: uuid.clone(),
                alter_id: profile.extra.alter_id.unwrap_or(0),
                security: profile
                    .extra
                    .cipher
                    .clone()
                    .unwrap_or_else(|| "auto".to_string()),
            },
            Auth::VLess { uuid } => VnextUser::VLess {
                id: uuid.clone(),
                encryption: "none",
                flow: profile.extra.flow.clone(),
            },
            _ => {
                return Err(RenderError::UnsupportedProtocol {
                    format: FORMAT,
                    proto: profile.proto().as_str(),
                });
            }
        };
        let port = require_port(profile, FORMAT)?;

        let document = V2RayDocument {
            outbounds: vec![V2RayOutbound {
                tag: profile.display_name().to_string(),
                protocol: profile.proto().as_str(),
                settings: VnextSettings {
                    vnext: vec![VnextServer {
                        address: profile.server.clone(),
                        port,
                        users: vec![user],
                    }],
                },
            }],
        };

        serde_json::to_string_pretty(&document).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn render(profile: &Profile) -> Value {
        serde_json::from_str(&V2RayExporter.render(profile).unwrap()).unwrap()
    }

    #[test]
    fn test_vmess_vnext() {
        let mut profile = Profile::new(
            Auth::VMess {
                uuid: "b831381d-6324-4d53-ad4f-8cda48b30811".to_string(),
            },
            "example.com",
            443,
        )
        .with_id("node");
        profile.extra.alter_id = Some(0);

        let doc = render(&profile);
        assert_eq!(
            doc,
            json!({
                "outbounds": [{
                    "tag": "node",
                    "protocol": "vmess",
                    "settings": {"vnext": [{
                        "address": "example.com",
                        "port": 443,
                        "users": [{"id": "b831381d-6324-4d53-ad4f-8cda48b30811", "security": "auto"}]
                    }]}
                }]
            })
        );
    }

    #[test]
    fn test_vless_vnext() {
        let mut profile = Profile::new(
            Auth::VLess {
                uuid: "uuid".to_string(),
            },
            "example.com",
            443,
        );
        profile.extra.flow = Some("xtls-rprx-vision".to_string());

        let doc = render(&profile);
        let outbound = &doc["outbounds"][0];
        assert_eq!(outbound["protocol"], "vless");
        assert_eq!(outbound["tag"], "example.com");
        assert_eq!(
            outbound["settings"]["vnext"][0]["users"][0],
            json!({"id": "uuid", "encryption": "none", "flow": "xtls-rprx-vision"})
        );
    }

    #[test]
    fn test_rejects_non_vnext_protocols() {
        let profile = Profile::new(
            Auth::Trojan {
                password: "pw".to_string(),
            },
            "example.com",
            443,
        );
        let err = V2RayExporter.render(&profile).unwrap_err();
        assert!(matches!(
            err,
            RenderError::UnsupportedProtocol {
                format: "v2ray",
                proto: "trojan"
            }
        ));
    }

    #[test]
    fn test_rejects_port_zero() {
        let profile = Profile::new(
            Auth::VLess {
                uuid: "uuid".to_string(),
            },
            "example.com",
            0,
        );
        let err = V2RayExporter.render(&profile).unwrap_err();
        assert!(matches!(err, RenderError::InvalidPort { .. }));
    }
}
