//! End-to-end conversion tests.
//!
//! Drives the public [`Converter`] with the fixture templates under
//! `tests/fixtures/` and parses every rendered document back.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};
use vpnconv::config::ConverterConfig;
use vpnconv::convert::Converter;
use vpnconv::error::{ConvertError, RenderError};
use vpnconv::export::{FileTemplate, InlineTemplate};
use vpnconv::profile::{Auth, Protocol, TransportKind};

const VLESS_WS: &str = "vless://uuid@host:443?security=tls&sni=example.com&type=ws&path=%2Fws&host=cdn.example.com#MyNode";

const VMESS_STRING_PORT: &str = "vmess://eyJ2IjoiMiIsInBzIjoi8J+HuPCfh6wgU0cgMDEiLCJhZGQiOiJzZy5leGFtcGxlLmNvbSIsInBvcnQiOiI0NDMiLCJpZCI6ImI4MzEzODFkLTYzMjQtNGQ1My1hZDRmLThjZGE0OGIzMDgxMSIsImFpZCI6IjAiLCJzY3kiOiJhdXRvIiwibmV0Ijoid3MiLCJob3N0IjoiY2RuLmV4YW1wbGUuY29tIiwicGF0aCI6Ii9yYXkiLCJ0bHMiOiJ0bHMiLCJzbmkiOiJzZy5leGFtcGxlLmNvbSJ9";

const VMESS_NUMBER_PORT: &str = "vmess://eyJ2IjoiMiIsInBzIjoi8J+HuPCfh6wgU0cgMDEiLCJhZGQiOiJzZy5leGFtcGxlLmNvbSIsInBvcnQiOjQ0MywiaWQiOiJiODMxMzgxZC02MzI0LTRkNTMtYWQ0Zi04Y2RhNDhiMzA4MTEiLCJhaWQiOjAsInNjeSI6ImF1dG8iLCJuZXQiOiJ3cyIsImhvc3QiOiJjZG4uZXhhbXBsZS5jb20iLCJwYXRoIjoiL3JheSIsInRscyI6InRscyIsInNuaSI6InNnLmV4YW1wbGUuY29tIn0=";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn converter() -> Converter {
    Converter::new(
        &ConverterConfig::default(),
        Arc::new(FileTemplate::new(fixture("template_clash.yaml"))),
        Arc::new(FileTemplate::new(fixture("template_singbox.json"))),
    )
}

fn clash_doc(uri: &str) -> Value {
    let yaml = converter().convert(uri, "clash").unwrap();
    serde_yml::from_str(&yaml).unwrap()
}

fn singbox_doc(uri: &str) -> Value {
    let text = converter().convert(uri, "singbox").unwrap();
    serde_json::from_str(&text).unwrap()
}

fn group<'a>(doc: &'a Value, list: &str, key: &str, name: &str) -> &'a Value {
    doc[list]
        .as_array()
        .unwrap()
        .iter()
        .find(|g| g[key] == name)
        .unwrap()
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_unknown_scheme_is_rejected() {
    let err = converter().convert("foo://bar", "clash").unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedScheme(ref s) if s == "foo"));
}

#[test]
fn test_unknown_format_is_rejected() {
    let err = converter().convert(VLESS_WS, "quantumult").unwrap_err();
    assert!(matches!(err, ConvertError::UnsupportedFormat(_)));
}

#[test]
fn test_missing_scheme_is_a_parse_error() {
    let err = converter().convert("example.com:443", "raw").unwrap_err();
    assert!(matches!(err, ConvertError::Parse(_)));
}

#[test]
fn test_missing_template_is_a_render_error() {
    let converter = Converter::new(
        &ConverterConfig::default(),
        Arc::new(FileTemplate::new("/nonexistent/clash.yaml")),
        Arc::new(FileTemplate::new("/nonexistent/singbox.json")),
    );
    let err = converter.convert(VLESS_WS, "clash").unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Render(RenderError::TemplateRead { .. })
    ));
    assert!(!err.is_client_error());
}

// ============================================================================
// VLESS end to end
// ============================================================================

#[test]
fn test_vless_raw() {
    let text = converter().convert(VLESS_WS, "raw").unwrap();
    assert!(text.starts_with("vless://host:443\n"));
    assert!(text.contains("\"proto\": \"vless\""));
    assert!(text.contains("\"server\": \"host\""));
    assert!(text.contains("\"port\": 443"));
}

#[test]
fn test_vless_clash() {
    let doc = clash_doc(VLESS_WS);

    let proxies = doc["proxies"].as_array().unwrap();
    assert_eq!(proxies.len(), 2);
    let node = group(&doc, "proxies", "name", "MyNode");
    assert_eq!(node["type"], "vmess");
    assert_eq!(node["server"], "host");
    assert_eq!(node["port"], 443);
    assert_eq!(node["tls"], true);
    assert_eq!(node["servername"], "example.com");
    assert_eq!(node["network"], "ws");
    assert_eq!(node["ws-opts"]["path"], "/ws");
    assert_eq!(node["ws-opts"]["headers"]["Host"], "cdn.example.com");

    assert_eq!(
        group(&doc, "proxy-groups", "name", "Internet")["proxies"],
        json!(["Best Latency 🚀", "DIRECT", "MyNode"])
    );
    assert_eq!(
        group(&doc, "proxy-groups", "name", "Best Latency 🚀")["proxies"],
        json!(["MyNode"])
    );
    // Region groups the node did not join still get a member
    assert_eq!(
        group(&doc, "proxy-groups", "name", "Latency ID")["proxies"],
        json!(["direct"])
    );
    assert_eq!(doc["rules"], json!(["GEOIP,LAN,DIRECT", "MATCH,Internet"]));
}

#[test]
fn test_vless_singbox() {
    let doc = singbox_doc(VLESS_WS);
    let node = group(&doc, "outbounds", "tag", "MyNode");
    assert_eq!(node["type"], "vless");
    assert_eq!(node["server_port"], 443);
    assert_eq!(node["tls"]["server_name"], "example.com");
    assert_eq!(node["transport"]["type"], "ws");
    assert_eq!(node["transport"]["path"], "/ws");
    assert_eq!(node["transport"]["headers"]["Host"], "cdn.example.com");
    assert_eq!(
        node["transport"]["early_data_header_name"],
        "Sec-WebSocket-Protocol"
    );

    assert_eq!(
        group(&doc, "outbounds", "tag", "Internet")["outbounds"],
        json!(["Best Latency 🚀", "direct", "MyNode"])
    );
    assert_eq!(doc["route"]["final"], "Internet");
}

#[test]
fn test_vless_v2ray() {
    let text = converter().convert(VLESS_WS, "v2ray").unwrap();
    let doc: Value = serde_json::from_str(&text).unwrap();
    let server = &doc["outbounds"][0]["settings"]["vnext"][0];
    assert_eq!(server["address"], "host");
    assert_eq!(server["port"], 443);
    assert_eq!(server["users"][0]["id"], "uuid");
}

#[test]
fn test_convert_is_idempotent() {
    let converter = converter();
    for format in ["clash", "singbox", "v2ray", "raw"] {
        let first = converter.convert(VLESS_WS, format).unwrap();
        let second = converter.convert(VLESS_WS, format).unwrap();
        assert_eq!(first, second, "{} output differs between calls", format);
    }
}

#[test]
fn test_template_is_not_mutated_between_calls() {
    let converter = converter();
    converter.convert(VLESS_WS, "clash").unwrap();
    let yaml = converter
        .convert("trojan://pw@example.com:443#Other", "clash")
        .unwrap();
    let doc: Value = serde_yml::from_str(&yaml).unwrap();
    let names: Vec<&str> = doc["proxies"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["direct", "Other"]);
}

#[test]
fn test_clash_group_members_resolve() {
    let doc = clash_doc(VLESS_WS);
    let groups = doc["proxy-groups"].as_array().unwrap();
    let mut known: Vec<&str> = ["DIRECT", "REJECT"].to_vec();
    let proxies = doc["proxies"].as_array().unwrap();
    known.extend(proxies.iter().filter_map(|p| p["name"].as_str()));
    known.extend(groups.iter().filter_map(|g| g["name"].as_str()));

    for g in groups {
        for member in g["proxies"].as_array().unwrap() {
            let member = member.as_str().unwrap();
            assert!(
                known.contains(&member),
                "group {} references undefined proxy {}",
                g["name"],
                member
            );
        }
    }
}

#[test]
fn test_concurrent_conversions() {
    let converter = Arc::new(converter());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let converter = Arc::clone(&converter);
            std::thread::spawn(move || {
                let uri = format!("trojan://pw@example.com:443#node-{}", i);
                converter.convert(&uri, "singbox").unwrap()
            })
        })
        .collect();
    for (i, handle) in handles.into_iter().enumerate() {
        let text = handle.join().unwrap();
        let doc: Value = serde_json::from_str(&text).unwrap();
        let tags: Vec<&str> = doc["outbounds"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|o| o["type"] == "trojan")
            .filter_map(|o| o["tag"].as_str())
            .collect();
        assert_eq!(tags, vec![format!("node-{}", i)]);
    }
}

// ============================================================================
// VMess
// ============================================================================

#[test]
fn test_vmess_port_string_or_number() {
    let converter = converter();
    let a = converter.parse(VMESS_STRING_PORT).unwrap();
    let b = converter.parse(VMESS_NUMBER_PORT).unwrap();
    assert_eq!(a.port, 443);
    assert_eq!(a, b);
}

#[test]
fn test_vmess_flag_joins_region_group() {
    let doc = clash_doc(VMESS_STRING_PORT);
    assert_eq!(
        group(&doc, "proxy-groups", "name", "Latency SG")["proxies"],
        json!(["🇸🇬 SG 01"])
    );
    assert_eq!(
        group(&doc, "proxy-groups", "name", "Latency ID")["proxies"],
        json!(["direct"])
    );
    let node = group(&doc, "proxies", "name", "🇸🇬 SG 01");
    assert_eq!(node["type"], "vmess");
    assert_eq!(node["cipher"], "auto");
    assert_eq!(node["ws-opts"]["path"], "/ray");
}

// ============================================================================
// Shadowsocks
// ============================================================================

#[test]
fn test_ss_encodings_parse_identically() {
    let converter = converter();
    let legacy = converter
        .parse("ss://YWVzLTI1Ni1nY206cGFzc3dvcmRAZXhhbXBsZS5jb206ODM4OA==#node")
        .unwrap();
    let encoded_userinfo = converter
        .parse("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@example.com:8388#node")
        .unwrap();
    let unpadded_userinfo = converter
        .parse("ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388#node")
        .unwrap();
    let plain = converter
        .parse("ss://aes-256-gcm:password@example.com:8388#node")
        .unwrap();

    assert_eq!(legacy, plain);
    assert_eq!(encoded_userinfo, plain);
    assert_eq!(unpadded_userinfo, plain);
    assert_eq!(plain.proto(), Protocol::Shadowsocks);
    assert_eq!(
        plain.auth(),
        &Auth::Shadowsocks {
            method: "aes-256-gcm".to_string(),
            password: "password".to_string()
        }
    );
}

#[test]
fn test_ss_v2ray_plugin_end_to_end() {
    let uri = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:443/?plugin=v2ray-plugin%3Bmux%3D0%3Bpath%3D%2Fws%3Bhost%3Dexample.com%3Btls#plugin";
    let converter = converter();

    let profile = converter.parse(uri).unwrap();
    let transport = profile.transport.as_ref().unwrap();
    assert_eq!(transport.kind, TransportKind::WebSocket);
    assert_eq!(transport.path.as_deref(), Some("/ws"));
    assert_eq!(transport.host.as_deref(), Some("example.com"));
    assert!(profile.tls.as_ref().unwrap().enabled);

    let doc = clash_doc(uri);
    let node = group(&doc, "proxies", "name", "plugin");
    assert_eq!(node["type"], "ss");
    assert_eq!(node["plugin"], "v2ray-plugin");
    assert_eq!(node["plugin-opts"]["path"], "/ws");
    assert_eq!(node["plugin-opts"]["tls"], true);
    assert_eq!(node["plugin-opts"]["mux"], false);

    let doc = singbox_doc(uri);
    let node = group(&doc, "outbounds", "tag", "plugin");
    assert_eq!(node["plugin_opts"], "mux=0;path=/ws;host=example.com;tls");
}

#[test]
fn test_ss_is_not_a_v2ray_protocol() {
    let err = converter()
        .convert("ss://aes-256-gcm:password@example.com:8388", "v2ray")
        .unwrap_err();
    assert!(matches!(
        err,
        ConvertError::Render(RenderError::UnsupportedProtocol { .. })
    ));
}

// ============================================================================
// WireGuard
// ============================================================================

#[test]
fn test_wireguard_clash_and_singbox() {
    let uri = "wg://cHJpdmF0ZQ%3D%3D@162.159.192.1:2408?publicKey=cHVibGlj&address=172.16.0.2/32,fd01::1/128&reserved=1,2,3&mtu=1280#WARP";

    let doc = clash_doc(uri);
    let node = group(&doc, "proxies", "name", "WARP");
    assert_eq!(node["type"], "wireguard");
    assert_eq!(node["private-key"], "cHJpdmF0ZQ==");
    assert_eq!(node["public-key"], "cHVibGlj");
    assert_eq!(node["ip"], "172.16.0.2");
    assert_eq!(node["reserved"], json!([1, 2, 3]));

    let doc = singbox_doc(uri);
    let node = group(&doc, "outbounds", "tag", "WARP");
    assert_eq!(node["type"], "wireguard");
    assert_eq!(node["peer_public_key"], "cHVibGlj");
    assert_eq!(
        node["local_address"],
        json!(["172.16.0.2/32", "fd01::1/128"])
    );
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_custom_group_rules() {
    let config = ConverterConfig::from_toml(
        r#"
[groups]
always = ["Proxy"]
regions = []
direct_fallback = "DIRECT"
"#,
    )
    .unwrap();
    let template = "proxies: []\nproxy-groups:\n  - name: Proxy\n    type: select\n  - name: Auto\n    type: url-test\n";
    let converter = Converter::new(
        &config,
        Arc::new(InlineTemplate::new(template, "inline")),
        Arc::new(InlineTemplate::new("{}", "inline")),
    );

    let yaml = converter
        .convert("trojan://pw@example.com:443#T", "clash")
        .unwrap();
    let doc: Value = serde_yml::from_str(&yaml).unwrap();
    assert_eq!(doc["proxy-groups"][0]["proxies"], json!(["T"]));
    assert_eq!(doc["proxy-groups"][1]["proxies"], json!(["DIRECT"]));

    let json = converter.convert("trojan://pw@example.com:443#T", "singbox").unwrap();
    let doc: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(doc["outbounds"][0]["tag"], "T");
}
