//! WireGuard protocol parser
//!
//! This module provides parsing for WireGuard (wg://) URIs.
//! Format: wg://private-key@host:port?publicKey=..&address=..&reserved=..&mtu=..#tag

use tracing::{trace, warn};

use crate::error::{ParseCause, ParseError};
use crate::parser::{Link, split_list};
use crate::profile::{Auth, Profile, WireGuardSettings};

use super::ProtocolParser;

const SCHEME: &str = "wg";

// ============================================================================
// WireGuard Parser
// ============================================================================

/// Parser for WireGuard (wg://) URIs
///
/// The userinfo is the interface private key. Known query keys fill the
/// WireGuard extension; every other key is kept verbatim.
pub struct WireGuardParser;

impl ProtocolParser for WireGuardParser {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn parse(&self, uri: &str) -> Result<Profile, ParseError> {
        trace!("Parsing WireGuard URI");
        let link = Link::parse(uri).map_err(|e| ParseError::new(SCHEME, e))?;

        if link.userinfo.is_empty() {
            return Err(ParseError::new(SCHEME, ParseCause::Missing("private key")));
        }

        let mut profile = Profile::new(
            Auth::WireGuard {
                private_key: link.userinfo,
            },
            link.host,
            link.port,
        )
        .with_id(link.tag);

        let mut wireguard = WireGuardSettings::default();
        // Sorted so leftover keys are visited deterministically
        let mut params: Vec<(String, String)> = link.params.into_iter().collect();
        params.sort();

        for (key, value) in params {
            let value = value.trim().to_string();
            match key.as_str() {
                "publicKey" | "publickey" | "peerPublicKey" => {
                    wireguard.public_key = Some(value).filter(|v| !v.is_empty());
                }
                "presharedKey" | "preSharedKey" | "psk" => {
                    wireguard.pre_shared_key = Some(value).filter(|v| !v.is_empty());
                }
                "address" | "ip" => wireguard.local_address.extend(split_list(&value)),
                "reserved" => wireguard.reserved = parse_reserved(&value),
                "mtu" => match value.parse::<u32>() {
                    Ok(mtu) => wireguard.mtu = Some(mtu),
                    Err(_) => {
                        warn!(mtu = value.as_str(), "Ignoring invalid WireGuard MTU");
                    }
                },
                _ => {
                    profile.extra.other.insert(key, value);
                }
            }
        }

        profile.extra.wireguard = Some(wireguard);
        Ok(profile)
    }
}

/// Parses `reserved` as a comma separated byte list (`1,2,3`)
///
/// Values that do not fit a byte are dropped with a warning.
fn parse_reserved(value: &str) -> Vec<u8> {
    split_list(value)
        .into_iter()
        .filter_map(|b| match b.parse::<u8>() {
            Ok(b) => Some(b),
            Err(_) => {
                warn!(reserved = b.as_str(), "Ignoring invalid WireGuard reserved byte");
                None
            }
        })
        .collect()
}
