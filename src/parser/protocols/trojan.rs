//! Trojan protocol parser
//!
//! This module provides parsing for Trojan (trojan://) URIs.
//! Format: trojan://password@host:port?params#tag

use tracing::trace;

use crate::error::{ParseCause, ParseError};
use crate::parser::{Link, apply_query};
use crate::profile::{Auth, Profile};

use super::ProtocolParser;

const SCHEME: &str = "trojan";

// ============================================================================
// Trojan Parser
// ============================================================================

/// Parser for Trojan (trojan://) URIs
///
/// Trojan always runs over TLS, so the profile carries TLS settings whatever
/// the `security` parameter says.
pub struct TrojanParser;

impl ProtocolParser for TrojanParser {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn parse(&self, uri: &str) -> Result<Profile, ParseError> {
        trace!("Parsing Trojan URI");
        let link = Link::parse(uri).map_err(|e| ParseError::new(SCHEME, e))?;

        if link.userinfo.is_empty() {
            return Err(ParseError::new(SCHEME, ParseCause::Missing("password")));
        }

        let mut profile = Profile::new(
            Auth::Trojan {
                password: link.userinfo,
            },
            link.host,
            link.port,
        )
        .with_id(link.tag);
        apply_query(&mut profile, &link.params, true);
        Ok(profile)
    }
}
