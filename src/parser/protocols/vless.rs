//! VLESS protocol parser
//!
//! This module provides parsing for VLESS (vless://) URIs.
//! Format: vless://uuid@host:port?params#tag

use tracing::trace;

use crate::error::{ParseCause, ParseError};
use crate::parser::{Link, apply_query};
use crate::profile::{Auth, Profile};

use super::ProtocolParser;

const SCHEME: &str = "vless";

// ============================================================================
// VLESS Parser
// ============================================================================

/// Parser for VLESS (vless://) URIs
///
/// Format: vless://uuid@host:port?params#tag
pub struct VLessParser;

impl ProtocolParser for VLessParser {
    fn scheme(&self) -> &str {
        SCHEME
    }

    fn parse(&self, uri: &str) -> Result<Profile, ParseError> {
        trace!("Parsing VLESS URI");
        let link = Link::parse(uri).map_err(|e| ParseError::new(SCHEME, e))?;

        if link.userinfo.is_empty() {
            return Err(ParseError::new(SCHEME, ParseCause::Missing("uuid")));
        }

        let mut profile = Profile::new(
            Auth::VLess {
                uuid: link.userinfo,
            },
            link.host,
            link.port,
        )
        .with_id(link.tag);
        apply_query(&mut profile, &link.params, false);

        trace!(
            "VLESS config: server={}:{}, tls={}, transport={:?}",
            profile.server,
            profile.port,
            profile.tls.is_some(),
            profile.transport.as_ref().map(|t| t.kind)
        );
        Ok(profile)
    }
}
