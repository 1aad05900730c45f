//! Plain-text inspection exporter
//!
//! Prints `proto://server:port` followed by a pretty JSON dump of the whole
//! profile. Port `0` is passed through so that lenient parses stay
//! inspectable.

use crate::error::RenderError;
use crate::export::Exporter;
use crate::profile::Profile;

const FORMAT: &str = "raw";

/// Exporter producing a human-readable dump of the profile
pub struct RawExporter;

impl RawExporter {
    /// `proto://server:port`, with IPv6 hosts in brackets
    pub fn summary_line(profile: &Profile) -> String {
        let host = if profile.server.contains(':') && !profile.server.starts_with('[') {
            format!("[{}]", profile.server)
        } else {
            profile.server.clone()
        };
        format!("{}://{}:{}", profile.proto(), host, profile.port)
    }
}

impl Exporter for RawExporter {
    fn name(&self) -> &str {
        FORMAT
    }

    fn file_extension(&self) -> &str {
        "txt"
    }

    fn render(&self, profile: &Profile) -> Result<String, RenderError> {
        let dump = serde_json::to_string_pretty(profile).map_err(|e| RenderError::Serialize {
            format: FORMAT,
            reason: e.to_string(),
        })?;
        Ok(format!("{}\n{}\n", Self::summary_line(profile), dump))
    }
}
