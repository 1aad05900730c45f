//! Base64 decoding utilities
//!
//! Share links carry Base64 in every shape seen in the wild: standard or
//! URL-safe alphabet, with padding, without padding, or over-padded after a
//! round of URL escaping. [`Base64Policy`] fixes the order in which alphabets
//! and padding repair are attempted.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::{DecodeError, Engine};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::ParseCause;

// ============================================================================
// Policy
// ============================================================================

/// Base64 alphabet variants
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Base64Alphabet {
    /// `+` and `/`
    Standard,
    /// `-` and `_`
    UrlSafe,
}

impl Base64Alphabet {
    fn decode(&self, input: &str) -> Result<Vec<u8>, DecodeError> {
        match self {
            Base64Alphabet::Standard => STANDARD.decode(input),
            Base64Alphabet::UrlSafe => URL_SAFE.decode(input),
        }
    }
}

/// When padding repair happens relative to the plain attempts
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaddingRepair {
    /// Repair before the first attempt
    First,
    /// Try the input as-is, repair only when every alphabet failed
    #[default]
    Fallback,
}

/// Ordered decoding strategy shared by every parser
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Base64Policy {
    pub alphabets: Vec<Base64Alphabet>,
    pub repair_padding: PaddingRepair,
}

impl Default for Base64Policy {
    fn default() -> Self {
        Self {
            alphabets: vec![Base64Alphabet::Standard, Base64Alphabet::UrlSafe],
            repair_padding: PaddingRepair::Fallback,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

impl Base64Policy {
    /// Decodes Base64 content following the policy
    ///
    /// Whitespace is removed first. The error of the last failed attempt is
    /// returned when nothing decodes.
    pub fn decode(&self, content: &str) -> Result<Vec<u8>, DecodeError> {
        let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
        trace!(
            "Attempting Base64 decode, cleaned length: {} bytes",
            cleaned.len()
        );

        let repaired = repair_base64_padding(&cleaned);
        let candidates: Vec<&str> = match self.repair_padding {
            PaddingRepair::First => vec![repaired.as_str()],
            PaddingRepair::Fallback if repaired == cleaned => vec![cleaned.as_str()],
            PaddingRepair::Fallback => vec![cleaned.as_str(), repaired.as_str()],
        };

        let mut last_err = DecodeError::InvalidLength(cleaned.len());
        for candidate in candidates {
            for alphabet in &self.alphabets {
                match alphabet.decode(candidate) {
                    Ok(decoded) => {
                        trace!(
                            "Decoded using {:?} Base64 (repaired: {})",
                            alphabet,
                            candidate != cleaned
                        );
                        return Ok(decoded);
                    }
                    Err(e) => last_err = e,
                }
            }
        }

        trace!("Base64 decode failed: {}", last_err);
        Err(last_err)
    }

    /// Decodes Base64 content that must be UTF-8 text
    pub fn decode_text(&self, content: &str) -> Result<String, ParseCause> {
        let bytes = self.decode(content)?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// Strips any trailing `=` and re-pads to a multiple of four
///
/// Handles both missing padding and the surplus `=` left behind when a
/// padded value was URL-escaped and unescaped again.
pub fn repair_base64_padding(s: &str) -> String {
    let mut result = s.trim_end_matches('=').to_string();
    while !result.len().is_multiple_of(4) {
        result.push('=');
    }
    result
}
