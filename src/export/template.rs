//! Template documents and node injection
//!
//! Clash and sing-box output is produced by injecting one rendered node into
//! a user-supplied configuration skeleton. The skeleton is fetched from a
//! [`TemplateSource`] on every call and parsed into an owned tree, so no
//! state is shared between conversions.
//!
//! Group membership is decided by [`GroupRules`]: a fixed set of groups
//! always receives the node, and region groups are picked from the flag
//! emoji in the node's name.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::RenderError;

// ============================================================================
// Template Sources
// ============================================================================

/// Supplies template text, fresh on every call
pub trait TemplateSource: Send + Sync + fmt::Debug {
    /// Human-readable location used in error messages
    fn origin(&self) -> String;

    /// Returns the current template text
    fn load(&self) -> std::io::Result<String>;
}

/// Template read from disk on every call
#[derive(Debug, Clone)]
pub struct FileTemplate {
    path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TemplateSource for FileTemplate {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> std::io::Result<String> {
        trace!("Reading template from {}", self.path.display());
        std::fs::read_to_string(&self.path)
    }
}

/// Template held in memory (e.g. fetched once at startup)
#[derive(Debug, Clone)]
pub struct InlineTemplate {
    text: Arc<str>,
    origin: String,
}

impl InlineTemplate {
    pub fn new(text: impl Into<Arc<str>>, origin: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: origin.into(),
        }
    }
}

impl TemplateSource for InlineTemplate {
    fn origin(&self) -> String {
        self.origin.clone()
    }

    fn load(&self) -> std::io::Result<String> {
        Ok(self.text.to_string())
    }
}

// ============================================================================
// Group Rules
// ============================================================================

/// Maps a flag emoji's country code to a group name
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RegionRule {
    /// ISO 3166-1 alpha-2 code, e.g. `ID`
    pub country: String,
    pub group: String,
}

impl RegionRule {
    pub fn new(country: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            country: country.into(),
            group: group.into(),
        }
    }
}

/// Which groups a node joins
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct GroupRules {
    /// Groups every node joins
    pub always: Vec<String>,
    /// Groups joined when the node name carries the matching flag
    pub regions: Vec<RegionRule>,
    /// Member given to latency groups that would otherwise stay empty
    pub direct_fallback: String,
}

impl Default for GroupRules {
    fn default() -> Self {
        Self {
            always: vec!["Internet".to_string(), "Best Latency 🚀".to_string()],
            regions: vec![
                RegionRule::new("ID", "Latency ID"),
                RegionRule::new("SG", "Latency SG"),
            ],
            direct_fallback: "direct".to_string(),
        }
    }
}

impl GroupRules {
    /// Names of the groups a node called `node_name` joins, in rule order
    pub fn target_groups(&self, node_name: &str) -> Vec<&str> {
        let countries = extract_country_codes(node_name);
        let mut groups: Vec<&str> = self.always.iter().map(String::as_str).collect();
        for rule in &self.regions {
            if countries
                .iter()
                .any(|c| c.eq_ignore_ascii_case(&rule.country))
                && !groups.contains(&rule.group.as_str())
            {
                groups.push(&rule.group);
            }
        }
        groups
    }
}

/// Extracts every country code spelled by flag emoji in `text`
///
/// Flag emojis are pairs of Regional Indicator Symbols
/// (U+1F1E6 for A through U+1F1FF for Z), e.g. 🇸🇬 = 🇸 + 🇬.
pub fn extract_country_codes(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut codes = Vec::new();

    let mut i = 0;
    while i + 1 < chars.len() {
        if let (Some(a), Some(b)) = (
            regional_indicator_to_letter(chars[i]),
            regional_indicator_to_letter(chars[i + 1]),
        ) {
            codes.push(format!("{}{}", a, b));
            i += 2;
        } else {
            i += 1;
        }
    }
    codes
}

/// Convert a Regional Indicator Symbol to its corresponding letter (A-Z).
fn regional_indicator_to_letter(c: char) -> Option<char> {
    let code = c as u32;
    if (0x1F1E6..=0x1F1FF).contains(&code) {
        let letter_offset = (code - 0x1F1E6) as u8;
        Some((b'A' + letter_offset) as char)
    } else {
        None
    }
}

// ============================================================================
// Injection
// ============================================================================

/// Where a document format keeps its nodes and groups
#[derive(Debug, Clone, Copy)]
pub(crate) struct TemplateLayout {
    pub format: &'static str,
    /// Top-level list receiving the node
    pub nodes_key: &'static str,
    /// Top-level list holding the groups (may equal `nodes_key`)
    pub groups_key: &'static str,
    /// Group field holding its name
    pub group_name_key: &'static str,
    /// Group field listing member names
    pub group_members_key: &'static str,
    /// Group `type` of latency auto-selectors
    pub latency_group_type: &'static str,
}

/// Fetches the template text, mapping I/O failures to [`RenderError`]
pub(crate) fn load_template(
    source: &dyn TemplateSource,
    format: &'static str,
) -> Result<String, RenderError> {
    source.load().map_err(|e| RenderError::TemplateRead {
        format,
        origin: source.origin(),
        source: e,
    })
}

/// Injects `node` into the template tree
///
/// 1. every target group (see [`GroupRules::target_groups`]) gains
///    `node_name` as a member;
/// 2. latency groups left without members receive the fallback member;
/// 3. the node is appended to the node list, which is created when absent.
pub(crate) fn inject_node(
    tree: &mut Value,
    layout: &TemplateLayout,
    node: Value,
    node_name: &str,
    rules: &GroupRules,
) -> Result<(), RenderError> {
    if tree.is_null() {
        *tree = Value::Object(Map::new());
    }
    let root = tree
        .as_object_mut()
        .ok_or_else(|| RenderError::TemplateParse {
            format: layout.format,
            reason: "document root is not a mapping".to_string(),
        })?;

    // Node list shape is checked before any mutation
    match root.get(layout.nodes_key) {
        None | Some(Value::Null) | Some(Value::Array(_)) => {}
        Some(_) => {
            return Err(RenderError::TemplateShape {
                key: layout.nodes_key,
            });
        }
    }

    let targets = rules.target_groups(node_name);
    debug!(
        "Injecting node '{}' into {} template, target groups: {:?}",
        node_name, layout.format, targets
    );

    match root.get_mut(layout.groups_key) {
        None | Some(Value::Null) => {
            debug!("Template has no '{}' list", layout.groups_key);
        }
        Some(Value::Array(groups)) => {
            for group in groups.iter_mut().filter_map(Value::as_object_mut) {
                let is_target = group
                    .get(layout.group_name_key)
                    .and_then(Value::as_str)
                    .is_some_and(|name| targets.contains(&name));
                if is_target {
                    members_mut(group, layout)?.push(Value::String(node_name.to_string()));
                }
            }
            for group in groups.iter_mut().filter_map(Value::as_object_mut) {
                let is_latency = group
                    .get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t == layout.latency_group_type);
                if is_latency {
                    let members = members_mut(group, layout)?;
                    if members.is_empty() {
                        members.push(Value::String(rules.direct_fallback.clone()));
                    }
                }
            }
        }
        Some(_) => {
            return Err(RenderError::TemplateShape {
                key: layout.groups_key,
            });
        }
    }

    let nodes = root
        .entry(layout.nodes_key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if nodes.is_null() {
        *nodes = Value::Array(Vec::new());
    }
    match nodes {
        Value::Array(list) => list.push(node),
        _ => {
            return Err(RenderError::TemplateShape {
                key: layout.nodes_key,
            });
        }
    }
    Ok(())
}

/// A group's member list, created when missing
fn members_mut<'a>(
    group: &'a mut Map<String, Value>,
    layout: &TemplateLayout,
) -> Result<&'a mut Vec<Value>, RenderError> {
    let members = group
        .entry(layout.group_members_key)
        .or_insert_with(|| Value::Array(Vec::new()));
    if members.is_null() {
        *members = Value::Array(Vec::new());
    }
    members
        .as_array_mut()
        .ok_or(RenderError::TemplateShape {
            key: layout.group_members_key,
        })
}
