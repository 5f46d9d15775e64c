//! # Farm Model
//!
//! The set of federation nodes sharing one configuration. Nodes are matched by
//! canonical identity, case-insensitively, and are only removed explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::LOCAL_NODE_ALIASES;
use crate::error::{FarmError, Result};

const MAX_NODE_NAME_LEN: usize = 255;

/// A validated node identity
///
/// Equality ignores ASCII case, matching how the platform resolves host names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeName(String);

impl NodeName {
    /// Validate and normalise user input
    pub fn parse(value: &str) -> Result<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(FarmError::invalid_node_name(value, "name is empty"));
        }
        if trimmed.len() > MAX_NODE_NAME_LEN {
            return Err(FarmError::invalid_node_name(
                value,
                format!("name exceeds {MAX_NODE_NAME_LEN} characters"),
            ));
        }
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || c.is_control())
        {
            return Err(FarmError::invalid_node_name(
                value,
                "name contains whitespace or control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// True for ".", "localhost" and "self"
    pub fn is_local_alias(&self) -> bool {
        LOCAL_NODE_ALIASES
            .iter()
            .any(|alias| self.0.eq_ignore_ascii_case(alias))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl PartialEq for NodeName {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for NodeName {}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Platform and version descriptors of a node's host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HostDescriptor {
    pub product_name: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub build: u32,
    pub installation_type: String,
}

/// One federation server registered in the farm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmNode {
    /// Fully-qualified canonical name
    pub fqdn: String,
    pub behavior_level: i32,
    /// Role label reported by the platform, e.g. "PrimaryComputer"
    pub node_type: String,
    pub heartbeat: DateTime<Utc>,
    pub host: HostDescriptor,
}

/// Farm-level metadata plus its nodes, in registration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Farm {
    pub is_initialized: bool,
    pub farm_identifier: String,
    pub current_farm_behavior: i32,
    #[serde(default)]
    pub nodes: Vec<FarmNode>,
}

impl Farm {
    pub fn find_node(&self, fqdn: &str) -> Option<&FarmNode> {
        self.nodes.iter().find(|n| n.fqdn.eq_ignore_ascii_case(fqdn))
    }

    /// Replace the entry with the same identity in place, or append
    pub fn upsert_node(&mut self, node: FarmNode) -> &FarmNode {
        let position = self
            .nodes
            .iter()
            .position(|n| n.fqdn.eq_ignore_ascii_case(&node.fqdn));

        let index = match position {
            Some(index) => {
                self.nodes[index] = node;
                // Later duplicates from hand-edited stores collapse into the first entry
                let fqdn = self.nodes[index].fqdn.clone();
                let mut seen = false;
                self.nodes.retain(|n| {
                    if !n.fqdn.eq_ignore_ascii_case(&fqdn) {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        &self.nodes[index]
    }

    /// Remove every entry with this identity, returns how many were removed
    pub fn remove_node(&mut self, fqdn: &str) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| !n.fqdn.eq_ignore_ascii_case(fqdn));
        before - self.nodes.len()
    }
}
