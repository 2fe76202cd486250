//! Core entity types for the knowledge graph.
//!
//! Nodes are identified structurally by [`NodeId`]: a module name, or a
//! function triple of module, name and arity. The derived `Ord` on `NodeId`
//! is the canonical tie-break order used by every ranking in the crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Identity of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    Module(String),
    Function {
        module: String,
        name: String,
        arity: u8,
    },
}

impl NodeId {
    pub fn module(name: impl Into<String>) -> Self {
        Self::Module(name.into())
    }

    pub fn function(module: impl Into<String>, name: impl Into<String>, arity: u8) -> Self {
        Self::Function {
            module: module.into(),
            name: name.into(),
            arity,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Module(_) => NodeKind::Module,
            Self::Function { .. } => NodeKind::Function,
        }
    }

    /// Name of the module that owns this node (the module itself for module nodes).
    pub fn module_name(&self) -> &str {
        match self {
            Self::Module(name) => name,
            Self::Function { module, .. } => module,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(name) => write!(f, "{name}"),
            Self::Function {
                module,
                name,
                arity,
            } => write!(f, "{module}.{name}/{arity}"),
        }
    }
}

/// Error returned when a node id string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid node id '{input}': {reason}")]
pub struct ParseNodeIdError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    /// Parses `Module` or `Module.function/arity`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let err = |reason| ParseNodeIdError {
            input: s.to_string(),
            reason,
        };

        if input.is_empty() {
            return Err(err("empty identifier"));
        }

        let Some((qualified, arity)) = input.rsplit_once('/') else {
            return Ok(Self::Module(input.to_string()));
        };

        let arity: u8 = arity.parse().map_err(|_| err("arity must be 0-255"))?;
        let (module, name) = qualified
            .rsplit_once('.')
            .ok_or_else(|| err("function ids need a module prefix"))?;

        if module.is_empty() || name.is_empty() {
            return Err(err("module and function name must be non-empty"));
        }

        Ok(Self::function(module, name, arity))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Module,
    Function,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Module => "module",
            Self::Function => "function",
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "module" => Ok(Self::Module),
            "function" => Ok(Self::Function),
            other => Err(format!("unknown node kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Calls,
    Imports,
    Defines,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 3] = [EdgeKind::Calls, EdgeKind::Imports, EdgeKind::Defines];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::Imports => "imports",
            Self::Defines => "defines",
        }
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "calls" => Ok(Self::Calls),
            "imports" => Ok(Self::Imports),
            "defines" => Ok(Self::Defines),
            other => Err(format!("unknown edge kind '{other}'")),
        }
    }
}

/// A module or function entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Docstring or snippet used as embedding input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Self {
            id,
            visibility: Visibility::Public,
            file: None,
            line: None,
            text: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self::new(NodeId::module(name))
    }

    pub fn function(module: impl Into<String>, name: impl Into<String>, arity: u8) -> Self {
        Self::new(NodeId::function(module, name, arity))
    }

    pub fn kind(&self) -> NodeKind {
        self.id.kind()
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_in_file(&self, path: &Path) -> bool {
        self.file.as_deref() == Some(path)
    }
}

/// Identity of an edge: at most one edge per `(from, to, kind)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

/// A directed, typed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        Self {
            from,
            to,
            kind,
            weight: default_weight(),
        }
    }

    pub fn calls(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, EdgeKind::Calls)
    }

    pub fn imports(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, EdgeKind::Imports)
    }

    pub fn defines(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, EdgeKind::Defines)
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            from: self.from.clone(),
            to: self.to.clone(),
            kind: self.kind,
        }
    }
}

/// Facts produced by an analyzer for one source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileFacts {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FileFacts {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter().map(|node| &node.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_parse() {
        let module = NodeId::module("MyApp.Billing");
        assert_eq!(module.to_string(), "MyApp.Billing");
        assert_eq!("MyApp.Billing".parse::<NodeId>().unwrap(), module);

        let function = NodeId::function("MyApp.Billing", "charge", 2);
        assert_eq!(function.to_string(), "MyApp.Billing.charge/2");
        assert_eq!(
            "MyApp.Billing.charge/2".parse::<NodeId>().unwrap(),
            function
        );
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("".parse::<NodeId>().is_err());
        assert!("charge/2".parse::<NodeId>().is_err());
        assert!("Billing.charge/x".parse::<NodeId>().is_err());
        assert!("Billing.charge/300".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_ordering_is_structural() {
        let mut ids = vec![
            NodeId::function("B", "run", 0),
            NodeId::module("B"),
            NodeId::function("A", "run", 1),
            NodeId::module("A"),
            NodeId::function("A", "run", 0),
        ];
        ids.sort();

        assert_eq!(
            ids,
            vec![
                NodeId::module("A"),
                NodeId::module("B"),
                NodeId::function("A", "run", 0),
                NodeId::function("A", "run", 1),
                NodeId::function("B", "run", 0),
            ]
        );
    }

    #[test]
    fn test_edge_key_ignores_weight() {
        let a = Edge::calls(NodeId::module("A"), NodeId::module("B")).with_weight(3.0);
        let b = Edge::calls(NodeId::module("A"), NodeId::module("B"));
        assert_eq!(a.key(), b.key());

        let c = Edge::imports(NodeId::module("A"), NodeId::module("B"));
        assert_ne!(a.key(), c.key());
    }

    #[test]
    fn test_facts_deserialize_with_defaults() {
        let json = r#"{
            "nodes": [{"id": {"Function": {"module": "A", "name": "f", "arity": 1}}}],
            "edges": [{"from": {"Module": "A"}, "to": {"Module": "B"}, "kind": "imports"}]
        }"#;
        let facts: FileFacts = serde_json::from_str(json).unwrap();

        assert_eq!(facts.nodes[0].visibility, Visibility::Public);
        assert_eq!(facts.nodes[0].kind(), NodeKind::Function);
        assert_eq!(facts.edges[0].weight, 1.0);
        assert_eq!(facts.edges[0].kind, EdgeKind::Imports);
    }
}
