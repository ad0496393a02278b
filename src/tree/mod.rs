// Tree module - the discovered-resource hierarchy
//
// The tree mirrors what the agent has discovered so far:
// Root -> Interface -> Device -> Service -> Characteristic -> Value.
// Every node is identified by its path from the root. A node whose
// `children` is None has never been scanned; Some(empty) means the scan
// came back with nothing.

pub mod store;

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use store::{TreeSnapshot, TreeStore};

/// Kind-specific metadata, passed through untouched for rendering
pub type Attributes = BTreeMap<String, String>;

/// One variant per tree level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum NodeKind {
    Root,
    Interface,
    Device,
    Service,
    Characteristic,
    Value,
}

impl NodeKind {
    /// Kind of the node found at a given path depth (root is depth 0)
    pub fn at_depth(depth: usize) -> Option<Self> {
        match depth {
            0 => Some(Self::Root),
            1 => Some(Self::Interface),
            2 => Some(Self::Device),
            3 => Some(Self::Service),
            4 => Some(Self::Characteristic),
            5 => Some(Self::Value),
            _ => None,
        }
    }

    /// Kind of this node's children, None for the terminal leaf
    pub fn child_kind(self) -> Option<Self> {
        match self {
            Self::Root => Some(Self::Interface),
            Self::Interface => Some(Self::Device),
            Self::Device => Some(Self::Service),
            Self::Service => Some(Self::Characteristic),
            Self::Characteristic => Some(Self::Value),
            Self::Value => None,
        }
    }

    pub fn is_leaf(self) -> bool {
        self == Self::Value
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Interface => "interface",
            Self::Device => "device",
            Self::Service => "service",
            Self::Characteristic => "characteristic",
            Self::Value => "value",
        }
    }
}

/// Expand/collapse/scan state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ScanState {
    Collapsed,
    Expanded,
    Scanning,
}

/// Ordered identifier chain from the root to a node
///
/// The empty path is the root. Displayed and parsed as `/`-separated
/// segments (`hci0/84:2E:14:87:66:97`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(segments: Vec<String>) -> Self {
        Self(segments)
    }

    /// Parse a `/`-separated path; empty input (or "/") is the root
    pub fn parse(s: &str) -> Self {
        Self(
            s.split('/')
                .filter(|seg| !seg.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Kind of the node this path addresses
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::at_depth(self.depth())
    }

    /// None for the root
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn child(&self, id: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(id.to_string());
        Self(segments)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "/")
        } else {
            write!(f, "{}", self.0.join("/"))
        }
    }
}

impl<const N: usize> From<[&str; N]> for NodePath {
    fn from(segments: [&str; N]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// Protocol-neutral description of a discovered child, as fed to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildRecord {
    pub id: String,
    pub label: String,
    pub attributes: Attributes,
    /// None when the agent has not scanned below this child
    pub children: Option<Vec<ChildRecord>>,
}

impl ChildRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    #[cfg(test)]
    pub fn with_children(mut self, children: Vec<ChildRecord>) -> Self {
        self.children = Some(children);
        self
    }
}

/// A single entry in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub kind: NodeKind,
    pub path: NodePath,
    pub label: String,
    pub attributes: Attributes,
    pub scan_state: ScanState,
    pub children: Option<BTreeMap<String, Node>>,
}

impl Node {
    /// Build a node and its known descendants from a record
    ///
    /// Value leaves always carry an empty child map so they can be opened
    /// without a fetch.
    pub fn from_record(kind: NodeKind, path: NodePath, record: ChildRecord) -> SyncResult<Self> {
        let children = match (kind.child_kind(), record.children) {
            (None, _) => Some(BTreeMap::new()),
            (Some(_), None) => None,
            (Some(child_kind), Some(records)) => Some(build_children(child_kind, &path, records)?),
        };

        Ok(Self {
            kind,
            path,
            label: record.label,
            attributes: record.attributes,
            scan_state: ScanState::Collapsed,
            children,
        })
    }

    pub fn has_data(&self) -> bool {
        self.children.is_some()
    }

    pub fn find(&self, relative: &[String]) -> Option<&Node> {
        match relative.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.as_ref()?.get(head)?.find(rest),
        }
    }

    pub fn find_mut(&mut self, relative: &[String]) -> Option<&mut Node> {
        match relative.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.as_mut()?.get_mut(head)?.find_mut(rest),
        }
    }

    /// Depth-first visit of this node and every known descendant
    #[cfg(test)]
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node)) {
        visit(self);
        if let Some(children) = &self.children {
            for child in children.values() {
                child.walk(visit);
            }
        }
    }
}

/// Build a child map keyed by identifier, rejecting blank or duplicate ids
pub(crate) fn build_children(
    kind: NodeKind,
    parent: &NodePath,
    records: Vec<ChildRecord>,
) -> SyncResult<BTreeMap<String, Node>> {
    let mut children = BTreeMap::new();
    for record in records {
        if record.id.trim().is_empty() {
            return Err(SyncError::MalformedSnapshot(format!(
                "{} under '{}' has no identifier",
                kind.as_str(),
                parent
            )));
        }
        if children.contains_key(&record.id) {
            return Err(SyncError::MalformedSnapshot(format!(
                "duplicate {} '{}' under '{}'",
                kind.as_str(),
                record.id,
                parent
            )));
        }
        let id = record.id.clone();
        let node = Node::from_record(kind, parent.child(&id), record)?;
        children.insert(id, node);
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parse_and_display() {
        let path = NodePath::parse("hci0/84:2E:14:87:66:97");
        assert_eq!(path.depth(), 2);
        assert_eq!(path.kind(), Some(NodeKind::Device));
        assert_eq!(path.to_string(), "hci0/84:2E:14:87:66:97");

        assert!(NodePath::parse("").is_root());
        assert!(NodePath::parse("/").is_root());
        assert_eq!(NodePath::root().to_string(), "/");
        assert_eq!(path.parent(), Some(NodePath::from(["hci0"])));
        assert_eq!(NodePath::root().parent(), None);
    }

    #[test]
    fn test_kind_depth_table() {
        assert_eq!(NodeKind::at_depth(0), Some(NodeKind::Root));
        assert_eq!(NodeKind::at_depth(5), Some(NodeKind::Value));
        assert_eq!(NodeKind::at_depth(6), None);
        assert_eq!(NodeKind::Characteristic.child_kind(), Some(NodeKind::Value));
        assert_eq!(NodeKind::Value.child_kind(), None);
    }

    #[test]
    fn test_value_leaf_has_empty_children() {
        let node = Node::from_record(
            NodeKind::Value,
            NodePath::from(["hci0", "dev", "svc", "0002", "value"]),
            ChildRecord::new("value", "0x01"),
        )
        .unwrap();
        assert_eq!(node.children, Some(BTreeMap::new()));
    }

    #[test]
    fn test_absent_children_stay_absent() {
        let node = Node::from_record(
            NodeKind::Interface,
            NodePath::from(["hci0"]),
            ChildRecord::new("hci0", "hci0"),
        )
        .unwrap();
        assert!(node.children.is_none());
        assert_eq!(node.scan_state, ScanState::Collapsed);
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![ChildRecord::new("a", "A"), ChildRecord::new("a", "A again")];
        let err = build_children(NodeKind::Device, &NodePath::from(["hci0"]), records).unwrap_err();
        assert!(matches!(err, SyncError::MalformedSnapshot(_)));
    }

    #[test]
    fn test_find_descends_by_segment() {
        let root = Node::from_record(
            NodeKind::Root,
            NodePath::root(),
            ChildRecord::new("", "host").with_children(vec![ChildRecord::new("hci0", "hci0")
                .with_children(vec![ChildRecord::new("dev", "Heart Monitor")])]),
        )
        .unwrap();

        let dev = root.find(NodePath::from(["hci0", "dev"]).segments()).unwrap();
        assert_eq!(dev.label, "Heart Monitor");
        assert_eq!(dev.kind, NodeKind::Device);
        assert!(root.find(NodePath::from(["hci1"]).segments()).is_none());
    }
}
