//! Render projector
//!
//! Pure projection of a [`TreeSnapshot`] into the structure the presentation
//! layer draws. Children of a node are included only while it is Expanded,
//! in identifier order. Equal snapshots always project to equal trees, so a
//! view can diff cheaply.

use crate::tree::{Node, NodeKind, NodePath, ScanState, TreeSnapshot};
use serde::Serialize;
use std::fmt::Write;

/// One row of the render tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderNode {
    /// Markup-safe encoding of the path, stable across renders
    pub id: String,
    pub path: NodePath,
    pub kind: NodeKind,
    pub label: String,
    /// Secondary text (address, UUID, properties), if the kind has one
    pub detail: Option<String>,
    pub state: ScanState,
    /// False only when the node is known to have nothing below it
    pub has_children: bool,
    pub depth: usize,
    pub children: Vec<RenderNode>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderTree {
    pub root: Option<RenderNode>,
}

impl RenderTree {
    /// Visible nodes in display order (pre-order walk)
    pub fn rows(&self) -> Vec<&RenderNode> {
        fn push<'a>(node: &'a RenderNode, rows: &mut Vec<&'a RenderNode>) {
            rows.push(node);
            for child in &node.children {
                push(child, rows);
            }
        }

        let mut rows = Vec::new();
        if let Some(root) = &self.root {
            push(root, &mut rows);
        }
        rows
    }

    #[cfg(test)]
    pub fn find(&self, id: &str) -> Option<&RenderNode> {
        self.rows().into_iter().find(|node| node.id == id)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}

/// Project a snapshot into a render tree
pub fn project(snapshot: &TreeSnapshot) -> RenderTree {
    RenderTree {
        root: snapshot.root().map(project_node),
    }
}

fn project_node(node: &Node) -> RenderNode {
    let children = match (&node.children, node.scan_state) {
        (Some(children), ScanState::Expanded) => children.values().map(project_node).collect(),
        _ => Vec::new(),
    };

    let has_children = match &node.children {
        Some(children) => !children.is_empty(),
        None => !node.kind.is_leaf(),
    };

    RenderNode {
        id: encode_id(&node.path),
        path: node.path.clone(),
        kind: node.kind,
        label: node.label.clone(),
        detail: detail(node),
        state: node.scan_state,
        has_children,
        depth: node.path.depth(),
        children,
    }
}

fn detail(node: &Node) -> Option<String> {
    let attr = |key: &str| node.attributes.get(key).cloned();
    match node.kind {
        NodeKind::Root | NodeKind::Value => None,
        NodeKind::Interface => {
            let address = attr("Address")?;
            match attr("Running").as_deref() {
                Some("0") | Some("false") => Some(format!("{address} (down)")),
                _ => Some(address),
            }
        }
        NodeKind::Device => {
            let id = node.path.segments().last()?;
            (id != &node.label).then(|| id.clone())
        }
        NodeKind::Service => attr("UUID"),
        NodeKind::Characteristic => match (attr("Properties"), attr("UUID")) {
            (Some(props), Some(uuid)) => Some(format!("{props} {uuid}")),
            (props, uuid) => props.or(uuid),
        },
    }
}

/// Encode a path as an identifier safe for markup and callbacks
///
/// ASCII alphanumerics pass through; every other byte becomes `_XX`.
/// Segments are joined with `-`, so distinct paths never collide.
pub fn encode_id(path: &NodePath) -> String {
    let mut id = String::from("n");
    for segment in path.segments() {
        id.push('-');
        for byte in segment.bytes() {
            if byte.is_ascii_alphanumeric() {
                id.push(byte as char);
            } else {
                let _ = write!(id, "_{byte:02X}");
            }
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{ChildRecord, TreeStore};

    fn store() -> TreeStore {
        let mut store = TreeStore::new();
        store
            .apply_handshake(ChildRecord::new("", "blepi").with_children(vec![
                ChildRecord::new("hci1", "hci1")
                    .with_attribute("Address", "00:1A:7D:DA:71:13")
                    .with_attribute("Running", "0")
                    .with_children(vec![]),
                ChildRecord::new("hci0", "hci0")
                    .with_attribute("Address", "B8:27:EB:00:00:01")
                    .with_children(vec![
                        ChildRecord::new("84:2E:14:87:66:97", "Jovan Heart Monitor"),
                        ChildRecord::new("0A:00:00:00:00:01", "0A:00:00:00:00:01"),
                    ]),
            ]))
            .unwrap();
        store
    }

    #[test]
    fn test_encode_id_is_markup_safe() {
        assert_eq!(encode_id(&NodePath::root()), "n");
        assert_eq!(
            encode_id(&NodePath::from(["hci0", "84:2E"])),
            "n-hci0-84_3A2E"
        );
        // A dash inside a segment cannot be confused with a separator
        assert_ne!(
            encode_id(&NodePath::from(["a-b"])),
            encode_id(&NodePath::from(["a", "b"]))
        );
    }

    #[test]
    fn test_collapsed_children_are_hidden() {
        let tree = project(&store().snapshot());
        let rows = tree.rows();

        let labels: Vec<_> = rows.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["blepi", "hci0", "hci1"]);
        assert_eq!(rows[1].detail.as_deref(), Some("B8:27:EB:00:00:01"));
        assert_eq!(rows[2].detail.as_deref(), Some("00:1A:7D:DA:71:13 (down)"));
    }

    #[test]
    fn test_expanded_children_in_identifier_order() {
        let mut store = store();
        store.toggle(&NodePath::from(["hci0"])).unwrap();
        let tree = project(&store.snapshot());

        let hci0 = tree.find("n-hci0").unwrap();
        assert_eq!(hci0.state, ScanState::Expanded);
        let ids: Vec<_> = hci0.children.iter().map(|c| c.path.to_string()).collect();
        assert_eq!(ids, vec!["hci0/0A:00:00:00:00:01", "hci0/84:2E:14:87:66:97"]);
        assert_eq!(hci0.children[0].depth, 2);
        assert_eq!(hci0.children[0].detail, None);
        assert_eq!(
            hci0.children[1].detail.as_deref(),
            Some("84:2E:14:87:66:97")
        );
    }

    #[test]
    fn test_has_children_markers() {
        let tree = project(&store().snapshot());
        // hci1 was scanned with nothing found; hci0 has devices
        assert!(!tree.find("n-hci1").unwrap().has_children);
        assert!(tree.find("n-hci0").unwrap().has_children);
    }

    #[test]
    fn test_projection_is_deterministic() {
        let store = store();
        assert_eq!(project(&store.snapshot()), project(&store.snapshot()));
        assert!(project(&TreeStore::new().snapshot()).is_empty());
    }
}
