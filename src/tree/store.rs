//! Tree store - exclusive owner of the discovery tree
//!
//! All mutation goes through this type. Readers only ever get a
//! [`TreeSnapshot`], a deep copy, so a render never observes a half-applied
//! change.

use super::{build_children, ChildRecord, Node, NodeKind, NodePath, ScanState};
use crate::error::{SyncError, SyncResult};

/// Outcome of a toggle, telling the caller whether a fetch is needed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Node moved to Scanning; the caller must dispatch a request
    Fetch,
    /// Node opened on cached children
    Opened,
    /// Node closed; children kept in memory
    Closed,
    /// Node is already Scanning; nothing changed
    Pending,
}

/// Immutable deep copy of the tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    root: Option<Node>,
}

impl TreeSnapshot {
    pub fn root(&self) -> Option<&Node> {
        self.root.as_ref()
    }
}

#[derive(Debug, Default)]
pub struct TreeStore {
    root: Option<Node>,
}

impl TreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a handshake has been applied
    pub fn is_loaded(&self) -> bool {
        self.root.is_some()
    }

    /// Replace the whole tree from the agent's full state
    ///
    /// On failure the previous tree is discarded as well: a session never
    /// shows a partial tree.
    pub fn apply_handshake(&mut self, root: ChildRecord) -> SyncResult<()> {
        self.root = None;

        let Some(records) = root.children else {
            return Err(SyncError::MalformedSnapshot(
                "full state carries no interface map".to_string(),
            ));
        };
        let children = build_children(NodeKind::Interface, &NodePath::root(), records)?;

        self.root = Some(Node {
            kind: NodeKind::Root,
            path: NodePath::root(),
            label: root.label,
            attributes: root.attributes,
            scan_state: ScanState::Expanded,
            children: Some(children),
        });
        Ok(())
    }

    pub fn get(&self, path: &NodePath) -> Option<&Node> {
        self.root.as_ref()?.find(path.segments())
    }

    fn get_mut(&mut self, path: &NodePath) -> SyncResult<&mut Node> {
        self.root
            .as_mut()
            .and_then(|root| root.find_mut(path.segments()))
            .ok_or_else(|| SyncError::UnknownPath(path.clone()))
    }

    /// Apply the user's open/close toggle
    ///
    /// The node is set to Scanning before returning `Fetch`, so a second
    /// toggle while the request is in flight is a no-op.
    pub fn toggle(&mut self, path: &NodePath) -> SyncResult<Transition> {
        let node = self.get_mut(path)?;

        let transition = match node.scan_state {
            ScanState::Scanning => Transition::Pending,
            ScanState::Expanded => {
                node.scan_state = ScanState::Collapsed;
                Transition::Closed
            }
            ScanState::Collapsed if node.has_data() => {
                node.scan_state = ScanState::Expanded;
                Transition::Opened
            }
            ScanState::Collapsed => {
                node.scan_state = ScanState::Scanning;
                Transition::Fetch
            }
        };
        Ok(transition)
    }

    /// Force a node into Scanning for an explicit re-scan, whatever its state
    pub fn begin_scan(&mut self, path: &NodePath) -> SyncResult<()> {
        let node = self.get_mut(path)?;
        if node.kind.is_leaf() {
            return Err(SyncError::NotScannable(path.clone()));
        }
        if node.scan_state == ScanState::Scanning {
            return Err(SyncError::AlreadyPending(path.clone()));
        }
        node.scan_state = ScanState::Scanning;
        Ok(())
    }

    /// Undo a Scanning state after a timeout, remote error or send failure
    ///
    /// Returns false when the node was not Scanning (nothing to undo).
    pub fn revert_scan(&mut self, path: &NodePath) -> SyncResult<bool> {
        let node = self.get_mut(path)?;
        if node.scan_state != ScanState::Scanning {
            return Ok(false);
        }
        node.scan_state = ScanState::Collapsed;
        Ok(true)
    }

    /// Replace the children of `path` with a scan result and expand it
    ///
    /// The result is authoritative for that level. Children that reappear
    /// keep their own scan state (downgraded to Collapsed if the new record
    /// brings no data for them); grandchildren come only from the new records.
    pub fn merge_scan_result(
        &mut self,
        path: &NodePath,
        records: Vec<ChildRecord>,
    ) -> SyncResult<()> {
        let kind = self
            .get(path)
            .map(|node| node.kind)
            .ok_or_else(|| SyncError::UnknownPath(path.clone()))?;
        let child_kind = kind
            .child_kind()
            .ok_or_else(|| SyncError::NotScannable(path.clone()))?;

        // Build first so a malformed result leaves the tree untouched
        let mut fresh = build_children(child_kind, path, records)?;

        let node = self.get_mut(path)?;
        if let Some(previous) = &node.children {
            for (id, child) in fresh.iter_mut() {
                let Some(prev) = previous.get(id) else {
                    continue;
                };
                child.scan_state = match prev.scan_state {
                    ScanState::Scanning => ScanState::Scanning,
                    ScanState::Expanded if child.has_data() => ScanState::Expanded,
                    _ => ScanState::Collapsed,
                };
            }
        }

        node.children = Some(fresh);
        node.scan_state = ScanState::Expanded;
        Ok(())
    }

    /// Paths of every node currently in Scanning
    #[cfg(test)]
    pub fn scanning_paths(&self) -> Vec<NodePath> {
        let mut paths = Vec::new();
        if let Some(root) = &self.root {
            root.walk(&mut |node| {
                if node.scan_state == ScanState::Scanning {
                    paths.push(node.path.clone());
                }
            });
        }
        paths
    }

    pub fn is_scanning(&self, path: &NodePath) -> bool {
        self.get(path)
            .is_some_and(|node| node.scan_state == ScanState::Scanning)
    }

    pub fn snapshot(&self) -> TreeSnapshot {
        TreeSnapshot {
            root: self.root.clone(),
        }
    }

    /// Drop the whole tree (channel reset)
    pub fn clear(&mut self) {
        self.root = None;
    }
}
