// Scan coordinator - correlates outbound scans with inbound replies
//
// Every outstanding request is keyed by the path of the node it scans. The
// agent does not echo a request id, so replies are matched by rebuilding the
// path from their own addressing fields. Each entry carries a deadline;
// expired entries are handed back so the caller can collapse the node again.

use crate::error::{SyncError, SyncResult};
use crate::protocol::{Operation, Request, Response};
use crate::tree::{NodeKind, NodePath};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Deadline applied when neither config nor agent supplies one
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote operation that lists the children of a node of this kind
pub fn scan_operation(kind: NodeKind) -> Option<Operation> {
    match kind {
        NodeKind::Root => Some(Operation::ScanInterfaces),
        NodeKind::Interface => Some(Operation::ScanDevices),
        NodeKind::Device => Some(Operation::ScanServices),
        NodeKind::Service => Some(Operation::ScanCharacteristics),
        NodeKind::Characteristic => Some(Operation::ReadValue),
        NodeKind::Value => None,
    }
}

#[derive(Debug, Clone)]
struct PendingScan {
    op: Operation,
    issued_at: Instant,
    deadline: Instant,
}

/// Pending-request table: at most one entry per path
#[derive(Debug)]
pub struct ScanCoordinator {
    pending: HashMap<NodePath, PendingScan>,
    timeout: Duration,
}

impl Default for ScanCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_TIMEOUT)
    }
}

impl ScanCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies to requests issued from now on
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Register a scan of `path` and build the request for it
    pub fn request_children(&mut self, path: &NodePath, now: Instant) -> SyncResult<Request> {
        let op = path
            .kind()
            .and_then(scan_operation)
            .ok_or_else(|| SyncError::NotScannable(path.clone()))?;

        if self.pending.contains_key(path) {
            return Err(SyncError::AlreadyPending(path.clone()));
        }

        self.pending.insert(
            path.clone(),
            PendingScan {
                op,
                issued_at: now,
                deadline: now + self.timeout,
            },
        );
        tracing::trace!(
            "registered {} for '{}' ({} pending)",
            op.as_str(),
            path,
            self.pending.len()
        );

        Ok(Request::new(op, path))
    }

    /// Match a reply to its pending entry and clear it
    ///
    /// Returns the path the reply answers, or None for a stale or
    /// unsolicited reply (nothing is cleared in that case). Only error
    /// replies, which may carry no addressing at all, fall back to the
    /// single pending request of the same operation.
    pub fn resolve(&mut self, response: &Response) -> Option<NodePath> {
        let path = match response.addressed_path() {
            Some(path) => path,
            None if response.remote_error().is_some() => self.sole_pending(response.op)?,
            None => return None,
        };

        match self.pending.get(&path) {
            Some(entry) if entry.op == response.op => {
                let entry = self.pending.remove(&path)?;
                tracing::debug!(
                    "{} for '{}' answered after {:?}",
                    response.op.as_str(),
                    path,
                    entry.issued_at.elapsed()
                );
                Some(path)
            }
            _ => None,
        }
    }

    /// The only pending path for `op`, when exactly one exists
    fn sole_pending(&self, op: Operation) -> Option<NodePath> {
        let mut matching = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.op == op)
            .map(|(path, _)| path);
        let first = matching.next()?;
        match matching.next() {
            None => Some(first.clone()),
            Some(_) => None,
        }
    }

    /// Remove and return every entry whose deadline has passed
    pub fn expire(&mut self, now: Instant) -> Vec<NodePath> {
        let mut expired: Vec<NodePath> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(path, _)| path.clone())
            .collect();
        expired.sort();

        for path in &expired {
            self.pending.remove(path);
        }
        expired
    }

    /// Drop a single entry (e.g. the send failed)
    pub fn cancel(&mut self, path: &NodePath) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Keep only entries for which `keep` returns true; returns the dropped paths
    pub fn retain(&mut self, mut keep: impl FnMut(&NodePath) -> bool) -> Vec<NodePath> {
        let mut dropped = Vec::new();
        self.pending.retain(|path, _| {
            let kept = keep(path);
            if !kept {
                dropped.push(path.clone());
            }
            kept
        });
        dropped
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    #[cfg(test)]
    pub fn is_pending(&self, path: &NodePath) -> bool {
        self.pending.contains_key(path)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pending paths in sorted order
    pub fn pending_paths(&self) -> Vec<NodePath> {
        let mut paths: Vec<NodePath> = self.pending.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn iface() -> NodePath {
        NodePath::from(["hci0"])
    }

    #[test]
    fn test_operation_table_covers_every_level() {
        assert_eq!(scan_operation(NodeKind::Root), Some(Operation::ScanInterfaces));
        assert_eq!(
            scan_operation(NodeKind::Service),
            Some(Operation::ScanCharacteristics)
        );
        assert_eq!(
            scan_operation(NodeKind::Characteristic),
            Some(Operation::ReadValue)
        );
        assert_eq!(scan_operation(NodeKind::Value), None);
    }

    #[test]
    fn test_request_children_builds_positional_args() {
        let mut scans = ScanCoordinator::default();
        let path = NodePath::from(["hci0", "AA:BB", "1800"]);
        let request = scans.request_children(&path, Instant::now()).unwrap();

        assert_eq!(request.op, Operation::ScanCharacteristics);
        assert_eq!(request.args(), vec!["hci0", "AA:BB", "1800"]);
        assert!(scans.is_pending(&path));
    }

    #[test]
    fn test_duplicate_request_rejected() {
        let mut scans = ScanCoordinator::default();
        let now = Instant::now();
        scans.request_children(&iface(), now).unwrap();

        assert_eq!(
            scans.request_children(&iface(), now).unwrap_err(),
            SyncError::AlreadyPending(iface())
        );
        assert_eq!(scans.len(), 1);
    }

    #[test]
    fn test_value_leaf_not_scannable() {
        let mut scans = ScanCoordinator::default();
        let leaf = NodePath::from(["hci0", "AA", "1800", "0002", "value"]);
        assert!(matches!(
            scans.request_children(&leaf, Instant::now()),
            Err(SyncError::NotScannable(_))
        ));
    }

    #[test]
    fn test_resolve_matches_addressed_reply() {
        let mut scans = ScanCoordinator::default();
        scans.request_children(&iface(), Instant::now()).unwrap();

        let reply = Response::ok(Operation::ScanDevices, json!({"IFace": "hci0", "Devs": {}}));
        assert_eq!(scans.resolve(&reply), Some(iface()));
        assert_eq!(scans.len(), 0);

        // Same reply again is now stale
        assert_eq!(scans.resolve(&reply), None);
    }

    #[test]
    fn test_resolve_rejects_unsolicited_and_mismatched() {
        let mut scans = ScanCoordinator::default();
        scans.request_children(&iface(), Instant::now()).unwrap();

        let other = Response::ok(Operation::ScanDevices, json!({"IFace": "hci1", "Devs": {}}));
        assert_eq!(scans.resolve(&other), None);

        let wrong_op = Response::ok(
            Operation::ScanServices,
            json!({"IFace": "hci0", "ID": "AA", "Services": {}}),
        );
        assert_eq!(scans.resolve(&wrong_op), None);
        assert!(scans.is_pending(&iface()));
    }

    #[test]
    fn test_unaddressed_error_resolves_to_sole_pending() {
        let mut scans = ScanCoordinator::default();
        let now = Instant::now();
        scans.request_children(&iface(), now).unwrap();

        let error = Response::failed(Operation::ScanDevices, "Interface down");
        assert_eq!(scans.resolve(&error), Some(iface()));

        // Ambiguous when two interfaces are being scanned
        scans.request_children(&NodePath::from(["hci0"]), now).unwrap();
        scans.request_children(&NodePath::from(["hci1"]), now).unwrap();
        assert_eq!(scans.resolve(&error), None);
        assert_eq!(scans.len(), 2);
    }

    #[test]
    fn test_unaddressed_success_is_never_guessed() {
        let mut scans = ScanCoordinator::default();
        scans.request_children(&iface(), Instant::now()).unwrap();

        let reply = Response::ok(Operation::ScanDevices, json!({"Devs": {}}));
        assert_eq!(scans.resolve(&reply), None);
        assert!(scans.is_pending(&iface()));
    }

    #[test]
    fn test_expire_after_deadline() {
        let mut scans = ScanCoordinator::new(Duration::from_secs(10));
        let start = Instant::now();
        scans.request_children(&iface(), start).unwrap();

        assert!(scans.expire(start + Duration::from_secs(9)).is_empty());
        assert_eq!(scans.expire(start + Duration::from_secs(10)), vec![iface()]);
        assert!(!scans.is_pending(&iface()));

        // The path can be requested again
        assert!(scans.request_children(&iface(), start).is_ok());
    }

    #[test]
    fn test_retain_reports_dropped() {
        let mut scans = ScanCoordinator::default();
        let now = Instant::now();
        scans.request_children(&NodePath::from(["hci0", "AA"]), now).unwrap();
        scans.request_children(&NodePath::from(["hci1"]), now).unwrap();

        let dropped = scans.retain(|path| path.segments()[0] != "hci0");
        assert_eq!(dropped, vec![NodePath::from(["hci0", "AA"])]);
        assert_eq!(scans.pending_paths(), vec![NodePath::from(["hci1"])]);
    }
}
