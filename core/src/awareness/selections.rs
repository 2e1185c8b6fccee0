/// Remote Selection Tracking
///
/// Tracks the caret offset of every other client editing the document.
/// Offsets are stored relative to the local content, so they move with
/// every operation applied locally after they were received.
use crate::ot::{transform_offset, Operation};
use crate::ClientID;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// Time tracking only available on non-WASM targets
#[cfg(not(target_arch = "wasm32"))]
use std::time::{Duration, Instant};

/// Caret announcement broadcast on the selection channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionUpdate {
    pub client_id: ClientID,

    /// Document version the offset refers to
    pub version: u64,

    pub offset: usize,
}

/// Last known caret of a remote client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSelection {
    pub client_id: ClientID,

    /// Offset into the local content
    pub offset: usize,

    /// Last announcement time (for staleness)
    /// Not available in WASM builds
    #[cfg(not(target_arch = "wasm32"))]
    #[serde(skip)]
    pub last_seen: Option<Instant>,
}

/// Selection manager tracking all remote carets
#[derive(Debug, Clone)]
pub struct RemoteSelections {
    client_id: ClientID,
    selections: HashMap<ClientID, RemoteSelection>,
}

impl RemoteSelections {
    pub fn new(client_id: ClientID) -> Self {
        Self {
            client_id,
            selections: HashMap::new(),
        }
    }

    /// Get the local client ID
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn get_selections(&self) -> &HashMap<ClientID, RemoteSelection> {
        &self.selections
    }

    pub fn get_selection(&self, client_id: &str) -> Option<&RemoteSelection> {
        self.selections.get(client_id)
    }

    /// Announcement of our own caret
    pub fn create_update(&self, version: u64, offset: usize) -> SelectionUpdate {
        SelectionUpdate {
            client_id: self.client_id.clone(),
            version,
            offset,
        }
    }

    /// Apply a remote announcement
    ///
    /// Accepted only when it was made at `local_version`; older and newer
    /// announcements are dropped. The offset refers to the server state at
    /// that version, so it is moved through our not-yet-acknowledged
    /// `pending` operations to land in the local content.
    ///
    /// Returns whether the announcement was accepted.
    pub fn apply_update(
        &mut self,
        update: SelectionUpdate,
        local_version: u64,
        pending: &[Operation],
    ) -> bool {
        if update.client_id == self.client_id || update.version != local_version {
            return false;
        }

        let offset = transform_offset(update.offset, pending);
        self.selections.insert(
            update.client_id.clone(),
            RemoteSelection {
                client_id: update.client_id,
                offset,
                #[cfg(not(target_arch = "wasm32"))]
                last_seen: Some(Instant::now()),
            },
        );
        true
    }

    /// Move every remote caret through operations applied locally
    pub fn transform(&mut self, ops: &[Operation]) {
        if ops.is_empty() {
            return;
        }
        for selection in self.selections.values_mut() {
            selection.offset = transform_offset(selection.offset, ops);
        }
    }

    /// Forget a client (it left the document)
    pub fn remove(&mut self, client_id: &str) -> Option<RemoteSelection> {
        self.selections.remove(client_id)
    }

    /// Selections announced within `timeout`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn current(&self, timeout: Duration) -> Vec<&RemoteSelection> {
        let now = Instant::now();
        self.selections
            .values()
            .filter(|selection| {
                selection
                    .last_seen
                    .map(|seen| now.duration_since(seen) < timeout)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Selections announced within the timeout
    /// WASM version: every known selection, since time tracking is not available
    #[cfg(target_arch = "wasm32")]
    pub fn current(&self, _timeout_ms: u64) -> Vec<&RemoteSelection> {
        self.selections.values().collect()
    }

    /// Remove clients that haven't announced within timeout
    /// Returns list of removed client IDs
    #[cfg(not(target_arch = "wasm32"))]
    pub fn remove_stale_clients(&mut self, timeout: Duration) -> Vec<ClientID> {
        let now = Instant::now();
        let mut removed = Vec::new();

        self.selections.retain(|client_id, selection| {
            if let Some(last_seen) = selection.last_seen {
                if now.duration_since(last_seen) > timeout {
                    removed.push(client_id.clone());
                    return false;
                }
            }
            true
        });

        removed
    }

    /// Number of remote clients with a known caret
    pub fn client_count(&self) -> usize {
        self.selections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(client_id: &str, version: u64, offset: usize) -> SelectionUpdate {
        SelectionUpdate {
            client_id: client_id.to_string(),
            version,
            offset,
        }
    }

    #[test]
    fn test_create_update() {
        let selections = RemoteSelections::new("client-1".to_string());
        assert_eq!(selections.create_update(3, 7), update("client-1", 3, 7));
    }

    #[test]
    fn test_apply_matching_version() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        assert!(selections.apply_update(update("client-2", 5, 2), 5, &[]));
        assert_eq!(selections.get_selection("client-2").unwrap().offset, 2);
        assert_eq!(selections.client_count(), 1);
    }

    #[test]
    fn test_stale_and_ahead_versions_dropped() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        assert!(!selections.apply_update(update("client-2", 4, 2), 5, &[]));
        assert!(!selections.apply_update(update("client-2", 6, 2), 5, &[]));
        assert!(selections.get_selections().is_empty());
    }

    #[test]
    fn test_own_update_ignored() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        assert!(!selections.apply_update(update("client-1", 0, 2), 0, &[]));
    }

    #[test]
    fn test_offset_moved_through_pending() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        let pending = [Operation::insert(0, "abc")];
        selections.apply_update(update("client-2", 0, 1), 0, &pending);
        assert_eq!(selections.get_selection("client-2").unwrap().offset, 4);
    }

    #[test]
    fn test_transform_existing_selections() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        selections.apply_update(update("client-2", 0, 4), 0, &[]);
        selections.apply_update(update("client-3", 0, 1), 0, &[]);

        selections.transform(&[Operation::remove(1, "ab")]);
        assert_eq!(selections.get_selection("client-2").unwrap().offset, 2);
        assert_eq!(selections.get_selection("client-3").unwrap().offset, 1);
    }

    #[test]
    fn test_current_and_stale() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        selections.apply_update(update("client-2", 0, 0), 0, &[]);

        assert_eq!(selections.current(Duration::from_secs(15)).len(), 1);
        assert!(selections.current(Duration::ZERO).is_empty());

        assert!(selections.remove_stale_clients(Duration::from_secs(15)).is_empty());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(
            selections.remove_stale_clients(Duration::from_millis(1)),
            vec!["client-2".to_string()]
        );
        assert_eq!(selections.client_count(), 0);
    }

    #[test]
    fn test_remove_client() {
        let mut selections = RemoteSelections::new("client-1".to_string());
        selections.apply_update(update("client-2", 0, 0), 0, &[]);
        assert!(selections.remove("client-2").is_some());
        assert!(selections.remove("client-2").is_none());
    }
}
