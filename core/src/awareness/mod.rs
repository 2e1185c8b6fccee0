/// Awareness - Ephemeral cursor positions of other clients
///
/// Unlike operations, selections are never persisted or transformed on the
/// server:
/// - Each client announces its own caret offset tagged with its version
/// - A receiver only accepts announcements made at its own version
/// - Remote carets are moved locally by every operation applied afterwards
/// - A caret not re-announced within the timeout stops being shown
/// - Separate broadcast channel (doesn't mix with operations)
mod selections;

pub use selections::{RemoteSelection, RemoteSelections, SelectionUpdate};

use std::time::Duration;

/// Default time after which a remote selection is no longer current
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Heartbeat interval (re-announce our caret even if it didn't move)
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
