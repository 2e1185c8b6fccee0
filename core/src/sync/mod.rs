//! Client synchronization
//!
//! - `client`: the sans-IO state machine (`ClientDocument`)
//! - `config`: timing knobs
//! - `channel` / `session` (feature `session`): async transport trait, an
//!   in-memory hub, and the tokio actor tying them together

pub mod client;
pub mod config;

#[cfg(all(feature = "session", not(target_arch = "wasm32")))]
pub mod channel;
#[cfg(all(feature = "session", not(target_arch = "wasm32")))]
pub mod session;

pub use client::{ClientDocument, Effect, Snapshot, SyncState};
pub use config::SyncConfig;

#[cfg(all(feature = "session", not(target_arch = "wasm32")))]
pub use channel::{Inbound, MemoryChannel, MemoryHub, OperationChannel};
#[cfg(all(feature = "session", not(target_arch = "wasm32")))]
pub use session::{Session, SessionHandle};
