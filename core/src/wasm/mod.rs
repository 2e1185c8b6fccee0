//! WASM bindings for TextSync
//!
//! JavaScript-friendly wrappers around the server document, the client
//! state machine and the transform engine. Structured values cross the
//! boundary as JSON strings.

pub mod bindings;
pub mod utils;

// Re-export main types
pub use bindings::{compose_operations, transform_operations, WasmClientDocument, WasmDocument};
