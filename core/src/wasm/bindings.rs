//! JavaScript bindings for TextSync core types

use super::utils::{to_js_error, to_json};
use crate::document::Document;
use crate::ot::{compose, transform, Operation};
use crate::protocol::{decode_message, ServerMessage};
use crate::sync::{ClientDocument, SyncConfig};
use wasm_bindgen::prelude::*;

fn parse_operation(json: &str) -> Result<Operation, JsValue> {
    decode_message(json).map_err(to_js_error)
}

fn parse_operations(json: &str) -> Result<Vec<Operation>, JsValue> {
    decode_message(json).map_err(to_js_error)
}

/// JavaScript-friendly wrapper for the authoritative Document
#[wasm_bindgen]
pub struct WasmDocument {
    inner: Document,
}

#[wasm_bindgen]
impl WasmDocument {
    /// Create an empty document with the given ID
    #[wasm_bindgen(constructor)]
    pub fn new(id: String) -> Self {
        Self {
            inner: Document::new(id),
        }
    }

    /// Start from an existing snapshot
    #[wasm_bindgen(js_name = withContent)]
    pub fn with_content(id: String, content: &str, version: u64) -> Self {
        Self {
            inner: Document::with_content(id, content, version),
        }
    }

    /// Accept an operation (JSON); returns the accepted operation as JSON
    #[wasm_bindgen(js_name = apply)]
    pub fn apply(&mut self, op_json: &str) -> Result<String, JsValue> {
        let op = parse_operation(op_json)?;
        let accepted = self.inner.apply(op).map_err(to_js_error)?;
        to_json(&accepted)
    }

    /// Accepted operations with version >= `version`, as a JSON array
    #[wasm_bindgen(js_name = operationsSince)]
    pub fn operations_since(&self, version: u64) -> Result<String, JsValue> {
        to_json(&self.inner.operations_since(version))
    }

    #[wasm_bindgen(js_name = getId)]
    pub fn get_id(&self) -> String {
        self.inner.id().clone()
    }

    #[wasm_bindgen(js_name = getContent)]
    pub fn get_content(&self) -> String {
        self.inner.content()
    }

    #[wasm_bindgen(js_name = getVersion)]
    pub fn get_version(&self) -> u64 {
        self.inner.version()
    }
}

/// JavaScript-friendly wrapper for the client state machine
///
/// Every transition returns a JSON array of effects for the host to carry
/// out, e.g. `[{"effect":"schedule_submit","delay_ms":10}]`.
#[wasm_bindgen]
pub struct WasmClientDocument {
    inner: ClientDocument,
}

#[wasm_bindgen]
impl WasmClientDocument {
    /// `client_id` may be omitted to generate one; `config_json` may be
    /// omitted for defaults
    #[wasm_bindgen(constructor)]
    pub fn new(
        document_id: String,
        content: &str,
        version: u64,
        client_id: Option<String>,
        config_json: Option<String>,
    ) -> Result<WasmClientDocument, JsValue> {
        let config = match config_json {
            Some(json) => SyncConfig::from_json(&json).map_err(to_js_error)?,
            None => SyncConfig::default(),
        };
        let client_id = client_id.unwrap_or_else(ClientDocument::generate_client_id);
        Ok(Self {
            inner: ClientDocument::with_options(client_id, document_id, content, version, config),
        })
    }

    /// Apply a local edit (operation JSON)
    #[wasm_bindgen(js_name = perform)]
    pub fn perform(&mut self, op_json: &str) -> Result<String, JsValue> {
        let op = parse_operation(op_json)?;
        let effects = self.inner.perform(op).map_err(to_js_error)?;
        to_json(&effects)
    }

    #[wasm_bindgen(js_name = undo)]
    pub fn undo(&mut self) -> Result<String, JsValue> {
        let effects = self.inner.undo().map_err(to_js_error)?;
        to_json(&effects)
    }

    #[wasm_bindgen(js_name = redo)]
    pub fn redo(&mut self) -> Result<String, JsValue> {
        let effects = self.inner.redo().map_err(to_js_error)?;
        to_json(&effects)
    }

    /// The scheduled submission timer fired
    #[wasm_bindgen(js_name = submitNext)]
    pub fn submit_next(&mut self) -> Result<String, JsValue> {
        to_json(&self.inner.submit_next())
    }

    /// The last submission could not be sent
    #[wasm_bindgen(js_name = channelUnavailable)]
    pub fn channel_unavailable(&mut self) -> Result<String, JsValue> {
        to_json(&self.inner.channel_unavailable())
    }

    /// A message from the operations channel (server message JSON)
    #[wasm_bindgen(js_name = receiveMessage)]
    pub fn receive_message(&mut self, message_json: &str) -> Result<String, JsValue> {
        let msg: ServerMessage = decode_message(message_json).map_err(to_js_error)?;
        let effects = self.inner.handle_server_message(msg).map_err(to_js_error)?;
        to_json(&effects)
    }

    /// A message from the selections channel; returns whether it was kept
    #[wasm_bindgen(js_name = receiveSelection)]
    pub fn receive_selection(&mut self, update_json: &str) -> Result<bool, JsValue> {
        let update = decode_message(update_json).map_err(to_js_error)?;
        Ok(self.inner.receive_selection(update))
    }

    #[wasm_bindgen(js_name = setSelection)]
    pub fn set_selection(&mut self, anchor: usize, focus: usize) -> Result<String, JsValue> {
        to_json(&self.inner.set_selection(anchor, focus))
    }

    /// Our caret announcement (JSON), or undefined while edits are pending
    #[wasm_bindgen(js_name = announceSelection)]
    pub fn announce_selection(&self) -> Result<Option<String>, JsValue> {
        self.inner
            .announce_selection()
            .map(|update| to_json(&update))
            .transpose()
    }

    /// Renderer view as JSON
    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot(&self) -> Result<String, JsValue> {
        to_json(&self.inner.snapshot())
    }

    #[wasm_bindgen(js_name = getContent)]
    pub fn get_content(&self) -> String {
        self.inner.content()
    }

    #[wasm_bindgen(js_name = getVersion)]
    pub fn get_version(&self) -> u64 {
        self.inner.version()
    }

    #[wasm_bindgen(js_name = getClientId)]
    pub fn get_client_id(&self) -> String {
        self.inner.client_id().to_string()
    }
}

/// Transform two operation lists (JSON arrays) built on the same state;
/// returns `[ours', theirs']`
#[wasm_bindgen(js_name = transformOperations)]
pub fn transform_operations(ours_json: &str, theirs_json: &str) -> Result<String, JsValue> {
    let ours = parse_operations(ours_json)?;
    let theirs = parse_operations(theirs_json)?;
    to_json(&transform(&ours, &theirs))
}

/// Fold one operation (JSON) into a list (JSON array)
#[wasm_bindgen(js_name = composeOperations)]
pub fn compose_operations(ops_json: &str, op_json: &str) -> Result<String, JsValue> {
    let ops = parse_operations(ops_json)?;
    let op = parse_operation(op_json)?;
    to_json(&compose(ops, op))
}
