//! Action request and response message types.
//!
//! Defines the frame format for actions sent from the client and the
//! correlated responses sent back by the server.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::ActionId;

use super::{Action, Retcode};

// ============================================================================
// CorrelationField
// ============================================================================

/// Name of the JSON field that carries the correlation id.
///
/// Older servers echo the id back under `echo`; current ones use `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrelationField {
    /// `{"id": "..."}`
    #[default]
    Id,
    /// `{"echo": "..."}`
    Echo,
}

impl CorrelationField {
    /// Returns the JSON key.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Echo => "echo",
        }
    }
}

// ============================================================================
// ActionRequest
// ============================================================================

/// An action request from client to server.
///
/// # Format
///
/// ```json
/// {
///   "action": "get_file_info",
///   "params": { "path": "/srv/world/level.dat" },
///   "id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
///
/// The id key is `id` or `echo` depending on [`CorrelationField`].
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Correlation id.
    pub id: ActionId,
    /// Action to run.
    pub action: Action,
    /// Opaque action parameters.
    pub params: Value,
}

impl ActionRequest {
    /// Creates a new request.
    ///
    /// `None` params are sent as an empty object.
    #[inline]
    #[must_use]
    pub fn new(id: ActionId, action: Action, params: Option<Value>) -> Self {
        Self {
            id,
            action,
            params: params.unwrap_or_else(|| Value::Object(Map::new())),
        }
    }

    /// Serializes the request into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params cannot be serialized.
    pub fn to_frame(&self, field: CorrelationField) -> Result<String> {
        let mut frame = Map::with_capacity(3);
        frame.insert("action".into(), Value::String(self.action.as_str().into()));
        frame.insert("params".into(), self.params.clone());
        frame.insert(field.as_str().into(), Value::String(self.id.to_string()));
        Ok(serde_json::to_string(&frame)?)
    }
}

// ============================================================================
// ResponseStatus
// ============================================================================

/// Response status discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Action succeeded.
    Ok,
    /// Action failed.
    Error,
}

impl ResponseStatus {
    /// Parses the wire value.
    #[must_use]
    pub fn from_wire(status: &str) -> Option<Self> {
        match status {
            "ok" => Some(Self::Ok),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

// ============================================================================
// ActionResponse
// ============================================================================

/// A response from server to client.
///
/// # Format
///
/// ```json
/// {
///   "status": "ok",
///   "retcode": 0,
///   "data": { ... },
///   "message": "",
///   "id": "550e8400-e29b-41d4-a716-446655440000"
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResponse {
    /// Outcome status.
    pub status: ResponseStatus,
    /// Classified return code.
    pub retcode: Retcode,
    /// Opaque payload.
    pub data: Value,
    /// Human-readable message.
    pub message: String,
}

impl ActionResponse {
    /// Returns `true` if this is an `ok` response.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ResponseStatus::Ok
    }

    /// Returns `true` if this is an `error` response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ResponseStatus::Error
    }

    /// Extracts the payload, returning an error if the action failed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActionFailed`] if the status was `error`.
    pub fn into_result(self) -> Result<Value> {
        match self.status {
            ResponseStatus::Ok => Ok(self.data),
            ResponseStatus::Error => Err(Error::action_failed(self.retcode, self.message)),
        }
    }

    /// Gets a string value from the payload.
    ///
    /// Returns empty string if key not found or not a string.
    #[inline]
    #[must_use]
    pub fn get_string(&self, key: &str) -> String {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    /// Gets a u64 value from the payload.
    ///
    /// Returns 0 if key not found or not a number.
    #[inline]
    #[must_use]
    pub fn get_u64(&self, key: &str) -> u64 {
        self.data
            .get(key)
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }

    /// Gets a boolean value from the payload.
    ///
    /// Returns false if key not found or not a boolean.
    #[inline]
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.data
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_request_frame_uses_id_field() {
        let id = ActionId::generate();
        let request = ActionRequest::new(id, Action::GetFileInfo, Some(json!({"path": "/a"})));
        let frame: Value =
            serde_json::from_str(&request.to_frame(CorrelationField::Id).expect("frame"))
                .expect("json");

        assert_eq!(frame["action"], "get_file_info");
        assert_eq!(frame["params"]["path"], "/a");
        assert_eq!(frame["id"], id.to_string());
        assert!(frame.get("echo").is_none());
    }

    #[test]
    fn test_request_frame_uses_echo_field() {
        let id = ActionId::generate();
        let request = ActionRequest::new(id, Action::Ping, None);
        let frame: Value =
            serde_json::from_str(&request.to_frame(CorrelationField::Echo).expect("frame"))
                .expect("json");

        assert_eq!(frame["echo"], id.to_string());
        assert_eq!(frame["params"], json!({}));
        assert!(frame.get("id").is_none());
    }

    #[test]
    fn test_into_result_ok() {
        let response = ActionResponse {
            status: ResponseStatus::Ok,
            retcode: Retcode::Ok,
            data: json!({"size": 42, "name": "level.dat", "dir": false}),
            message: String::new(),
        };

        assert!(response.is_ok());
        assert_eq!(response.get_u64("size"), 42);
        assert_eq!(response.get_string("name"), "level.dat");
        assert!(!response.get_bool("dir"));
        assert_eq!(response.get_string("missing"), "");

        let data = response.into_result().expect("ok response");
        assert_eq!(data["size"], 42);
    }

    #[test]
    fn test_into_result_error() {
        let response = ActionResponse {
            status: ResponseStatus::Error,
            retcode: Retcode::of(3),
            data: Value::Null,
            message: "file not found".into(),
        };

        assert!(response.is_error());
        match response.into_result() {
            Err(Error::ActionFailed { retcode, message }) => {
                assert_eq!(retcode.code(), 3);
                assert_eq!(message, "file not found");
            }
            other => panic!("expected ActionFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_status_from_wire() {
        assert_eq!(ResponseStatus::from_wire("ok"), Some(ResponseStatus::Ok));
        assert_eq!(ResponseStatus::from_wire("error"), Some(ResponseStatus::Error));
        assert_eq!(ResponseStatus::from_wire("OK"), None);
    }
}
