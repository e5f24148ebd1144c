//! Inbound frame discrimination.
//!
//! Every text frame from the server is either an event (`event` key present)
//! or an action response (`status` key present). Anything else is rejected
//! as [`Error::MalformedMessage`] and never dereferenced further.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::ActionId;

use super::{ActionResponse, CorrelationField, ResponseStatus, Retcode, ServerEvent};

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Server-pushed event.
    Event(ServerEvent),

    /// Correlated action response.
    Response {
        /// Correlation id, `None` if the server sent something we never issued.
        id: Option<ActionId>,
        /// Raw id text as received.
        raw_id: String,
        /// Parsed response.
        response: ActionResponse,
    },
}

impl InboundMessage {
    /// Parses and classifies a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedMessage`] if the frame is not a JSON object,
    /// matches neither shape, or is a response without a correlation id.
    pub fn parse(text: &str, field: CorrelationField) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| Error::malformed(format!("invalid JSON: {e}")))?;

        let Value::Object(object) = value else {
            return Err(Error::malformed("frame is not a JSON object"));
        };

        if let Some(name) = object.get("event").and_then(Value::as_str)
            && !name.is_empty()
        {
            return Ok(Self::Event(ServerEvent {
                name: name.to_string(),
                data: object.get("data").cloned().unwrap_or(Value::Null),
                time: object.get("time").and_then(Value::as_i64),
            }));
        }

        if let Some(status) = object.get("status").and_then(Value::as_str) {
            return Self::parse_response(&object, status, field);
        }

        Err(Error::malformed("frame is neither an event nor an action response"))
    }

    fn parse_response(
        object: &Map<String, Value>,
        status: &str,
        field: CorrelationField,
    ) -> Result<Self> {
        let status = ResponseStatus::from_wire(status)
            .ok_or_else(|| Error::malformed(format!("unknown response status `{status}`")))?;

        let raw_id = object
            .get(field.as_str())
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::malformed(format!("action response without `{}`", field.as_str()))
            })?
            .to_string();

        let retcode = object
            .get("retcode")
            .and_then(Value::as_i64)
            .map(Retcode::of)
            .unwrap_or_default();

        let response = ActionResponse {
            status,
            retcode,
            data: object.get("data").cloned().unwrap_or(Value::Null),
            message: object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        };

        Ok(Self::Response {
            id: raw_id.parse().ok(),
            raw_id,
            response,
        })
    }
}
