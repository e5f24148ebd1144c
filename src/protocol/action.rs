//! Action catalog.
//!
//! Actions are sent as a bare string in the `action` field of a request
//! frame. The known catalog is typed; anything else the server understands
//! can be sent through [`Action::Custom`].
//!
//! | Group | Actions |
//! |-------|---------|
//! | Liveness | `ping` |
//! | Upload | `file_upload_request`, `file_upload_chunk`, `file_upload_cancel` |
//! | Inspection | `get_file_info`, `get_directory_info` |
//! | Download | `file_download_request`, `file_download_chunk`, `file_download_close` |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// Action
// ============================================================================

/// A remote action name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    /// Liveness probe used by the keepalive monitor.
    Ping,
    /// Start a file upload.
    FileUploadRequest,
    /// Send one chunk of an upload.
    FileUploadChunk,
    /// Abort an upload.
    FileUploadCancel,
    /// Stat a single file.
    GetFileInfo,
    /// List a directory.
    GetDirectoryInfo,
    /// Start a file download.
    FileDownloadRequest,
    /// Fetch one chunk of a download.
    FileDownloadChunk,
    /// Finish a download.
    FileDownloadClose,
    /// Server-defined action outside the known catalog.
    Custom(String),
}

impl Action {
    /// Returns the wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Ping => "ping",
            Self::FileUploadRequest => "file_upload_request",
            Self::FileUploadChunk => "file_upload_chunk",
            Self::FileUploadCancel => "file_upload_cancel",
            Self::GetFileInfo => "get_file_info",
            Self::GetDirectoryInfo => "get_directory_info",
            Self::FileDownloadRequest => "file_download_request",
            Self::FileDownloadChunk => "file_download_chunk",
            Self::FileDownloadClose => "file_download_close",
            Self::Custom(name) => name,
        }
    }

    /// Resolves a wire name, falling back to [`Action::Custom`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            "ping" => Self::Ping,
            "file_upload_request" => Self::FileUploadRequest,
            "file_upload_chunk" => Self::FileUploadChunk,
            "file_upload_cancel" => Self::FileUploadCancel,
            "get_file_info" => Self::GetFileInfo,
            "get_directory_info" => Self::GetDirectoryInfo,
            "file_download_request" => Self::FileDownloadRequest,
            "file_download_chunk" => Self::FileDownloadChunk,
            "file_download_close" => Self::FileDownloadClose,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::from_name(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = Cow::<'de, str>::deserialize(deserializer)?;
        Ok(Self::from_name(&name))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_resolve() {
        assert_eq!(Action::from_name("ping"), Action::Ping);
        assert_eq!(
            Action::from_name("get_directory_info"),
            Action::GetDirectoryInfo
        );
        assert_eq!(Action::FileDownloadClose.as_str(), "file_download_close");
    }

    #[test]
    fn test_unknown_name_is_custom() {
        let action = Action::from("restart_instance");
        assert_eq!(action, Action::Custom("restart_instance".into()));
        assert_eq!(action.to_string(), "restart_instance");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&Action::FileUploadChunk).expect("serialize");
        assert_eq!(json, r#""file_upload_chunk""#);

        let back: Action = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Action::FileUploadChunk);
    }
}
