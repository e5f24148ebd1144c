//! Server descriptor returned by `GET /info`.

use serde::{Deserialize, Serialize};

/// Identity of the remote server.
///
/// Fetched once per logical session and cached across reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Server name.
    pub name: String,
    /// Server software version.
    pub version: String,
    /// Realtime API version the server speaks.
    pub api_version: u32,
}

impl ServerDescriptor {
    /// Returns `true` if the server speaks `api_version`.
    #[inline]
    #[must_use]
    pub fn supports(&self, api_version: u32) -> bool {
        self.api_version == api_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_body() {
        let body = r#"{"name":"mfp","version":"2.3.1","api_version":2}"#;
        let descriptor: ServerDescriptor = serde_json::from_str(body).expect("parse");
        assert_eq!(descriptor.name, "mfp");
        assert!(descriptor.supports(2));
        assert!(!descriptor.supports(1));
    }
}
