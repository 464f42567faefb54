use std::fmt;

use serde::{Deserialize, Serialize};

/// The protocol version marker carried in every envelope.
///
/// Serializes to exactly `"2.0"`; any other value fails deserialization,
/// which is the first validation step of the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JsonRpcVersion {
    #[serde(rename = "2.0")]
    V2_0,
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion::V2_0
    }
}

impl fmt::Display for JsonRpcVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::JSONRPC_VERSION)
    }
}

/// Integer request identifier.
///
/// Tether fixes ids to integers; uniqueness is scoped to one session's
/// outbound sequence, not global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl RequestId {
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_round_trip() {
        let json = serde_json::to_string(&JsonRpcVersion::V2_0).unwrap();
        assert_eq!(json, "\"2.0\"");
        let parsed: JsonRpcVersion = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, JsonRpcVersion::V2_0);
    }

    #[test]
    fn test_version_rejects_other_strings() {
        assert!(serde_json::from_str::<JsonRpcVersion>("\"1.0\"").is_err());
        assert!(serde_json::from_str::<JsonRpcVersion>("\"2.1\"").is_err());
    }

    #[test]
    fn test_request_id_is_transparent() {
        let id = RequestId(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let parsed: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_request_id_rejects_strings() {
        assert!(serde_json::from_str::<RequestId>("\"42\"").is_err());
    }
}
