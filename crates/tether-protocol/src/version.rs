//! Protocol version detection and feature gates.

/// Supported Tether protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Original protocol: unary HTTP exchanges only (introduced 2024-10)
    V2024_10,
    /// Protocol with streamable delivery and session event streams (introduced 2025-01)
    V2025_01,
}

impl ProtocolVersion {
    /// Parses a version string like "2024-10" or "2025-01".
    pub fn parse_version(s: &str) -> Option<Self> {
        match s {
            "2024-10" => Some(ProtocolVersion::V2024_10),
            "2025-01" => Some(ProtocolVersion::V2025_01),
            _ => None,
        }
    }

    /// Converts this version to its string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2024_10 => "2024-10",
            ProtocolVersion::V2025_01 => "2025-01",
        }
    }

    /// Returns whether this version supports event-stream delivery.
    pub fn supports_streaming(&self) -> bool {
        matches!(self, ProtocolVersion::V2025_01)
    }

    /// The latest protocol version this engine implements.
    pub const LATEST: ProtocolVersion = ProtocolVersion::V2025_01;
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(
            ProtocolVersion::parse_version("2024-10"),
            Some(ProtocolVersion::V2024_10)
        );
        assert_eq!(
            ProtocolVersion::parse_version("2025-01"),
            Some(ProtocolVersion::V2025_01)
        );
        assert_eq!(ProtocolVersion::parse_version("invalid"), None);
    }

    #[test]
    fn test_version_features() {
        assert!(!ProtocolVersion::V2024_10.supports_streaming());
        assert!(ProtocolVersion::V2025_01.supports_streaming());
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::LATEST);
    }
}
