//! Transport header names and extraction helpers.

use tether_protocol::ProtocolVersion;

/// Session identifier header, generated by the server at handshake time and
/// echoed by the client on every subsequent exchange for that session
pub const SESSION_ID_HEADER: &str = "Tether-Session-Id";

/// Protocol version header
pub const PROTOCOL_VERSION_HEADER: &str = "Tether-Protocol-Version";

/// Extract the session id from request headers; absence is legal for
/// sessionless requests
pub fn extract_session_id(headers: &hyper::HeaderMap) -> Option<String> {
    headers
        .get(SESSION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
}

/// Extract the protocol version from request headers, defaulting to the
/// latest supported version
pub fn extract_protocol_version(headers: &hyper::HeaderMap) -> ProtocolVersion {
    headers
        .get(PROTOCOL_VERSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(ProtocolVersion::parse_version)
        .unwrap_or(ProtocolVersion::LATEST)
}
