use serde::{Deserialize, Serialize};

/// Metadata about the caller of a request, attached to the request-scoped context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Name of the transport the request arrived on, e.g. `http`.
    pub transport: String,
    /// Address of the remote end, empty when unknown.
    pub remote_addr: String,
    /// Set for HTTP requests only.
    pub http: HttpInfo,
}

/// HTTP specific peer metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpInfo {
    /// Protocol version, e.g. `HTTP/1.1`.
    pub version: String,
    /// Value of the Host header (or the request URI authority).
    pub host: String,
    /// Value of the Origin header.
    pub origin: String,
    /// Value of the User-Agent header.
    pub user_agent: String,
}
