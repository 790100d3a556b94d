//! Named defaults shared by the client, the server handler and the auth gate.
//!
//! Every value here is a default: the server and the JWT validator accept overrides per instance.

/// HTTP transport
pub mod http {
    /// Maximum accepted request body (32 MiB), enforced on the declared length and on the body
    /// reader.
    pub const MAX_REQUEST_CONTENT_LENGTH: u64 = 1024 * 1024 * 32;
    /// Content type of every JSON-RPC response.
    pub const CONTENT_TYPE: &str = "application/json";
    /// Request content types accepted for POST.
    /// https://www.jsonrpc.org/historical/json-rpc-over-http.html#id13
    pub const ACCEPTED_CONTENT_TYPES: [&str; 3] =
        [CONTENT_TYPE, "application/json-rpc", "application/jsonrequest"];
    /// Request header that turns on verbose diagnostics for a single request.
    pub const DEBUG_HEADER: &str = "dbg";
    /// Id used by GET-translated requests without an `id` query parameter.
    pub const DEFAULT_GET_REQUEST_ID: &str = "1";
}

/// Bearer token authentication
pub mod auth {
    use std::time::Duration;

    /// Maximum distance between a token's issued-at claim and the server clock, in both
    /// directions.
    pub const JWT_TOKEN_EXPIRY: Duration = Duration::from_secs(60);
    /// Length of the shared HS256 secret in bytes.
    pub const JWT_SECRET_LENGTH: usize = 32;
    /// Default file name of the hex-encoded secret.
    pub const JWT_SECRET_FILE: &str = "jwt.hex";
}

/// Streaming JSON encoder
pub mod stream {
    pub const INITIAL_BUFFER_SIZE: usize = 4096;
}

/// Networking
pub mod networking {
    pub const DEFAULT_HTTP_RPC_PORT: u16 = 8545;
    pub const DEFAULT_AUTH_RPC_PORT: u16 = 8551;
    pub const DEFAULT_METRICS_PORT: u16 = 6060;
}

/// JSON-RPC protocol
pub mod rpc {
    pub const JSONRPC_VERSION: &str = "2.0";
}
