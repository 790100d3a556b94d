use jsonrpsee::types::{error::ErrorCode, ErrorObject, ErrorObjectOwned};
use reqwest::StatusCode;
use thiserror::Error;

/// A wrapper for the [ErrorObjectOwned](ErrorObjectOwned) type.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcError(pub ErrorObjectOwned);

impl JsonRpcError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        JsonRpcError(ErrorObject::owned(ErrorCode::InvalidRequest.code(), message, None::<bool>))
    }

    pub fn method_not_found(method: &str) -> Self {
        JsonRpcError(ErrorObject::owned(
            ErrorCode::MethodNotFound.code(),
            format!("the method {method} does not exist/is not available"),
            None::<bool>,
        ))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        JsonRpcError(ErrorObject::owned(ErrorCode::InvalidParams.code(), message, None::<bool>))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        JsonRpcError(ErrorObject::owned(ErrorCode::InternalError.code(), message, None::<bool>))
    }
}

impl From<JsonRpcError> for ErrorObjectOwned {
    /// Convert a [JsonRpcError](JsonRpcError) to a [ErrorObjectOwned](ErrorObjectOwned).
    fn from(err: JsonRpcError) -> Self {
        err.0
    }
}

impl From<serde_json::Error> for JsonRpcError {
    /// Convert a [serde_json error](serde_json::Error) to a [JsonRpcError](JsonRpcError).
    fn from(err: serde_json::Error) -> Self {
        JsonRpcError(ErrorObject::owned(
            ErrorCode::ParseError.code(),
            format!("parse error: {err}"),
            None::<bool>,
        ))
    }
}

impl From<CodecError> for JsonRpcError {
    /// Convert a [CodecError](CodecError) to a [JsonRpcError](JsonRpcError).
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Json(err) => err.into(),
            err => JsonRpcError::internal(err.to_string()),
        }
    }
}

/// Errors reported by the HTTP client transport.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The endpoint could not be parsed at dial time.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    /// A header name or value was rejected.
    #[error("invalid header {name}")]
    InvalidHeader { name: String },
    /// The round trip failed before a response arrived.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The server answered outside of the 2xx range.
    #[error("{status}: {body}")]
    Status { status: StatusCode, body: String },
    /// The request could not be encoded or the response decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// A batch answer did not contain one response per request.
    #[error("batch response has {got} elements, expected {expected}")]
    BatchLengthMismatch { expected: usize, got: usize },
    /// The server answered the call with an error object.
    #[error("rpc error {}: {}", .0.code(), .0.message())]
    Rpc(ErrorObjectOwned),
    /// The client was closed before or while the call was in flight.
    #[error("client is closed")]
    Closed,
}

/// Errors reported by a [ServerCodec](crate::ServerCodec).
#[derive(Debug, Error)]
pub enum CodecError {
    /// The input is exhausted (or the connection closed).
    #[error("end of stream")]
    Eof,
    /// The payload is not valid JSON-RPC, or a value could not be encoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Reading or writing the underlying transport failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// The codec was already closed.
    #[error("codec is closed")]
    Closed,
}
