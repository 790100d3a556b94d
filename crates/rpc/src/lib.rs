//! JSON-RPC over HTTP
//!
//! A client transport, the server side request handler with GET translation and streamed
//! responses, a host server and the bearer token (JWT) gate for privileged endpoints.

mod auth;
mod client;
mod codec;
mod context;
mod dispatch;
pub mod error;
mod handler;
mod middleware;
mod rpc;
mod stream;
mod translate;

pub use auth::{check_jwt_secret, AuthError, Claims, JwtSecret, JwtValidator, SecretError};
pub use client::{BatchElem, Client, HttpConn};
pub use codec::ServerCodec;
pub use context::{ConnectionInfo, RequestContext};
pub use dispatch::{Dispatcher, ErrorResponse, MethodRegistry, MethodResult, RegistryError};
pub use handler::{validate_request, HttpServerCodec, HttpServerConfig, Rejection, RpcHandler};
pub use middleware::{JwtAuth, JwtAuthLayer};
pub use rpc::{JsonRpcServer, ServerHandle};
pub use stream::{JsonStream, ResponseWriter, SharedWriter};
pub use translate::translate_get;
