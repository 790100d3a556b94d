//! Dispatcher contract and the method registry implementing it.

use crate::{
    codec::ServerCodec,
    context::RequestContext,
    error::{CodecError, JsonRpcError},
    stream::JsonStream,
};
use async_trait::async_trait;
use conduit_metrics::rpc::record_rpc_call;
use conduit_primitives::Message;
use futures::future::{join_all, BoxFuture};
use jsonrpsee::types::ErrorObjectOwned;
use serde_json::Value;
use std::{collections::HashMap, fmt, future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, info, trace};

/// Executes the request a codec yields and writes its response.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Decode exactly one request or batch from `codec`, execute it and write the response
    /// through `stream` when given, through `codec` otherwise.
    ///
    /// An error is a failure of the whole payload, such as undecodable input. The caller
    /// answers it with HTTP 400 and the error message as body.
    async fn serve_single_request(
        &self,
        ctx: &RequestContext,
        codec: &dyn ServerCodec,
        stream: Option<&mut JsonStream>,
    ) -> Result<(), ErrorResponse>;
}

/// Top-level failure returned by a dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorResponse(Box<Message>);

impl ErrorResponse {
    pub fn new(id: Value, error: ErrorObjectOwned) -> Self {
        Self(Box::new(Message::error_response(id, error)))
    }

    pub fn message(&self) -> &Message {
        &self.0
    }

    pub fn into_message(self) -> Message {
        *self.0
    }
}

impl From<JsonRpcError> for ErrorResponse {
    fn from(err: JsonRpcError) -> Self {
        Self::new(Value::Null, err.0)
    }
}

/// Outcome of a registered method.
pub type MethodResult = Result<Value, ErrorObjectOwned>;

type MethodCallback = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, MethodResult> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("method {0} is already registered")]
    AlreadyRegistered(String),
}

/// A [Dispatcher](Dispatcher) backed by a table of named async methods.
///
/// Batch members run concurrently and their responses keep the request order. Notifications are
/// executed but never answered.
#[derive(Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, MethodCallback>,
    batch_limit: Option<usize>,
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("batch_limit", &self.batch_limit)
            .finish()
    }
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject batches with more than `limit` members.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = Some(limit);
        self
    }

    /// Register a method.
    ///
    /// # Arguments
    /// * `name` - The method name callers use.
    /// * `callback` - Called with the request params, absent when the request has none.
    ///
    /// # Returns
    /// * `Result<(), RegistryError>` - An error if the name is taken.
    pub fn register<F, Fut>(
        &mut self,
        name: impl Into<String>,
        callback: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MethodResult> + Send + 'static,
    {
        let name = name.into();
        if self.methods.contains_key(&name) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        self.methods.insert(name, Arc::new(move |params| Box::pin(callback(params))));
        Ok(())
    }

    /// Move all methods of `other` into this registry.
    pub fn merge(&mut self, other: MethodRegistry) -> Result<(), RegistryError> {
        if let Some(name) = other
            .methods
            .keys()
            .find(|name| self.methods.contains_key(*name))
        {
            return Err(RegistryError::AlreadyRegistered(name.clone()));
        }
        self.methods.extend(other.methods);
        Ok(())
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    async fn handle_call(&self, ctx: &RequestContext, msg: Message) -> Option<Message> {
        let Some(method) = msg.method else {
            return Some(Message::error_response(
                msg.id.unwrap_or(Value::Null),
                JsonRpcError::invalid_request("invalid request").into(),
            ));
        };

        let result = match self.methods.get(&method) {
            Some(callback) => callback(msg.params).await,
            None => Err(JsonRpcError::method_not_found(&method).into()),
        };
        record_rpc_call(&method, result.as_ref().err().map(|err| err.code()));
        if ctx.debug {
            info!(peer = %ctx.peer.remote_addr, %method, id = ?msg.id, ?result, "served rpc call");
        } else {
            trace!(
                peer = %ctx.peer.remote_addr,
                %method,
                id = ?msg.id,
                ok = result.is_ok(),
                "served rpc call"
            );
        }

        let id = msg.id?;
        Some(match result {
            Ok(value) => Message::response(id, value),
            Err(err) => Message::error_response(id, err),
        })
    }
}

#[async_trait]
impl Dispatcher for MethodRegistry {
    async fn serve_single_request(
        &self,
        ctx: &RequestContext,
        codec: &dyn ServerCodec,
        stream: Option<&mut JsonStream>,
    ) -> Result<(), ErrorResponse> {
        let (msgs, batch) = match codec.read_batch().await {
            Ok(read) => read,
            Err(CodecError::Eof) => return Ok(()),
            Err(err) => {
                debug!(peer = %ctx.peer.remote_addr, %err, "failed to read request");
                return Err(JsonRpcError::from(err).into());
            }
        };

        let res = if !batch {
            match msgs.into_iter().next() {
                Some(msg) => match self.handle_call(ctx, msg).await {
                    Some(resp) => write_response(codec, stream, &resp).await,
                    None => Ok(()),
                },
                None => Ok(()),
            }
        } else if msgs.is_empty() {
            let resp = Message::error_response(
                Value::Null,
                JsonRpcError::invalid_request("empty batch").into(),
            );
            write_response(codec, stream, &resp).await
        } else if let Some(limit) = self.batch_limit.filter(|limit| msgs.len() > *limit) {
            let resp = Message::error_response(
                Value::Null,
                JsonRpcError::invalid_request(format!("batch too large, limit is {limit}"))
                    .into(),
            );
            write_response(codec, stream, &resp).await
        } else {
            let resps: Vec<Message> =
                join_all(msgs.into_iter().map(|msg| self.handle_call(ctx, msg)))
                    .await
                    .into_iter()
                    .flatten()
                    .collect();
            if resps.is_empty() {
                Ok(())
            } else {
                write_responses(codec, stream, &resps).await
            }
        };

        if let Err(err) = res {
            debug!(peer = %ctx.peer.remote_addr, %err, "failed to write response");
        }
        Ok(())
    }
}

async fn write_response(
    codec: &dyn ServerCodec,
    stream: Option<&mut JsonStream>,
    resp: &Message,
) -> Result<(), CodecError> {
    match stream {
        Some(stream) => {
            stream.write_value(resp).await?;
            stream.flush().await
        }
        None => codec.write_json(&serde_json::to_value(resp)?).await,
    }
}

async fn write_responses(
    codec: &dyn ServerCodec,
    stream: Option<&mut JsonStream>,
    resps: &[Message],
) -> Result<(), CodecError> {
    match stream {
        Some(stream) => {
            stream.begin_array();
            for resp in resps {
                stream.write_value(resp).await?;
            }
            stream.end_array();
            stream.flush().await
        }
        None => codec.write_json(&serde_json::to_value(resps)?).await,
    }
}
