//! HTTP request handler: validation, GET translation and dispatch of a single request.

use crate::{
    codec::ServerCodec,
    context::{ConnectionInfo, RequestContext},
    dispatch::Dispatcher,
    error::CodecError,
    stream::{JsonStream, ResponseWriter, SharedWriter},
    translate::translate_get,
};
use async_trait::async_trait;
use conduit_primitives::{
    constants::http::{
        ACCEPTED_CONTENT_TYPES, CONTENT_TYPE, DEBUG_HEADER, MAX_REQUEST_CONTENT_LENGTH,
    },
    parse_payload, HttpInfo, Message, PeerInfo,
};
use futures::{future::BoxFuture, FutureExt};
use hyper::{
    body::{Bytes, HttpBody},
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Body, Method, Request, Response, StatusCode,
};
use serde_json::Value;
use std::{
    convert::Infallible,
    io,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tower::Service;
use tracing::{debug, info};

/// Knobs of the HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    /// Upper bound of a request body, checked against the declared length and enforced on read.
    pub max_request_content_length: u64,
    /// Media types accepted for POST, compared case-insensitively.
    pub accepted_content_types: Vec<String>,
    /// Write responses with the codec instead of the incremental encoder.
    pub disable_streaming: bool,
    /// Honour the `dbg: true` request header.
    pub debug_single_request: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            max_request_content_length: MAX_REQUEST_CONTENT_LENGTH,
            accepted_content_types: ACCEPTED_CONTENT_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
            disable_streaming: false,
            debug_single_request: false,
        }
    }
}

/// A request turned away before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub status: StatusCode,
    pub message: String,
}

impl Rejection {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn into_response(self) -> Response<Body> {
        plain_text_response(self.status, &self.message)
    }
}

/// Check method, declared length and content type of a request.
///
/// # Arguments
/// * `req: &Request<B>` - The request to check.
/// * `config: &HttpServerConfig` - Limits and accepted content types.
///
/// # Returns
/// * `Result<(), Rejection>` - The status and message to answer with if the request is refused.
pub fn validate_request<B>(req: &Request<B>, config: &HttpServerConfig) -> Result<(), Rejection> {
    let method = req.method();
    if method == Method::PUT || method == Method::DELETE {
        return Err(Rejection::new(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"));
    }
    if let Some(len) = content_length(req.headers()) {
        if len > config.max_request_content_length {
            return Err(Rejection::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "content length too large ({len}>{})",
                    config.max_request_content_length
                ),
            ));
        }
    }
    // no content type check for these
    if method == Method::OPTIONS || method == Method::GET {
        return Ok(());
    }
    let accepted = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(media_type)
        .is_some_and(|mt| {
            config
                .accepted_content_types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&mt))
        });
    if accepted {
        Ok(())
    } else {
        Err(Rejection::new(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("invalid content type, only {CONTENT_TYPE} is supported"),
        ))
    }
}

/// Declared body length. A request without `Content-Length` and without a transfer encoding
/// has no body; a chunked request has an unknown length.
pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    match headers.get(header::CONTENT_LENGTH) {
        Some(value) => value.to_str().ok()?.trim().parse().ok(),
        None if headers.contains_key(header::TRANSFER_ENCODING) => None,
        None => Some(0),
    }
}

/// The `type/subtype` part of a content type, lowercased.
fn media_type(value: &str) -> Option<String> {
    let media_type = value.split(';').next()?.trim();
    let (kind, subtype) = media_type.split_once('/')?;
    if kind.is_empty() || subtype.is_empty() {
        return None;
    }
    Some(media_type.to_ascii_lowercase())
}

pub(crate) fn plain_text_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(format!("{message}\n")));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response
}

fn status_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

enum Input {
    /// A call translated from a GET query string.
    Synthetic(Message),
    Body(Body),
}

/// One-shot codec over a single HTTP request and its response.
///
/// Reading yields the request payload once, then end of stream. Writes go to the response.
pub struct HttpServerCodec {
    input: Mutex<Option<Input>>,
    writer: SharedWriter,
    remote_addr: String,
    max_content_length: u64,
    closed: CancellationToken,
}

impl HttpServerCodec {
    pub fn new(
        req: Request<Body>,
        writer: SharedWriter,
        max_content_length: u64,
        remote_addr: String,
    ) -> Self {
        let input = if req.method() == Method::GET && content_length(req.headers()) == Some(0) {
            Input::Synthetic(translate_get(req.uri().query().unwrap_or_default()))
        } else {
            Input::Body(req.into_body())
        };
        Self {
            input: Mutex::new(Some(input)),
            writer,
            remote_addr,
            max_content_length,
            closed: CancellationToken::new(),
        }
    }

    /// Set the status of the response, if nothing was written yet.
    pub async fn write_header(&self, status: StatusCode) {
        self.writer.lock().await.write_header(status);
    }
}

/// Read at most `limit` bytes of the body. Anything past the limit is cut off.
async fn read_limited(mut body: Body, limit: u64) -> Result<Vec<u8>, CodecError> {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let mut buf = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk.map_err(io::Error::other)?;
        let room = limit - buf.len();
        if chunk.len() >= room {
            buf.extend_from_slice(&chunk[..room]);
            break;
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[async_trait]
impl ServerCodec for HttpServerCodec {
    async fn read_batch(&self) -> Result<(Vec<Message>, bool), CodecError> {
        if self.closed.is_cancelled() {
            return Err(CodecError::Closed);
        }
        let input = self.input.lock().await.take().ok_or(CodecError::Eof)?;
        match input {
            Input::Synthetic(msg) => Ok((vec![msg], false)),
            Input::Body(body) => {
                let payload = read_limited(body, self.max_content_length).await?;
                if payload.iter().all(u8::is_ascii_whitespace) {
                    return Err(CodecError::Eof);
                }
                Ok(parse_payload(&payload)?)
            }
        }
    }

    async fn write_json(&self, value: &Value) -> Result<(), CodecError> {
        if self.closed.is_cancelled() {
            return Err(CodecError::Closed);
        }
        let bytes = serde_json::to_vec(value)?;
        self.writer.lock().await.write(Bytes::from(bytes)).await?;
        Ok(())
    }

    /// Peer metadata of an HTTP request travels in its [RequestContext](RequestContext).
    fn peer_info(&self) -> PeerInfo {
        panic!("peer_info called on HttpServerCodec")
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

/// Serves JSON-RPC over HTTP for one [Dispatcher](Dispatcher).
pub struct RpcHandler<D> {
    dispatcher: Arc<D>,
    config: Arc<HttpServerConfig>,
}

impl<D> Clone for RpcHandler<D> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<D: Dispatcher> RpcHandler<D> {
    pub fn new(dispatcher: D, config: HttpServerConfig) -> Self {
        Self::from_shared(Arc::new(dispatcher), config)
    }

    pub fn from_shared(dispatcher: Arc<D>, config: HttpServerConfig) -> Self {
        Self {
            dispatcher,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HttpServerConfig {
        &self.config
    }

    /// Handle one HTTP request.
    ///
    /// The response head is returned as soon as the dispatcher writes its first byte (or
    /// finishes without writing), the body streams from there.
    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        // Permit dumb empty requests for remote health-checks
        if req.method() == Method::GET
            && content_length(req.headers()) == Some(0)
            && req.uri().query().map_or(true, str::is_empty)
        {
            return Response::new(Body::empty());
        }
        if let Err(rejection) = validate_request(&req, &self.config) {
            debug!(
                status = %rejection.status,
                message = %rejection.message,
                "rejected http request"
            );
            return rejection.into_response();
        }

        let ctx = self.request_context(&req);
        if ctx.is_cancelled() {
            debug!(peer = %ctx.peer.remote_addr, "connection closed before dispatch");
            return status_response(StatusCode::SERVICE_UNAVAILABLE);
        }
        if ctx.debug {
            info!(
                peer = %ctx.peer.remote_addr,
                method = %req.method(),
                uri = %req.uri(),
                "serving request with diagnostics"
            );
        }

        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body) = Body::channel();
        let writer = ResponseWriter::new(head_tx, body_tx).shared();
        let stream = (!self.config.disable_streaming)
            .then(|| JsonStream::new(writer.clone()));
        let codec = HttpServerCodec::new(
            req,
            writer,
            self.config.max_request_content_length,
            ctx.peer.remote_addr.clone(),
        );
        // detached: dispatch runs to completion even if the client hangs up
        tokio::spawn(serve_request(self.dispatcher.clone(), ctx, codec, stream));

        let status = head_rx.await.unwrap_or(StatusCode::OK);
        let mut response = Response::new(body);
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        response
    }

    fn request_context(&self, req: &Request<Body>) -> RequestContext {
        let conn = req.extensions().get::<ConnectionInfo>();
        let headers = req.headers();
        let host = match header_value(headers, header::HOST) {
            host if host.is_empty() => req
                .uri()
                .authority()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            host => host,
        };
        let peer = PeerInfo {
            transport: "http".to_string(),
            remote_addr: conn.map(|c| c.remote_addr.to_string()).unwrap_or_default(),
            http: HttpInfo {
                version: format!("{:?}", req.version()),
                host,
                origin: header_value(headers, header::ORIGIN),
                user_agent: header_value(headers, header::USER_AGENT),
            },
        };
        let debug = self.config.debug_single_request
            && headers
                .get(DEBUG_HEADER)
                .is_some_and(|v| v.as_bytes() == b"true");
        let cancel = conn.map(|c| c.cancel.clone()).unwrap_or_default();
        RequestContext::new(peer, cancel).with_debug(debug)
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn serve_request<D: Dispatcher>(
    dispatcher: Arc<D>,
    ctx: RequestContext,
    codec: HttpServerCodec,
    mut stream: Option<JsonStream>,
) {
    let res = dispatcher
        .serve_single_request(&ctx, &codec, stream.as_mut())
        .await;
    if let Some(stream) = stream.as_mut() {
        if let Err(err) = stream.finish().await {
            debug!(peer = %ctx.peer.remote_addr, %err, "failed to flush response");
        }
    }
    if let Err(err) = res {
        codec.write_header(StatusCode::BAD_REQUEST).await;
        let written = match serde_json::to_value(err.message()) {
            Ok(value) => codec.write_json(&value).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = written {
            debug!(peer = %ctx.peer.remote_addr, %err, "failed to write error response");
        }
    }
    codec.close();
}

impl<D: Dispatcher> Service<Request<Body>> for RpcHandler<D> {
    type Response = Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        async move { Ok(handler.handle(req).await) }.boxed()
    }
}
