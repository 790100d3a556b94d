//! JSON-RPC client over HTTP POST.

use crate::{
    codec::ServerCodec,
    error::{ClientError, CodecError},
};
use async_trait::async_trait;
use conduit_primitives::{constants::http::CONTENT_TYPE, parse_payload, Message, PeerInfo};
use hyper::body::Bytes;
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::Mutex;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::{debug, trace};
use url::Url;

/// Half-duplex connection to an HTTP JSON-RPC endpoint.
///
/// Every request is an independent POST round trip. Headers set on the connection are sent with
/// every later request.
pub struct HttpConn {
    client: reqwest::Client,
    url: Url,
    headers: Mutex<HeaderMap>,
    closed: CancellationToken,
}

impl HttpConn {
    fn new(client: reqwest::Client, url: Url) -> Self {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(header::ACCEPT, HeaderValue::from_static(CONTENT_TYPE));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
        Self {
            client,
            url,
            headers: Mutex::new(headers),
            closed: CancellationToken::new(),
        }
    }

    /// Set a header sent with every subsequent request, replacing any previous value.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), ClientError> {
        let invalid = || ClientError::InvalidHeader {
            name: name.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.lock().insert(header_name, header_value);
        Ok(())
    }

    /// A snapshot of the headers sent with the next request.
    pub fn headers(&self) -> HeaderMap {
        self.headers.lock().clone()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn do_request<T: Serialize + ?Sized>(&self, msg: &T) -> Result<Bytes, ClientError> {
        let body = serde_json::to_vec(msg)?;
        // the lock is released before the round trip starts
        let headers = self.headers.lock().clone();
        let resp = self
            .client
            .post(self.url.clone())
            .headers(headers)
            .body(body)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl ServerCodec for HttpConn {
    /// Nothing is ever pushed by the server over HTTP, so this blocks until the connection is
    /// closed.
    async fn read_batch(&self) -> Result<(Vec<Message>, bool), CodecError> {
        self.closed.cancelled().await;
        Err(CodecError::Eof)
    }

    async fn write_json(&self, _value: &Value) -> Result<(), CodecError> {
        panic!("write_json called on HttpConn")
    }

    fn peer_info(&self) -> PeerInfo {
        panic!("peer_info called on HttpConn")
    }

    fn remote_addr(&self) -> String {
        self.url.to_string()
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

/// Ids of an outgoing call or batch waiting for their responses.
///
/// Responses are matched to requests by position, the Nth response answering the Nth request
/// that expects one. Notifications expect no response.
#[derive(Debug)]
struct PendingCall {
    ids: Vec<Option<Value>>,
}

impl PendingCall {
    fn new(msgs: &[Message]) -> Self {
        Self {
            ids: msgs
                .iter()
                .filter(|m| !m.is_notification())
                .map(|m| m.id.clone())
                .collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn resolve(self, responses: Vec<Message>) -> Result<Vec<Message>, ClientError> {
        if responses.len() != self.ids.len() {
            return Err(ClientError::BatchLengthMismatch {
                expected: self.ids.len(),
                got: responses.len(),
            });
        }
        for (position, (id, resp)) in self.ids.iter().zip(&responses).enumerate() {
            if id.is_some() && resp.id != *id {
                debug!(
                    position,
                    request_id = ?id,
                    response_id = ?resp.id,
                    "response id differs from request id"
                );
            }
        }
        Ok(responses)
    }
}

/// One call of a [batch_call](Client::batch_call). The outcome is stored in `result`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchElem {
    pub method: String,
    pub params: Option<Value>,
    pub result: Option<Result<Value, ErrorObjectOwned>>,
}

impl BatchElem {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params: Some(params),
            result: None,
        }
    }
}

/// JSON-RPC client bound to one HTTP endpoint.
pub struct Client {
    conn: Arc<HttpConn>,
    next_id: AtomicU64,
}

impl Client {
    /// Create a client for `endpoint` with a default HTTP client.
    ///
    /// # Arguments
    /// * `endpoint: &str` - The URL of the JSON-RPC endpoint.
    ///
    /// # Returns
    /// * `Result<Self, ClientError>` - The client, or an error if the URL does not parse.
    pub fn dial(endpoint: &str) -> Result<Self, ClientError> {
        Self::dial_with_client(endpoint, reqwest::Client::new())
    }

    /// Create a client for `endpoint` on top of a caller supplied HTTP client.
    ///
    /// The URL is checked here so a client that would fail every request is never built.
    pub fn dial_with_client(endpoint: &str, client: reqwest::Client) -> Result<Self, ClientError> {
        let url = Url::parse(endpoint)?;
        Ok(Self {
            conn: Arc::new(HttpConn::new(client, url)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Set a header sent with every subsequent request.
    pub fn set_header(&self, name: &str, value: &str) -> Result<(), ClientError> {
        self.conn.set_header(name, value)
    }

    pub fn connection(&self) -> Arc<HttpConn> {
        self.conn.clone()
    }

    /// Close the client. Calls in flight fail with [Closed](ClientError::Closed), and so does
    /// every later call.
    pub fn close(&self) {
        self.conn.close();
    }

    pub fn is_closed(&self) -> bool {
        self.conn.closed.is_cancelled()
    }

    /// Send a single call and return its response.
    pub async fn send(&self, msg: &Message) -> Result<Message, ClientError> {
        let op = PendingCall {
            ids: vec![msg.id.clone()],
        };
        let body = self.round_trip(msg).await?;
        let resp: Message = serde_json::from_slice(&body)?;
        let mut resps = op.resolve(vec![resp])?;
        Ok(resps.remove(0))
    }

    /// Send a batch. The responses come back in request order, notifications excluded.
    pub async fn send_batch(&self, msgs: &[Message]) -> Result<Vec<Message>, ClientError> {
        let op = PendingCall::new(msgs);
        let body = self.round_trip(msgs).await?;
        // a server refusing the whole batch answers with a single error object
        let resps = if op.is_empty() && body.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            parse_payload(&body)?.0
        };
        op.resolve(resps)
    }

    /// Send a notification. Whatever the server answers is ignored.
    pub async fn notify(&self, method: &str, params: impl Serialize) -> Result<(), ClientError> {
        let msg = Message::notification(method, Some(to_params(params)?));
        self.round_trip(&msg).await?;
        Ok(())
    }

    /// Call `method` and decode its result.
    pub async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: impl Serialize,
    ) -> Result<R, ClientError> {
        let msg = Message::request(self.next_id(), method, Some(to_params(params)?));
        let resp = self.send(&msg).await?;
        if let Some(err) = resp.error {
            return Err(ClientError::Rpc(err));
        }
        Ok(serde_json::from_value(resp.result.unwrap_or(Value::Null))?)
    }

    /// Send all elements as one batch and store each outcome in its element.
    pub async fn batch_call(&self, batch: &mut [BatchElem]) -> Result<(), ClientError> {
        let msgs: Vec<Message> = batch
            .iter()
            .map(|elem| Message::request(self.next_id(), elem.method.clone(), elem.params.clone()))
            .collect();
        let resps = self.send_batch(&msgs).await?;
        for (elem, resp) in batch.iter_mut().zip(resps) {
            elem.result = Some(match resp.error {
                Some(err) => Err(err),
                None => Ok(resp.result.unwrap_or(Value::Null)),
            });
        }
        Ok(())
    }

    async fn round_trip<T: Serialize + ?Sized>(&self, msg: &T) -> Result<Bytes, ClientError> {
        if self.is_closed() {
            return Err(ClientError::Closed);
        }
        trace!(url = %self.conn.url, "sending json-rpc request");
        tokio::select! {
            res = self.conn.do_request(msg) => res,
            _ = self.conn.closed.cancelled() => Err(ClientError::Closed),
        }
    }

    fn next_id(&self) -> Value {
        Value::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

/// Encode call parameters. Absent parameters are sent as an empty array.
fn to_params(params: impl Serialize) -> Result<Value, ClientError> {
    Ok(match serde_json::to_value(params)? {
        Value::Null => Value::Array(Vec::new()),
        value => value,
    })
}
