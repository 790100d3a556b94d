//! Request-scoped response sink and the incremental JSON encoder writing into it.

use crate::error::CodecError;
use conduit_primitives::constants::stream::INITIAL_BUFFER_SIZE;
use hyper::{
    body::{Bytes, Sender},
    StatusCode,
};
use serde::Serialize;
use std::{io, sync::Arc};
use tokio::sync::{oneshot, Mutex};
use tracing::warn;

/// Shared handle on the response of one request.
pub type SharedWriter = Arc<Mutex<ResponseWriter>>;

/// The HTTP response of a single request while it is being produced.
///
/// The status can change until the first body byte is written. The first write, or dropping
/// the writer, commits the status to whoever waits on the head of the response.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    head: Option<oneshot::Sender<StatusCode>>,
    body: Sender,
}

impl ResponseWriter {
    pub fn new(head: oneshot::Sender<StatusCode>, body: Sender) -> Self {
        Self {
            status: StatusCode::OK,
            head: Some(head),
            body,
        }
    }

    pub fn shared(self) -> SharedWriter {
        Arc::new(Mutex::new(self))
    }

    /// Set the status of the response. Ignored once the head is committed.
    pub fn write_header(&mut self, status: StatusCode) {
        if self.is_committed() {
            warn!(%status, committed = %self.status, "superfluous write_header call");
            return;
        }
        self.status = status;
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_committed(&self) -> bool {
        self.head.is_none()
    }

    /// Append a chunk to the body, committing the head first.
    pub async fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.commit();
        self.body
            .send_data(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body was dropped"))
    }

    fn commit(&mut self) {
        if let Some(head) = self.head.take() {
            // the receiving side is gone when the client hung up
            let _ = head.send(self.status);
        }
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        self.commit();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Array { empty: bool },
    Object { empty: bool },
}

/// Incremental JSON encoder over a [ResponseWriter](ResponseWriter).
///
/// Output is buffered and handed to the writer whenever the buffer fills up, so a large result
/// is never held in memory as a whole. Separators between elements are inserted automatically.
/// Scopes still open when [finish](JsonStream::finish) is called are closed, which keeps the
/// output well formed after a failure half way through a result.
pub struct JsonStream {
    writer: SharedWriter,
    buf: Vec<u8>,
    capacity: usize,
    scopes: Vec<Scope>,
}

impl JsonStream {
    pub fn new(writer: SharedWriter) -> Self {
        Self::with_capacity(writer, INITIAL_BUFFER_SIZE)
    }

    pub fn with_capacity(writer: SharedWriter, capacity: usize) -> Self {
        Self {
            writer,
            buf: Vec::with_capacity(capacity),
            capacity,
            scopes: Vec::new(),
        }
    }

    pub fn begin_array(&mut self) {
        self.separator();
        self.buf.push(b'[');
        self.scopes.push(Scope::Array { empty: true });
    }

    pub fn end_array(&mut self) {
        debug_assert!(matches!(self.scopes.last(), Some(Scope::Array { .. })));
        self.close_scope();
    }

    pub fn begin_object(&mut self) {
        self.separator();
        self.buf.push(b'{');
        self.scopes.push(Scope::Object { empty: true });
    }

    pub fn end_object(&mut self) {
        debug_assert!(matches!(self.scopes.last(), Some(Scope::Object { .. })));
        self.close_scope();
    }

    /// Write a value at the top level or as the next array element.
    pub async fn write_value<T: Serialize + ?Sized>(
        &mut self,
        value: &T,
    ) -> Result<(), CodecError> {
        let mark = self.mark();
        self.separator();
        if let Err(err) = serde_json::to_writer(&mut self.buf, value) {
            self.rewind(mark);
            return Err(err.into());
        }
        self.flush_if_full().await
    }

    /// Write a `"name":value` member of the innermost object.
    pub async fn write_field<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), CodecError> {
        let mark = self.mark();
        self.separator();
        let res = serde_json::to_writer(&mut self.buf, name).and_then(|_| {
            self.buf.push(b':');
            serde_json::to_writer(&mut self.buf, value)
        });
        if let Err(err) = res {
            self.rewind(mark);
            return Err(err.into());
        }
        self.flush_if_full().await
    }

    /// Write already encoded JSON as the next value.
    pub async fn write_raw(&mut self, raw: &[u8]) -> Result<(), CodecError> {
        self.separator();
        self.buf.extend_from_slice(raw);
        self.flush_if_full().await
    }

    /// Hand everything buffered so far to the response.
    pub async fn flush(&mut self) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.capacity));
        self.writer.lock().await.write(Bytes::from(chunk)).await?;
        Ok(())
    }

    /// Close every open scope and flush.
    pub async fn finish(&mut self) -> Result<(), CodecError> {
        while !self.scopes.is_empty() {
            self.close_scope();
        }
        self.flush().await
    }

    fn separator(&mut self) {
        match self.scopes.last_mut() {
            Some(Scope::Array { empty }) | Some(Scope::Object { empty }) => {
                if !*empty {
                    self.buf.push(b',');
                }
                *empty = false;
            }
            None => {}
        }
    }

    fn close_scope(&mut self) {
        match self.scopes.pop() {
            Some(Scope::Array { .. }) => self.buf.push(b']'),
            Some(Scope::Object { .. }) => self.buf.push(b'}'),
            None => {}
        }
    }

    fn mark(&self) -> (usize, Option<Scope>) {
        (self.buf.len(), self.scopes.last().copied())
    }

    // a failed element leaves no trace, including its separator
    fn rewind(&mut self, (len, scope): (usize, Option<Scope>)) {
        self.buf.truncate(len);
        if let (Some(last), Some(scope)) = (self.scopes.last_mut(), scope) {
            *last = scope;
        }
    }

    async fn flush_if_full(&mut self) -> Result<(), CodecError> {
        if self.buf.len() >= self.capacity {
            self.flush().await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{body::to_bytes, Body};
    use serde::ser::Error as _;
    use serde_json::json;

    fn writer() -> (SharedWriter, oneshot::Receiver<StatusCode>, Body) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body) = Body::channel();
        (ResponseWriter::new(head_tx, body_tx).shared(), head_rx, body)
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("nope"))
        }
    }

    #[tokio::test]
    async fn nested_scopes_get_separators() {
        let (writer, head, body) = writer();
        let mut stream = JsonStream::with_capacity(writer, 8);
        tokio::spawn(async move {
            stream.begin_array();
            stream.write_value(&1).await.unwrap();
            stream.begin_object();
            stream.write_field("a", &true).await.unwrap();
            stream.write_field("b", &json!([null])).await.unwrap();
            stream.end_object();
            stream.write_raw(b"\"raw\"").await.unwrap();
            stream.end_array();
            stream.finish().await.unwrap();
        });

        assert_eq!(head.await.unwrap(), StatusCode::OK);
        let bytes = to_bytes(body).await.unwrap();
        assert_eq!(&bytes[..], br#"[1,{"a":true,"b":[null]},"raw"]"#);
    }

    #[tokio::test]
    async fn finish_closes_open_scopes() {
        let (writer, _head, body) = writer();
        let mut stream = JsonStream::new(writer);
        tokio::spawn(async move {
            stream.begin_array();
            stream.write_value("x").await.unwrap();
            stream.begin_object();
            stream.write_field("result", &json!(1)).await.unwrap();
            assert!(stream.write_field("bad", &Unserializable).await.is_err());
            assert!(stream.write_value(&Unserializable).await.is_err());
            stream.finish().await.unwrap();
        });

        let bytes = to_bytes(body).await.unwrap();
        assert_eq!(&bytes[..], br#"["x",{"result":1}]"#);
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!(["x", {"result": 1}]));
    }

    #[tokio::test]
    async fn status_is_fixed_by_first_write() {
        let (writer, head, body) = writer();
        let task = tokio::spawn(async move {
            let mut w = writer.lock().await;
            w.write_header(StatusCode::BAD_REQUEST);
            w.write(Bytes::new()).await.unwrap();
            assert!(!w.is_committed());
            w.write(Bytes::from_static(b"{}")).await.unwrap();
            w.write_header(StatusCode::OK);
            assert_eq!(w.status(), StatusCode::BAD_REQUEST);
        });

        assert_eq!(head.await.unwrap(), StatusCode::BAD_REQUEST);
        task.await.unwrap();
        assert_eq!(&to_bytes(body).await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn dropping_the_writer_commits_the_head() {
        let (writer, head, body) = writer();
        writer.lock().await.write_header(StatusCode::SERVICE_UNAVAILABLE);
        drop(writer);
        assert_eq!(head.await.unwrap(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(to_bytes(body).await.unwrap().is_empty());
    }
}
