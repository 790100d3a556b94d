//! Transport independent read/write capability used by a dispatcher.

use crate::error::CodecError;
use async_trait::async_trait;
use conduit_primitives::{Message, PeerInfo};
use serde_json::Value;
use tokio_util::sync::WaitForCancellationFuture;

/// The capability set a dispatcher needs from a transport: read one request (or batch), write
/// one response, identify the peer, and observe closure.
///
/// Transports implement different subsets meaningfully. An operation a transport cannot support
/// panics instead of silently doing nothing, so a dispatcher misusing it fails in tests.
#[async_trait]
pub trait ServerCodec: Send + Sync {
    /// Read the next request payload. The flag is true when the payload was a batch.
    async fn read_batch(&self) -> Result<(Vec<Message>, bool), CodecError>;

    /// Write one JSON value (a response or an array of responses).
    async fn write_json(&self, value: &Value) -> Result<(), CodecError>;

    /// Metadata about the remote end.
    fn peer_info(&self) -> PeerInfo;

    /// Address of the remote end.
    fn remote_addr(&self) -> String;

    /// Close the codec. Calling this more than once has no further effect.
    fn close(&self);

    /// Resolves once the codec is closed.
    fn closed(&self) -> WaitForCancellationFuture<'_>;
}
