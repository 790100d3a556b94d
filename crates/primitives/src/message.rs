//! JSON-RPC message envelope

use crate::constants::rpc::JSONRPC_VERSION;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A JSON-RPC request, notification or response.
///
/// Fields present on the wire with a JSON `null` value (`"id": null`, `"result": null`) are kept as
/// `Some(Value::Null)`, so a response carrying a null result is still a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub params: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObjectOwned>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Message {
    /// Create a method call.
    pub fn request(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.into()),
            id: Some(id),
            method: Some(method.into()),
            params,
            ..Default::default()
        }
    }

    /// Create a method call that expects no response.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.into()),
            method: Some(method.into()),
            params,
            ..Default::default()
        }
    }

    /// Create a successful response.
    pub fn response(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.into()),
            id: Some(id),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Create an error response. Use `Value::Null` when the request id is unknown.
    pub fn error_response(id: Value, error: ErrorObjectOwned) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.into()),
            id: Some(id),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn is_call(&self) -> bool {
        self.method.is_some() && self.has_valid_id()
    }

    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none()
            && self.has_valid_id()
            && (self.result.is_some() || self.error.is_some())
    }

    fn has_valid_id(&self) -> bool {
        matches!(self.id, Some(Value::Number(_)) | Some(Value::String(_)))
    }
}

/// Decode a request payload into its messages.
///
/// The boolean is true when the payload is a JSON array (a batch), which is decided by the first
/// non-whitespace byte.
pub fn parse_payload(payload: &[u8]) -> Result<(Vec<Message>, bool), serde_json::Error> {
    if is_batch(payload) {
        Ok((serde_json::from_slice(payload)?, true))
    } else {
        Ok((vec![serde_json::from_slice(payload)?], false))
    }
}

fn is_batch(payload: &[u8]) -> bool {
    payload
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[')
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonrpsee::types::ErrorObject;
    use serde_json::json;

    #[test]
    fn null_result_is_kept() {
        let msg: Message =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":null}"#).unwrap();
        assert_eq!(msg.result, Some(Value::Null));
        assert!(msg.is_response());
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"jsonrpc": "2.0", "id": 1, "result": null})
        );
    }

    #[test]
    fn absent_fields_are_omitted() {
        let msg = Message::notification("eth_subscription", None);
        assert!(msg.is_notification());
        assert!(!msg.is_call());
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"jsonrpc": "2.0", "method": "eth_subscription"})
        );
    }

    #[test]
    fn error_response_shape() {
        let msg = Message::error_response(
            Value::Null,
            ErrorObject::owned(-32700, "parse error", None::<bool>),
        );
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": {"code": -32700, "message": "parse error"}
            })
        );
    }

    #[test]
    fn payload_batch_detection() {
        let payload = b"  \n[{\"id\":1,\"method\":\"a\"},{\"id\":2,\"method\":\"b\"}]";
        let (msgs, batch) = parse_payload(payload).unwrap();
        assert!(batch);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].method.as_deref(), Some("b"));

        let (msgs, batch) = parse_payload(br#"{"id":"x","method":"a","params":[]}"#).unwrap();
        assert!(!batch);
        assert_eq!(msgs[0].id, Some(json!("x")));
        assert_eq!(msgs[0].params, Some(json!([])));

        let (msgs, batch) = parse_payload(b"[]").unwrap();
        assert!(batch);
        assert!(msgs.is_empty());

        assert!(parse_payload(b"{\"id\":").is_err());
    }
}
