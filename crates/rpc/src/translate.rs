//! GET request translation.
//!
//! A bodiless GET is turned into a synthetic single call, following
//! https://www.jsonrpc.org/historical/json-rpc-over-http.html#encoded-parameters
//! The `params` value may be base64 (URL-safe or standard alphabet) or plain escaped text.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};
use conduit_primitives::{constants::http::DEFAULT_GET_REQUEST_ID, Message};
use percent_encoding::percent_decode;
use serde_json::Value;
use url::form_urlencoded;

/// Build the call described by the query string of a GET request.
///
/// # Arguments
/// * `query: &str` - The raw query string, without the leading `?`.
///
/// # Returns
/// * `Message` - A call with a string id (`"1"` when absent) and the decoded params, if any.
pub fn translate_get(query: &str) -> Message {
    let mut method = None;
    let mut id = None;
    let mut params = None;
    for (key, value) in form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "method" if method.is_none() => method = Some(value.into_owned()),
            "id" if id.is_none() => id = Some(value.into_owned()),
            "params" if params.is_none() => params = Some(value.into_owned()),
            _ => {}
        }
    }

    let id = id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| DEFAULT_GET_REQUEST_ID.to_string());
    let params = params
        .and_then(|raw| query_unescape(&raw))
        .and_then(|raw| decode_params(&raw));
    Message::request(Value::String(id), method.unwrap_or_default(), params)
}

/// Decode the params payload: base64 first, raw bytes otherwise. Valid JSON is taken as is,
/// anything else is carried as a JSON string. An empty payload means no params.
fn decode_params(raw: &[u8]) -> Option<Value> {
    let payload = URL_SAFE
        .decode(raw)
        .or_else(|_| STANDARD.decode(raw))
        .unwrap_or_else(|_| raw.to_vec());
    if payload.is_empty() {
        return None;
    }
    Some(
        serde_json::from_slice(&payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&payload).into_owned())),
    )
}

/// Second unescape pass over an already decoded query value. Malformed escapes drop the value.
fn query_unescape(value: &str) -> Option<Vec<u8>> {
    let bytes = value.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'%'
            && !(bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
        {
            return None;
        }
    }
    let plus_decoded = value.replace('+', " ");
    Some(percent_decode(plus_decoded.as_bytes()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn base64_params_and_explicit_id() {
        let msg = translate_get("method=eth_blockNumber&id=7&params=WyJsYXRlc3QiXQ==");
        assert_eq!(msg.method.as_deref(), Some("eth_blockNumber"));
        assert_eq!(msg.id, Some(json!("7")));
        assert_eq!(msg.params, Some(json!(["latest"])));
        assert_eq!(msg.jsonrpc.as_deref(), Some("2.0"));
    }

    #[test]
    fn standard_alphabet_fallback() {
        // a '+' only survives both unescape passes when escaped twice
        let encoded = STANDARD.encode(br#"[">>>"]"#);
        assert!(encoded.contains('+'));
        let query = format!("method=m&params={}", encoded.replace('+', "%252B"));
        assert_eq!(translate_get(&query).params, Some(json!([">>>"])));
    }

    #[test]
    fn defaults_without_id_or_params() {
        let msg = translate_get("method=net_version");
        assert_eq!(msg.id, Some(json!("1")));
        assert_eq!(msg.params, None);

        let msg = translate_get("method=net_version&id=&params=");
        assert_eq!(msg.id, Some(json!("1")));
        assert_eq!(msg.params, None);
    }

    #[test]
    fn plain_and_double_escaped_params() {
        let msg = translate_get("method=eth_getBalance&params=%5B%22latest%22%5D");
        assert_eq!(msg.params, Some(json!(["latest"])));

        let msg = translate_get("method=eth_getBalance&params=%255B1%252C2%255D");
        assert_eq!(msg.params, Some(json!([1, 2])));
    }

    #[test]
    fn non_json_params_become_a_string() {
        let msg = translate_get("method=echo&params=hello%20world");
        assert_eq!(msg.params, Some(json!("hello world")));
    }

    #[test]
    fn malformed_escape_drops_params() {
        let msg = translate_get("method=echo&params=%25zz");
        assert_eq!(msg.params, None);
    }

    #[test]
    fn missing_method_is_empty() {
        let msg = translate_get("id=3");
        assert_eq!(msg.method.as_deref(), Some(""));
        assert_eq!(msg.id, Some(json!("3")));
    }
}
