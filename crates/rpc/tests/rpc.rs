mod common;

use common::{
    build_http_client, endpoint, start_auth_server, start_server, start_stub_server, test_address,
    test_methods, CHAIN_ID,
};
use conduit_primitives::Message;
use conduit_rpc::{
    error::ClientError, BatchElem, Client, HttpServerConfig, JsonRpcServer, JwtSecret,
};
use jsonrpsee::{core::client::ClientT, rpc_params};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

#[tokio::test]
async fn client_round_trip() {
    let handle = start_server(HttpServerConfig::default()).await;
    let client = Client::dial(&endpoint(handle.local_addr())).unwrap();

    let chain_id: String = client.call("eth_chainId", ()).await.unwrap();
    assert_eq!(chain_id, CHAIN_ID);

    let echoed: Value = client.call("test_echo", ("latest", 1)).await.unwrap();
    assert_eq!(echoed, json!(["latest", 1]));

    client.notify("test_echo", ["ignored"]).await.unwrap();
}

#[tokio::test]
async fn rpc_errors_surface_as_error_objects() {
    let handle = start_server(HttpServerConfig::default()).await;
    let client = Client::dial(&endpoint(handle.local_addr())).unwrap();

    match client.call::<Value>("eth_unknown", ()).await {
        Err(ClientError::Rpc(err)) => assert_eq!(err.code(), -32601),
        res => panic!("unexpected result {res:?}"),
    }
}

#[tokio::test]
async fn batch_responses_keep_request_order() {
    for disable_streaming in [false, true] {
        let config = HttpServerConfig {
            disable_streaming,
            ..Default::default()
        };
        let handle = start_server(config).await;
        let client = Client::dial(&endpoint(handle.local_addr())).unwrap();

        // the slow call finishes last but is answered first
        let mut batch = vec![
            BatchElem::new("test_sleep", json!([50])),
            BatchElem::new("test_echo", json!(["b"])),
            BatchElem::new("eth_missing", json!([])),
            BatchElem::new("eth_chainId", json!([])),
        ];
        client.batch_call(&mut batch).await.unwrap();

        assert_eq!(batch[0].result, Some(Ok(json!(50))));
        assert_eq!(batch[1].result, Some(Ok(json!(["b"]))));
        let err = batch[2].result.clone().unwrap().unwrap_err();
        assert_eq!(err.code(), -32601);
        assert_eq!(batch[3].result, Some(Ok(json!(CHAIN_ID))));
    }
}

#[tokio::test]
async fn get_requests_are_translated() {
    let handle = start_server(HttpServerConfig::default()).await;
    let base = endpoint(handle.local_addr());
    let http = reqwest::Client::new();

    let response = http
        .get(format!("{base}/?method=test_echo&id=7&params=WyJsYXRlc3QiXQ=="))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"jsonrpc": "2.0", "id": "7", "result": ["latest"]})
    );

    // empty GET health check
    let response = http.get(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn malformed_requests_are_refused() {
    let handle = start_server(HttpServerConfig::default()).await;
    let base = endpoint(handle.local_addr());
    let http = reqwest::Client::new();

    let response = http.put(&base).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = http
        .post(&base)
        .header("content-type", "text/plain")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = http
        .post(&base)
        .header("content-type", "application/json")
        .body("{\"jsonrpc\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!(-32700));

    let client = Client::dial(&endpoint(handle.local_addr())).unwrap();
    match client.send_batch(&[]).await {
        Err(ClientError::BatchLengthMismatch { expected, got }) => {
            assert_eq!((expected, got), (0, 1));
        }
        res => panic!("unexpected result {res:?}"),
    }
}

#[tokio::test]
async fn batch_responses_are_taken_by_position() {
    // the ids of the reply do not follow the request order
    let address = start_stub_server(json!([
        {"jsonrpc": "2.0", "id": 3, "result": "first"},
        {"jsonrpc": "2.0", "id": 1, "result": "second"},
        {"jsonrpc": "2.0", "id": 2, "result": "third"},
    ]));
    let client = Client::dial(&endpoint(address)).unwrap();

    let msgs: Vec<Message> = (1..=3)
        .map(|id| Message::request(json!(id), "eth_chainId", None))
        .collect();
    let resps = client.send_batch(&msgs).await.unwrap();
    assert_eq!(resps.len(), 3);
    assert_eq!(resps[0].id, Some(json!(3)));
    assert_eq!(resps[0].result, Some(json!("first")));
    assert_eq!(resps[1].id, Some(json!(1)));
    assert_eq!(resps[1].result, Some(json!("second")));
    assert_eq!(resps[2].id, Some(json!(2)));
    assert_eq!(resps[2].result, Some(json!("third")));

    let mut batch = vec![
        BatchElem::new("eth_chainId", json!([])),
        BatchElem::new("eth_chainId", json!([])),
        BatchElem::new("eth_chainId", json!([])),
    ];
    client.batch_call(&mut batch).await.unwrap();
    assert_eq!(batch[0].result, Some(Ok(json!("first"))));
    assert_eq!(batch[1].result, Some(Ok(json!("second"))));
    assert_eq!(batch[2].result, Some(Ok(json!("third"))));
}

#[tokio::test]
async fn auth_server_requires_fresh_tokens() {
    let secret = JwtSecret::random();
    let handle = start_auth_server(&secret).await;
    let client = Client::dial(&endpoint(handle.local_addr())).unwrap();

    match client.call::<String>("eth_chainId", ()).await {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body, "missing token\n");
        }
        res => panic!("unexpected result {res:?}"),
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let stale = secret.token(now - 120).unwrap();
    let bearer = format!("Bearer {stale}");
    client.set_header("Authorization", &bearer).unwrap();
    match client.call::<String>("eth_chainId", ()).await {
        Err(ClientError::Status { status, body }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(body, "stale token\n");
        }
        res => panic!("unexpected result {res:?}"),
    }

    let bearer = secret.bearer().unwrap();
    client.set_header("Authorization", &bearer).unwrap();
    let chain_id: String = client.call("eth_chainId", ()).await.unwrap();
    assert_eq!(chain_id, CHAIN_ID);
}

#[tokio::test]
async fn jsonrpsee_client_interop() {
    let handle = start_server(HttpServerConfig::default()).await;
    let client = build_http_client(handle.local_addr());

    let chain_id: String = client.request("eth_chainId", rpc_params![]).await.unwrap();
    assert_eq!(chain_id, CHAIN_ID);

    let echoed: Vec<u64> = client.request("test_echo", rpc_params![1, 2]).await.unwrap();
    assert_eq!(echoed, vec![1, 2]);

    let missing = client
        .request::<String, _>("eth_missing", rpc_params![])
        .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn close_aborts_calls_in_flight() {
    let handle = start_server(HttpServerConfig::default()).await;
    let client = Arc::new(Client::dial(&endpoint(handle.local_addr())).unwrap());

    let call = tokio::spawn({
        let client = client.clone();
        async move { client.call::<Value>("test_sleep", [5_000]).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    client.close();

    let res = tokio::time::timeout(Duration::from_secs(1), call)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(res, Err(ClientError::Closed)));
    assert!(matches!(
        client.call::<Value>("eth_chainId", ()).await,
        Err(ClientError::Closed)
    ));
}

#[tokio::test]
async fn stopped_server_refuses_connections() {
    let handle = JsonRpcServer::new(test_address())
        .with_cors(vec!["*".to_string()])
        .start(test_methods())
        .await
        .unwrap();
    let address = handle.local_addr();

    let response = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, endpoint(address))
        .header("origin", "http://localhost:3000")
        .header("access-control-request-method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["access-control-allow-origin"], "*");

    handle.stop();
    assert!(handle.is_stopped());
    handle.stopped().await;

    let client = Client::dial(&endpoint(address)).unwrap();
    assert!(matches!(
        client.call::<String>("eth_chainId", ()).await,
        Err(ClientError::Http(_))
    ));
}
