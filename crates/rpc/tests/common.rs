#![allow(dead_code)]

use conduit_rpc::{
    HttpServerConfig, JsonRpcServer, JwtSecret, JwtValidator, MethodRegistry, MethodResult,
    ServerHandle,
};
use hyper::{
    header::{HeaderValue, CONTENT_TYPE},
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server,
};
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde_json::{json, Value};
use std::{
    convert::Infallible,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

pub const CHAIN_ID: &str = "0x7a69";

/// test_address returns a localhost address on a port picked by the OS.
/// This is to prevent multiple tests from using the same port.
///
/// # Returns
/// * `SocketAddr` - A localhost address with port 0.
pub fn test_address() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

pub fn test_methods() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry
        .register("eth_chainId", |_| async { MethodResult::Ok(json!(CHAIN_ID)) })
        .unwrap();
    registry
        .register("test_echo", |params| async move {
            MethodResult::Ok(params.unwrap_or(Value::Null))
        })
        .unwrap();
    registry
        .register("test_sleep", |params| async move {
            let millis = params
                .as_ref()
                .and_then(|p| p[0].as_u64())
                .unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(millis)).await;
            MethodResult::Ok(json!(millis))
        })
        .unwrap();
    registry
}

pub async fn start_server(config: HttpServerConfig) -> ServerHandle {
    JsonRpcServer::new(test_address())
        .with_config(config)
        .start(test_methods())
        .await
        .unwrap()
}

pub async fn start_auth_server(secret: &JwtSecret) -> ServerHandle {
    JsonRpcServer::new(test_address())
        .with_jwt(JwtValidator::new(secret))
        .start(test_methods())
        .await
        .unwrap()
}

pub fn endpoint(address: SocketAddr) -> String {
    format!("http://{address}")
}

pub fn build_http_client(address: SocketAddr) -> HttpClient {
    HttpClientBuilder::default()
        .build(endpoint(address))
        .unwrap()
}

/// Start a server answering every request with `reply`, whatever was asked.
///
/// # Returns
/// * `SocketAddr` - The address the server is bound to.
pub fn start_stub_server(reply: Value) -> SocketAddr {
    let reply = reply.to_string();
    let make_service = make_service_fn(move |_| {
        let reply = reply.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |_req: Request<Body>| {
                let mut response = Response::new(Body::from(reply.clone()));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                async move { Ok::<_, Infallible>(response) }
            }))
        }
    });
    let server = Server::bind(&test_address()).serve(make_service);
    let address = server.local_addr();
    tokio::spawn(server);
    address
}
