use crate::{
    auth::JwtValidator,
    context::ConnectionInfo,
    dispatch::Dispatcher,
    handler::{HttpServerConfig, RpcHandler},
    middleware::JwtAuthLayer,
};
use conduit_metrics::http::HttpMetricsLayer;
use hyper::{http::HeaderValue, server::conn::Http, Body, Method, Request, Response};
use std::{error::Error, io, net::SocketAddr};
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tower::{Service, ServiceBuilder};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

/// JsonRpcServer serves a [Dispatcher](Dispatcher) over HTTP.
pub struct JsonRpcServer {
    /// The address to listen on.
    listen_address: SocketAddr,
    /// Limits and switches of the request handler.
    config: HttpServerConfig,
    /// The [cors layer](CorsLayer) to filter requests.
    cors_layer: Option<CorsLayer>,
    /// The [jwt layer](JwtAuthLayer) gating every request.
    jwt_layer: Option<JwtAuthLayer>,
}

impl JsonRpcServer {
    /// Create a new JsonRpcServer.
    ///
    /// # Arguments
    /// * `listen_address: SocketAddr` - The address to listen on, port 0 picks a free port.
    ///
    /// # Returns
    /// * `Self` - A new [JsonRpcServer](JsonRpcServer) instance.
    pub fn new(listen_address: SocketAddr) -> Self {
        Self {
            listen_address,
            config: HttpServerConfig::default(),
            cors_layer: None,
            jwt_layer: None,
        }
    }

    /// Replace the handler configuration.
    pub fn with_config(mut self, config: HttpServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a cors layer to the server.
    ///
    /// # Arguments
    /// * `cors_domain: Vec<String>` - A list of CORS filters in the form of String.
    ///
    /// # Returns
    /// * `Self` - A new [JsonRpcServer](JsonRpcServer) instance.
    pub fn with_cors(mut self, cors_domain: Vec<String>) -> Self {
        let methods = [Method::POST, Method::GET, Method::OPTIONS];
        let cors_layer = if cors_domain.iter().any(|d| d == "*") {
            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods(methods)
                .allow_origin(Any)
        } else {
            let mut origins: Vec<HeaderValue> = vec![];

            for domain in cors_domain.iter() {
                if let Ok(origin) = domain.parse::<HeaderValue>() {
                    origins.push(origin);
                }
            }

            CorsLayer::new()
                .allow_headers(Any)
                .allow_methods(methods)
                .allow_origin(AllowOrigin::list(origins))
        };

        self.cors_layer = Some(cors_layer);
        self
    }

    /// Require a valid bearer token on every request.
    ///
    /// # Arguments
    /// * `validator: JwtValidator` - The validator holding the shared secret.
    ///
    /// # Returns
    /// * `Self` - The JsonRpcServer instance.
    pub fn with_jwt(mut self, validator: JwtValidator) -> Self {
        self.jwt_layer = Some(JwtAuthLayer::new(validator));
        self
    }

    /// Start the [json RPC server](JsonRpcServer)
    ///
    /// # Returns
    /// * `io::Result<ServerHandle>` - The [handle](ServerHandle) of the server.
    pub async fn start<D: Dispatcher>(&self, dispatcher: D) -> io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;

        let service = ServiceBuilder::new()
            .layer(HttpMetricsLayer::new())
            .option_layer(self.cors_layer.clone())
            .option_layer(self.jwt_layer.clone())
            .service(RpcHandler::new(dispatcher, self.config.clone()));

        info!(
            address = %local_addr,
            auth = self.jwt_layer.is_some(),
            "JSON-RPC HTTP server started"
        );
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(listener, service, shutdown.clone()));
        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }
}

/// Handle of a running [JsonRpcServer](JsonRpcServer).
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections. Open connections finish their in-flight requests and are
    /// closed, requests queued behind them are answered with 503.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Wait until the accept loop exits.
    pub async fn stopped(self) {
        if let Err(err) = self.task.await {
            warn!(%err, "JSON-RPC HTTP server task failed");
        }
    }
}

async fn accept_loop<S>(listener: TcpListener, service: S, shutdown: CancellationToken)
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>>,
    S::Future: Send + 'static,
{
    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "failed to accept connection");
                    continue;
                }
            },
        };

        let cancel = shutdown.child_token();
        let info = ConnectionInfo::new(remote_addr, cancel.clone());
        let service = ServiceBuilder::new()
            .map_request(move |mut req: Request<Body>| {
                req.extensions_mut().insert(info.clone());
                req
            })
            .service(service.clone());
        tokio::spawn(serve_connection(stream, service, cancel));
    }
    info!("JSON-RPC HTTP server stopped");
}

async fn serve_connection<S>(stream: TcpStream, service: S, cancel: CancellationToken)
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    S::Error: Into<Box<dyn Error + Send + Sync>>,
    S::Future: Send + 'static,
{
    let conn = Http::new().serve_connection(stream, service);
    tokio::pin!(conn);
    let mut draining = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(err) = res {
                    debug!(%err, "http connection error");
                }
                break;
            }
            _ = cancel.cancelled(), if !draining => {
                draining = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
    // requests of this connection still waiting for dispatch see the cancellation
    cancel.cancel();
}
