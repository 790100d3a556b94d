use crate::utils::{parse_duration, parse_label_value};
use clap::Parser;
use conduit_metrics::label::LabelValue;
use conduit_primitives::constants::{
    http::MAX_REQUEST_CONTENT_LENGTH,
    networking::{DEFAULT_AUTH_RPC_PORT, DEFAULT_HTTP_RPC_PORT, DEFAULT_METRICS_PORT},
};
use conduit_rpc::HttpServerConfig;
use expanded_pathbuf::ExpandedPathBuf;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

/// RPC CLI args
#[derive(Clone, Debug, Parser, PartialEq)]
pub struct RpcArgs {
    /// Sets the HTTP RPC address to listen on.
    ///
    /// By default, this option is set to `127.0.0.1`
    #[clap(long = "http.addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub http_addr: IpAddr,

    /// Sets the HTTP RPC port to listen on.
    ///
    /// By default, this option is set to `8545`
    #[clap(long = "http.port", default_value_t = DEFAULT_HTTP_RPC_PORT)]
    pub http_port: u16,

    /// Configures the allowed CORS domains.
    ///
    /// By default, this option is set to `*`.
    #[clap(long = "http.corsdomain", value_delimiter = ',', default_value = "*")]
    pub http_corsdomain: Vec<String>,

    /// Maximum size of a request body in bytes.
    #[clap(long = "rpc.maxcontentlength", default_value_t = MAX_REQUEST_CONTENT_LENGTH)]
    pub max_content_length: u64,

    /// Buffers every response instead of streaming it.
    #[clap(long = "rpc.streaming.disable")]
    pub disable_streaming: bool,

    /// Honours the `dbg: true` request header, logging the calls of that request at info level.
    #[clap(long = "rpc.dbg.singlerequest")]
    pub debug_single_request: bool,

    /// Maximum number of calls in a batch. Unlimited when not set.
    #[clap(long = "rpc.batchlimit")]
    pub batch_limit: Option<usize>,
}

impl RpcArgs {
    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.http_addr, self.http_port)
    }

    pub fn server_config(&self) -> HttpServerConfig {
        HttpServerConfig {
            max_request_content_length: self.max_content_length,
            disable_streaming: self.disable_streaming,
            debug_single_request: self.debug_single_request,
            ..Default::default()
        }
    }
}

/// Authenticated RPC CLI args
#[derive(Debug, Clone, Parser)]
pub struct AuthRpcArgs {
    /// Enables the JWT-protected RPC endpoint.
    ///
    /// By default, this option is set to false.
    /// - To enable: `--authrpc`.
    /// - To disable: no `--authrpc` flag.
    #[clap(long)]
    pub authrpc: bool,

    /// Sets the authenticated RPC address to listen on.
    #[clap(long = "authrpc.addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub authrpc_addr: IpAddr,

    /// Sets the authenticated RPC port to listen on.
    ///
    /// By default, this option is set to `8551`
    #[clap(long = "authrpc.port", default_value_t = DEFAULT_AUTH_RPC_PORT)]
    pub authrpc_port: u16,

    /// Path to the hex encoded JWT secret. Generated if the file does not exist.
    ///
    /// By default, `jwt.hex` in the data directory (`~/.conduit`).
    #[clap(long = "authrpc.jwtsecret")]
    pub jwt_secret: Option<ExpandedPathBuf>,

    /// Maximum distance in seconds between a token's issued-at claim and the server clock.
    #[clap(long = "authrpc.tolerance", value_parser = parse_duration, default_value = "60")]
    pub tolerance: Duration,
}

impl AuthRpcArgs {
    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.authrpc_addr, self.authrpc_port)
    }
}

/// Metrics CLI args
#[derive(Clone, Debug, Parser, PartialEq)]
pub struct MetricsArgs {
    /// Enables the Prometheus metrics exporter.
    #[clap(long = "metrics")]
    pub enable_metrics: bool,

    /// Sets the metrics exporter address to listen on.
    #[clap(long = "metrics.addr", default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub metrics_addr: IpAddr,

    /// Sets the metrics exporter port to listen on.
    ///
    /// By default, this option is set to `6060`
    #[clap(long = "metrics.port", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Global `label=value` pairs added to every metric.
    #[clap(long = "metrics.label", value_delimiter = ',', value_parser = parse_label_value)]
    pub metrics_labels: Vec<LabelValue>,
}

impl MetricsArgs {
    pub fn listen_address(&self) -> SocketAddr {
        SocketAddr::new(self.metrics_addr, self.metrics_port)
    }
}

/// Call CLI args
#[derive(Debug, Clone, Parser)]
pub struct CallArgs {
    /// The JSON-RPC endpoint to call.
    #[clap(long, default_value = "http://127.0.0.1:8545")]
    pub endpoint: String,

    /// Path to a hex encoded JWT secret. When set, the call carries a fresh bearer token.
    #[clap(long = "jwt-secret")]
    pub jwt_secret: Option<ExpandedPathBuf>,

    /// The method to call.
    pub method: String,

    /// The call parameters as JSON, e.g. `["latest", false]`.
    pub params: Option<String>,
}

/// Create secret CLI args
#[derive(Debug, Clone, Parser)]
pub struct CreateSecretArgs {
    /// The path where the secret will be stored.
    ///
    /// By default, `jwt.hex` in the data directory (`~/.conduit`).
    #[clap(long, short)]
    pub output_path: Option<ExpandedPathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn rpc_args_defaults() {
        let args = vec!["rpcargs"];
        assert_eq!(
            RpcArgs {
                http_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                http_port: 8545,
                http_corsdomain: vec![String::from("*")],
                max_content_length: 32 * 1024 * 1024,
                disable_streaming: false,
                debug_single_request: false,
                batch_limit: None,
            },
            RpcArgs::try_parse_from(args).unwrap()
        );
    }

    #[test]
    fn rpc_args_when_everything_is_set() {
        let args = vec![
            "rpcargs",
            "--http.addr",
            "0.0.0.0",
            "--http.port",
            "3000",
            "--http.corsdomain",
            "127.0.0.1:4321,localhost:4321",
            "--rpc.maxcontentlength",
            "1024",
            "--rpc.streaming.disable",
            "--rpc.dbg.singlerequest",
            "--rpc.batchlimit",
            "100",
        ];
        let parsed = RpcArgs::try_parse_from(args).unwrap();
        assert_eq!(
            RpcArgs {
                http_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                http_port: 3000,
                http_corsdomain: vec![
                    String::from("127.0.0.1:4321"),
                    String::from("localhost:4321")
                ],
                max_content_length: 1024,
                disable_streaming: true,
                debug_single_request: true,
                batch_limit: Some(100),
            },
            parsed
        );
        assert_eq!(parsed.listen_address(), "0.0.0.0:3000".parse().unwrap());

        let config = parsed.server_config();
        assert_eq!(config.max_request_content_length, 1024);
        assert!(config.disable_streaming);
        assert!(config.debug_single_request);
        assert_eq!(config.accepted_content_types.len(), 3);
    }

    #[test]
    fn authrpc_args() {
        let parsed = AuthRpcArgs::try_parse_from(vec!["authrpcargs"]).unwrap();
        assert!(!parsed.authrpc);
        assert_eq!(parsed.listen_address(), "127.0.0.1:8551".parse().unwrap());
        assert_eq!(parsed.tolerance, Duration::from_secs(60));
        assert!(parsed.jwt_secret.is_none());

        let parsed = AuthRpcArgs::try_parse_from(vec![
            "authrpcargs",
            "--authrpc",
            "--authrpc.port",
            "9551",
            "--authrpc.jwtsecret",
            "/tmp/jwt.hex",
            "--authrpc.tolerance",
            "5",
        ])
        .unwrap();
        assert!(parsed.authrpc);
        assert_eq!(parsed.authrpc_port, 9551);
        assert_eq!(parsed.tolerance, Duration::from_secs(5));
        assert_eq!(
            parsed.jwt_secret.map(|p| p.0),
            Some(PathBuf::from("/tmp/jwt.hex"))
        );

        let args = vec!["authrpcargs", "--authrpc.tolerance", "1m"];
        assert!(AuthRpcArgs::try_parse_from(args).is_err());
    }

    #[test]
    fn metrics_args() {
        let args = vec![
            "metricsargs",
            "--metrics",
            "--metrics.port",
            "9090",
            "--metrics.label",
            "network=devnet,node=a",
        ];
        assert_eq!(
            MetricsArgs {
                enable_metrics: true,
                metrics_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
                metrics_port: 9090,
                metrics_labels: vec![
                    LabelValue::new("network", "devnet"),
                    LabelValue::new("node", "a")
                ],
            },
            MetricsArgs::try_parse_from(args).unwrap()
        );
        let args = vec!["metricsargs", "--metrics.label", "x"];
        assert!(MetricsArgs::try_parse_from(args).is_err());
    }

    #[test]
    fn call_args() {
        let args = vec!["callargs", "eth_getBalance", r#"["0x00", "latest"]"#];
        let parsed = CallArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.endpoint, "http://127.0.0.1:8545");
        assert_eq!(parsed.method, "eth_getBalance");
        assert_eq!(parsed.params.as_deref(), Some(r#"["0x00", "latest"]"#));

        let parsed = CallArgs::try_parse_from(vec![
            "callargs",
            "--endpoint",
            "http://127.0.0.1:8551",
            "--jwt-secret",
            "/tmp/jwt.hex",
            "web3_clientVersion",
        ])
        .unwrap();
        assert!(parsed.params.is_none());
        assert!(parsed.jwt_secret.is_some());
    }
}
