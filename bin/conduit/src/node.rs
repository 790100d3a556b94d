use crate::{
    cli::args::{AuthRpcArgs, CallArgs, CreateSecretArgs, MetricsArgs, RpcArgs},
    utils::unwrap_path_or_home,
};
use conduit_metrics::launch_metrics_exporter;
use conduit_primitives::constants::auth::JWT_SECRET_FILE;
use conduit_rpc::{
    Client, JsonRpcServer, JwtSecret, JwtValidator, MethodRegistry, MethodResult, ServerHandle,
};
use expanded_pathbuf::ExpandedPathBuf;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

/// The methods every endpoint serves.
pub fn node_methods(batch_limit: Option<usize>) -> eyre::Result<MethodRegistry> {
    let mut methods = match batch_limit {
        Some(limit) => MethodRegistry::new().with_batch_limit(limit),
        None => MethodRegistry::new(),
    };
    methods.register("web3_clientVersion", |_| async {
        MethodResult::Ok(json!(format!("conduit/v{}", env!("CARGO_PKG_VERSION"))))
    })?;
    methods.register("rpc_modules", |_| async {
        MethodResult::Ok(json!({ "web3": "1.0", "rpc": "1.0" }))
    })?;
    Ok(methods)
}

pub fn launch_metrics(args: &MetricsArgs) -> eyre::Result<()> {
    if args.enable_metrics {
        let labels = (!args.metrics_labels.is_empty())
            .then(|| args.metrics_labels.clone());
        launch_metrics_exporter(args.listen_address(), labels)?;
    }
    Ok(())
}

pub async fn launch_http_rpc(args: &RpcArgs) -> eyre::Result<ServerHandle> {
    info!("Starting JSON-RPC server...");

    let handle = JsonRpcServer::new(args.listen_address())
        .with_config(args.server_config())
        .with_cors(args.http_corsdomain.clone())
        .start(node_methods(args.batch_limit)?)
        .await?;

    info!("Started JSON-RPC server at http://{}", handle.local_addr());
    Ok(handle)
}

pub async fn launch_auth_rpc(args: &AuthRpcArgs, rpc: &RpcArgs) -> eyre::Result<ServerHandle> {
    info!("Starting authenticated JSON-RPC server...");

    let path = secret_path(args.jwt_secret.clone())?;
    let secret = JwtSecret::load_or_create(&path)
        .map_err(|error| eyre::format_err!("Could not load JWT secret: {}", error))?;
    info!("Using JWT secret from {:?}", path);

    let validator = JwtValidator::new(&secret).with_tolerance(args.tolerance);
    let handle = JsonRpcServer::new(args.listen_address())
        .with_config(rpc.server_config())
        .with_jwt(validator)
        .start(node_methods(rpc.batch_limit)?)
        .await?;

    info!("Started authenticated JSON-RPC server at http://{}", handle.local_addr());
    Ok(handle)
}

/// Perform a single call and return its result.
pub async fn call(args: CallArgs) -> eyre::Result<Value> {
    let client = Client::dial(&args.endpoint)?;

    if let Some(path) = args.jwt_secret {
        let secret = JwtSecret::from_file(&path.0)
            .map_err(|error| eyre::format_err!("Could not load JWT secret: {}", error))?;
        client.set_header("Authorization", &secret.bearer()?)?;
    }

    let params = match args.params {
        Some(params) => serde_json::from_str(&params)?,
        None => Value::Null,
    };
    let result = client.call(&args.method, params).await;
    client.close();
    Ok(result?)
}

pub fn create_secret(args: CreateSecretArgs) -> eyre::Result<()> {
    let path = secret_path(args.output_path)?;
    info!("Creating JWT secret... Storing to: {:?}", path);

    let secret = JwtSecret::random();
    secret.write_to(&path)?;
    info!("JWT secret written, {} bytes", secret.as_bytes().len());

    Ok(())
}

fn secret_path(path: Option<ExpandedPathBuf>) -> eyre::Result<PathBuf> {
    match path {
        Some(path) => Ok(path.0),
        None => Ok(unwrap_path_or_home(None)?.0.join(JWT_SECRET_FILE)),
    }
}
