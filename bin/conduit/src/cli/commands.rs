use super::args::{AuthRpcArgs, CallArgs, CreateSecretArgs, MetricsArgs, RpcArgs};
use crate::node::{call, create_secret, launch_auth_rpc, launch_http_rpc, launch_metrics};
use clap::Parser;
use std::future::pending;

/// Start the JSON-RPC servers
#[derive(Debug, Parser)]
pub struct NodeCommand {
    /// All RPC args
    #[clap(flatten)]
    rpc: RpcArgs,

    /// Authenticated RPC args
    #[clap(flatten)]
    authrpc: AuthRpcArgs,

    /// Metrics args
    #[clap(flatten)]
    metrics: MetricsArgs,
}

impl NodeCommand {
    /// Execute the command
    pub async fn execute(self) -> eyre::Result<()> {
        launch_metrics(&self.metrics)?;

        let _http = launch_http_rpc(&self.rpc).await?;
        let _auth = if self.authrpc.authrpc {
            Some(launch_auth_rpc(&self.authrpc, &self.rpc).await?)
        } else {
            None
        };

        pending::<eyre::Result<()>>().await
    }
}

/// Call a method on a JSON-RPC endpoint
#[derive(Debug, Parser)]
pub struct CallCommand {
    #[clap(flatten)]
    call: CallArgs,
}

impl CallCommand {
    /// Execute the command
    pub async fn execute(self) -> eyre::Result<()> {
        let result = call(self.call).await?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        Ok(())
    }
}

/// Create the JWT secret
#[derive(Debug, Parser)]
pub struct CreateSecretCommand {
    #[clap(flatten)]
    create_secret: CreateSecretArgs,
}

impl CreateSecretCommand {
    /// Execute the command
    pub fn execute(self) -> eyre::Result<()> {
        create_secret(self.create_secret)
    }
}
