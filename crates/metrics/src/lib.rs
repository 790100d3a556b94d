use crate::{http::describe_http_metrics, rpc::describe_json_rpc_metrics};
use label::LabelValue;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use metrics_util::MetricKindMask;
use std::{net::SocketAddr, time::Duration};
use tracing::info;

pub mod http;
pub mod label;
pub mod rpc;

pub fn launch_metrics_exporter(
    listen_addr: SocketAddr,
    label_value_opt: Option<Vec<LabelValue>>,
) -> Result<(), BuildError> {
    let mut builder = PrometheusBuilder::new();
    info!("launching Prometheus metrics exporter on {}", listen_addr);
    if let Some(label_values) = label_value_opt {
        for LabelValue { label, value } in label_values.iter() {
            builder = builder.add_global_label(label, value);
        }
    }
    builder
        .with_http_listener(listen_addr)
        .idle_timeout(MetricKindMask::COUNTER, Some(Duration::from_secs(10)))
        .install()?;

    describe_json_rpc_metrics();
    describe_http_metrics();
    Ok(())
}
