use conduit_metrics::label::LabelValue;
use dirs::home_dir;
use expanded_pathbuf::ExpandedPathBuf;
use pin_utils::pin_mut;
use std::{future::Future, time::Duration};
use tracing::info;

/// Unwrap path or returns home directory
pub fn unwrap_path_or_home(path: Option<ExpandedPathBuf>) -> eyre::Result<ExpandedPathBuf> {
    if let Some(path) = path {
        Ok(path)
    } else {
        home_dir()
            .map(|h| h.join(".conduit"))
            .ok_or_else(|| eyre::eyre!("Get Home directory error"))
            .map(ExpandedPathBuf)
    }
}

/// Parses a duration given in seconds
pub fn parse_duration(duration: &str) -> Result<Duration, String> {
    let seconds: u64 = duration
        .parse()
        .map_err(|_| format!("{duration} must be unsigned int"))?;
    Ok(Duration::from_secs(seconds))
}

pub fn parse_label_value(label_value: &str) -> Result<LabelValue, String> {
    label_value.parse()
}

/// Runs the future to completion or until:
/// - `ctrl-c` is received.
/// - `SIGTERM` is received (unix only).
pub async fn run_until_ctrl_c<F, E>(fut: F) -> Result<(), E>
where
    F: Future<Output = Result<(), E>>,
    E: Send + Sync + 'static + From<std::io::Error>,
{
    let ctrl_c = tokio::signal::ctrl_c();

    let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let sigterm = stream.recv();
    pin_mut!(sigterm, ctrl_c, fut);

    tokio::select! {
        _ = ctrl_c => {
            info!("Received ctrl-c signal.");
        },
        _ = sigterm => {
            info!("Received SIGTERM signal.");
        },
        res = fut => res?,
    }

    Ok(())
}
