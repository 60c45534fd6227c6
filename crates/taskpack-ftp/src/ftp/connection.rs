//! TCP transport: establishes the FTP control connection.
//!
//! Resolves the host, connects under the optional timeout from
//! `FtpSessionConfig`, and reads the welcome banner.

use crate::ftp::error::{StackError, StackResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::FtpResponse;
use std::future::Future;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};

/// Run `fut` under `limit`, or unbounded when `limit` is `None`.
pub(crate) async fn with_timeout<T, F>(limit: Option<Duration>, what: &str, fut: F) -> StackResult<T>
where
    F: Future<Output = StackResult<T>>,
{
    match limit {
        Some(dur) => tokio::time::timeout(dur, fut)
            .await
            .map_err(|_| StackError::timeout(format!("{} timed out after {:?}", what, dur)))?,
        None => fut.await,
    }
}

/// Establish the control connection and return a ready-to-use codec
/// **plus** the server welcome banner.
pub async fn connect(
    host: &str,
    port: u16,
    connect_timeout: Option<Duration>,
) -> StackResult<(FtpCodec, FtpResponse)> {
    let addr = format!("{}:{}", host, port);

    let tcp = with_timeout(connect_timeout, "TCP connect", async {
        let candidates: Vec<_> = lookup_host((host, port))
            .await
            .map_err(|e| StackError::name_not_resolved(format!("{}: {}", host, e)))?
            .collect();
        if candidates.is_empty() {
            return Err(StackError::name_not_resolved(host.to_string()));
        }

        let mut last_err = None;
        for candidate in candidates {
            match TcpStream::connect(candidate).await {
                Ok(tcp) => return Ok(tcp),
                Err(e) => last_err = Some(e),
            }
        }
        Err(StackError::connection_failed(format!(
            "TCP connect to {}: {}",
            addr,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    })
    .await?;

    tcp.set_nodelay(true).ok();

    let mut codec = FtpCodec::from_tcp(tcp);
    let banner = with_timeout(connect_timeout, "Banner", codec.read_response()).await?;
    if !banner.is_completion() {
        return Err(StackError::from_reply(&banner));
    }
    log::debug!("connected to {}: {}", addr, banner.text());
    Ok((codec, banner))
}
