//! File-level operations: binary download and upload over the data channel.

use crate::ftp::client::FtpClient;
use crate::ftp::connection::with_timeout;
use crate::ftp::error::{StackError, StackResult};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default chunk size for streaming transfers (64 KiB).
const DEFAULT_CHUNK: usize = 65_536;

impl FtpClient {
    // ─── DOWNLOAD (RETR) ─────────────────────────────────────────

    /// Download a remote file to a local path, replacing any existing file.
    ///
    /// A partially written local file is removed when the transfer fails.
    pub async fn download(&mut self, remote_path: &str, local_path: &Path) -> StackResult<u64> {
        let ds = self.begin_data(&format!("RETR {}", remote_path)).await?;

        let received = self.receive_into(ds, local_path).await;
        // Always consume the closing reply so the control channel stays in step.
        let finished = self.finish_data().await;

        match merge(received, finished) {
            Ok(n) => {
                log::debug!("[{}] downloaded {} ({} bytes)", self.id, remote_path, n);
                Ok(n)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(local_path).await {
                    log::warn!("could not remove partial {}: {}", local_path.display(), rm);
                }
                Err(e)
            }
        }
    }

    async fn receive_into(&self, mut ds: TcpStream, local_path: &Path) -> StackResult<u64> {
        let mut file = fs::File::create(local_path).await?;
        let mut buf = vec![0u8; DEFAULT_CHUNK];
        let mut transferred = 0u64;
        let data_timeout = self.config.data_timeout();

        loop {
            let n = with_timeout(data_timeout, "Data read", async {
                ds.read(&mut buf).await.map_err(StackError::from)
            })
            .await?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).await?;
            transferred += n as u64;
        }

        file.flush().await?;
        Ok(transferred)
    }

    // ─── UPLOAD (STOR) ───────────────────────────────────────────

    /// Upload a local file to a remote path.
    pub async fn upload(&mut self, local_path: &Path, remote_path: &str) -> StackResult<u64> {
        let file = fs::File::open(local_path).await?;
        let ds = self.begin_data(&format!("STOR {}", remote_path)).await?;

        let sent = self.send_from(file, ds).await;
        let finished = self.finish_data().await;
        let transferred = merge(sent, finished)?;
        log::debug!("[{}] uploaded {} ({} bytes)", self.id, remote_path, transferred);
        Ok(transferred)
    }

    async fn send_from(&self, mut file: fs::File, mut ds: TcpStream) -> StackResult<u64> {
        let mut buf = vec![0u8; DEFAULT_CHUNK];
        let mut transferred = 0u64;
        let data_timeout = self.config.data_timeout();
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            with_timeout(data_timeout, "Data write", async {
                ds.write_all(&buf[..n]).await.map_err(StackError::from)
            })
            .await?;
            transferred += n as u64;
        }
        ds.shutdown().await?;
        Ok(transferred)
    }
}

/// A transfer succeeds only if both the data side and the closing reply did.
/// The data-side error wins when both failed.
pub(crate) fn merge<T, R>(body: StackResult<T>, finished: StackResult<R>) -> StackResult<T> {
    match (body, finished) {
        (Ok(v), Ok(_)) => Ok(v),
        (Err(e), _) | (Ok(_), Err(e)) => Err(e),
    }
}
