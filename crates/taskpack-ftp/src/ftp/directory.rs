//! Directory operations: mkdir, rmdir, rename, delete.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{StackError, StackResult};

impl FtpClient {
    // ─── MKD ─────────────────────────────────────────────────────

    /// Create a directory on the remote server.
    pub async fn mkdir(&mut self, path: &str) -> StackResult<String> {
        let resp = self.codec.expect_ok(&format!("MKD {}", path)).await?;
        // "257 \"/new/dir\" created"
        Ok(crate::ftp::client::parse_pwd(&resp.text()).unwrap_or_else(|_| path.to_string()))
    }

    // ─── RMD ─────────────────────────────────────────────────────

    /// Remove an empty directory.
    pub async fn rmdir(&mut self, path: &str) -> StackResult<()> {
        self.codec.expect_ok(&format!("RMD {}", path)).await?;
        Ok(())
    }

    // ─── RNFR / RNTO ─────────────────────────────────────────────

    /// Rename (or move) a file or directory.
    pub async fn rename(&mut self, from: &str, to: &str) -> StackResult<()> {
        let rnfr = self.codec.execute(&format!("RNFR {}", from)).await?;
        if !rnfr.is_success() {
            return Err(StackError::from_reply(&rnfr));
        }
        self.codec.expect_ok(&format!("RNTO {}", to)).await?;
        Ok(())
    }

    // ─── DELE ────────────────────────────────────────────────────

    /// Delete a remote file.
    pub async fn delete(&mut self, path: &str) -> StackResult<()> {
        self.codec.expect_ok(&format!("DELE {}", path)).await?;
        Ok(())
    }
}
