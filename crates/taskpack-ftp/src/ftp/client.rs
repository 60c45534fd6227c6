//! Stateful FTP client: owns the control connection and issues commands.
//!
//! Lifecycle: `connect()` → authenticate → FEAT probing → OPTS UTF8 →
//! TYPE I → optionally CWD.
//!
//! The client exposes low-level command helpers used by `directory.rs`
//! and `file_ops.rs` for higher-level operations.

use crate::ftp::connection::{self, with_timeout};
use crate::ftp::error::{StackError, StackResult};
use crate::ftp::file_ops;
use crate::ftp::parser;
use crate::ftp::protocol::FtpCodec;
use crate::ftp::transfer;
use crate::ftp::types::*;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use uuid::Uuid;

/// A connected FTP client session.
pub struct FtpClient {
    pub id: String,
    pub codec: FtpCodec,
    pub config: FtpSessionConfig,
    pub features: ServerFeatures,
    pub banner: String,
    connected: bool,
    /// A data command got 1xx and its closing reply is still unread.
    awaiting_completion: bool,
}

impl FtpClient {
    /// Establish a new FTP session with the config's credentials.
    ///
    /// Absent credentials fall back to `anonymous` / `anonymous@`.
    pub async fn connect(config: FtpSessionConfig) -> StackResult<Self> {
        if config.host.is_empty() {
            return Err(StackError::name_not_resolved("Host must not be empty"));
        }

        let id = Uuid::new_v4().to_string();
        let (mut codec, banner) =
            connection::connect(&config.host, config.port, config.connect_timeout()).await?;

        // ── Authenticate ─────────────────────────────────────────
        let user = config.username.as_deref().unwrap_or(ANONYMOUS_USER);
        let pass = config.password.as_deref().unwrap_or(ANONYMOUS_PASSWORD);
        let user_resp = codec.execute(&format!("USER {}", user)).await?;
        match user_resp.code {
            230 => {}
            331 => {
                let pass_resp = codec.execute(&format!("PASS {}", pass)).await?;
                if !pass_resp.is_completion() {
                    return Err(StackError::from_reply(&pass_resp));
                }
            }
            _ => return Err(StackError::from_reply(&user_resp)),
        }
        log::info!("[{}] logged on to {}:{} as {}", id, config.host, config.port, user);

        // ── FEAT ─────────────────────────────────────────────────
        let features = Self::probe_features(&mut codec).await?;

        // ── OPTS UTF8 ON ─────────────────────────────────────────
        if config.utf8 && features.utf8 {
            codec.execute("OPTS UTF8 ON").await?;
        }

        // ── TYPE I ───────────────────────────────────────────────
        codec.expect_ok("TYPE I").await?;

        let mut client = Self {
            id,
            codec,
            config,
            features,
            banner: banner.text(),
            connected: true,
            awaiting_completion: false,
        };

        // ── Initial CWD ──────────────────────────────────────────
        if let Some(dir) = client.config.initial_directory.clone() {
            client.cwd(&dir).await?;
        }

        Ok(client)
    }

    // ─── PWD / CWD ───────────────────────────────────────────────

    /// Ask the server for the working directory.
    pub async fn pwd(&mut self) -> StackResult<String> {
        let resp = self.codec.expect_ok("PWD").await?;
        parse_pwd(&resp.text())
    }

    /// Change into `path`.
    pub async fn cwd(&mut self, path: &str) -> StackResult<()> {
        self.codec.expect_ok(&format!("CWD {}", path)).await?;
        Ok(())
    }

    // ─── FEAT probe ──────────────────────────────────────────────

    async fn probe_features(codec: &mut FtpCodec) -> StackResult<ServerFeatures> {
        let resp = codec.execute("FEAT").await?;
        if !resp.is_completion() {
            return Ok(ServerFeatures::default());
        }

        let raw: Vec<String> = resp
            .lines
            .iter()
            .skip(1) // "211-Features:"
            .filter(|l| !l.starts_with("211"))
            .map(|l| l.trim().to_uppercase())
            .collect();

        let has = |feat: &str| raw.iter().any(|l| l.starts_with(feat));

        Ok(ServerFeatures {
            mlsd: has("MLSD") || has("MLST"),
            utf8: has("UTF8"),
            epsv: has("EPSV"),
            raw_features: raw,
        })
    }

    // ─── Data channel helper ─────────────────────────────────────

    /// Open a passive data channel with the current configuration.
    pub async fn open_data_channel(&mut self) -> StackResult<TcpStream> {
        transfer::open_data_channel(
            &mut self.codec,
            self.config.data_channel_mode,
            &self.config.host,
            self.config.data_timeout(),
        )
        .await
    }

    /// Open a data channel and issue `cmd` on it.
    ///
    /// The caller drains or fills the returned stream, drops it, then
    /// calls [`FtpClient::finish_data`].
    pub async fn begin_data(&mut self, cmd: &str) -> StackResult<TcpStream> {
        let ds = self.open_data_channel().await?;
        let resp = self.codec.execute(cmd).await?;
        if !resp.is_preliminary() && !resp.is_completion() {
            return Err(StackError::from_reply(&resp));
        }
        self.awaiting_completion = resp.is_preliminary();
        Ok(ds)
    }

    /// Read the 226 that closes a data transfer.
    pub async fn finish_data(&mut self) -> StackResult<FtpResponse> {
        if !std::mem::take(&mut self.awaiting_completion) {
            return self
                .codec
                .last_reply()
                .cloned()
                .ok_or_else(|| StackError::invalid_state("No transfer in progress"));
        }
        with_timeout(self.config.data_timeout(), "Transfer completion", self.codec.read_completion()).await
    }

    // ─── Listing ─────────────────────────────────────────────────

    /// Retrieve a directory listing (prefers MLSD, falls back to LIST).
    pub async fn list(&mut self, path: Option<&str>) -> StackResult<Vec<FtpEntry>> {
        if self.config.prefer_mlsd && self.features.mlsd {
            match self.list_with("MLSD", path).await {
                Err(e) if matches!(e.reply_code(), Some(500..=599)) => {
                    log::debug!("[{}] MLSD rejected ({}), retrying with LIST", self.id, e.detail);
                }
                other => return other,
            }
        }
        self.list_with("LIST", path).await
    }

    async fn list_with(&mut self, verb: &str, path: Option<&str>) -> StackResult<Vec<FtpEntry>> {
        let cmd = match path {
            Some(p) => format!("{} {}", verb, p),
            None => verb.to_string(),
        };
        let data = self.retrieve_data(&cmd).await?;
        Ok(parser::parse_listing(&String::from_utf8_lossy(&data)))
    }

    /// Generic helper: open data channel, send command, collect the body.
    pub async fn retrieve_data(&mut self, cmd: &str) -> StackResult<Vec<u8>> {
        let mut ds = self.begin_data(cmd).await?;
        let mut buf = Vec::new();
        let read = with_timeout(self.config.data_timeout(), "Data read", async {
            ds.read_to_end(&mut buf).await.map_err(StackError::from)
        })
        .await;
        drop(ds);
        let finished = self.finish_data().await;
        file_ops::merge(read, finished)?;
        Ok(buf)
    }

    // ─── Raw commands ────────────────────────────────────────────

    /// Send any control command; 4xx/5xx replies become errors.
    pub async fn execute(&mut self, cmd: &str) -> StackResult<FtpResponse> {
        let resp = self.codec.execute(cmd).await?;
        if !resp.is_success() {
            return Err(StackError::from_reply(&resp));
        }
        if resp.is_preliminary() {
            // The server still owes a completion reply for this command.
            self.awaiting_completion = true;
            if let Err(e) = self.finish_data().await {
                log::debug!("[{}] '{}' closed with {}", self.id, cmd, e.detail);
            }
            return Err(StackError::invalid_state(format!(
                "'{}' opened a transfer without a data channel",
                cmd
            )));
        }
        Ok(resp)
    }

    pub fn last_response(&self) -> Option<&FtpResponse> {
        self.codec.last_reply()
    }

    // ─── QUIT ────────────────────────────────────────────────────

    /// Gracefully close the session.
    pub async fn quit(&mut self) -> StackResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        let result = self.codec.execute("QUIT").await.map(|_| ());
        self.codec.shutdown().await;
        log::debug!("[{}] session closed", self.id);
        result
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Parse `257 "/some/path"` into the path string. Doubled quotes are literal.
pub(crate) fn parse_pwd(text: &str) -> StackResult<String> {
    let start = text
        .find('"')
        .ok_or_else(|| StackError::protocol_error(format!("Cannot parse PWD: {}", text)))?;
    let mut out = String::new();
    let mut chars = text[start + 1..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                out.push('"');
                continue;
            }
            return Ok(out);
        }
        out.push(c);
    }
    Err(StackError::protocol_error(format!("Cannot parse PWD: {}", text)))
}
