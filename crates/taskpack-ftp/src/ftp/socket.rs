//! Socket-backed stack.
//!
//! [`SocketStack`] owns a single-threaded tokio runtime; that runtime is the
//! "network context" opened by `open()`. Every [`SocketConnection`] drives an
//! async [`FtpClient`] on it with `block_on`, so these types must not be used
//! from inside another tokio runtime.

use crate::ftp::client::FtpClient;
use crate::ftp::connection::with_timeout;
use crate::ftp::error::{response_info, ErrorCode, StackError, StackResult};
use crate::ftp::parser;
use crate::ftp::stack::{FtpStack, FtpTransport};
use crate::ftp::types::{FindData, FtpResponse, FtpSessionConfig};
use glob::Pattern;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};

// ─── Stack ───────────────────────────────────────────────────────────

pub struct SocketStack {
    config: FtpSessionConfig,
    runtime: Option<Arc<Runtime>>,
    agent: String,
    last_reply: Option<FtpResponse>,
}

impl SocketStack {
    /// `config` supplies data-channel mode, timeouts and the initial
    /// directory; host and credentials come from each `connect` call.
    pub fn new(config: FtpSessionConfig) -> Self {
        Self {
            config,
            runtime: None,
            agent: String::new(),
            last_reply: None,
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }
}

impl FtpStack for SocketStack {
    type Connection = SocketConnection;

    fn open(&mut self, agent: &str) -> StackResult<()> {
        if self.runtime.is_some() {
            return Ok(());
        }
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("taskpack-ftp")
            .build()
            .map_err(|e| StackError::internal(format!("Cannot create network context: {}", e)))?;
        self.runtime = Some(Arc::new(runtime));
        self.agent = agent.to_string();
        log::debug!("network context opened for {}", agent);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.runtime.is_some()
    }

    fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> StackResult<SocketConnection> {
        let runtime = self
            .runtime
            .clone()
            .ok_or_else(|| StackError::invalid_state("Network context is not open"))?;

        let config = FtpSessionConfig {
            host: host.to_string(),
            port,
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            ..self.config.clone()
        };

        self.last_reply = None;
        match runtime.block_on(FtpClient::connect(config)) {
            Ok(client) => Ok(SocketConnection { client, runtime }),
            Err(e) => {
                self.last_reply = e.reply.clone();
                Err(e)
            }
        }
    }

    fn last_response_info(&self) -> (u32, String) {
        response_info(self.last_reply.as_ref())
    }

    fn close(&mut self) {
        if self.runtime.take().is_some() {
            log::debug!("network context closed");
        }
    }
}

// ─── Connection ──────────────────────────────────────────────────────

pub struct SocketConnection {
    client: FtpClient,
    runtime: Arc<Runtime>,
}

/// Buffered listing handed out by `find_first`.
pub struct SocketFind {
    pending: VecDeque<FindData>,
}

/// An open passive data channel.
pub struct SocketData {
    stream: TcpStream,
}

impl SocketConnection {
    pub fn client(&self) -> &FtpClient {
        &self.client
    }
}

impl FtpTransport for SocketConnection {
    type Find = SocketFind;
    type Data = SocketData;

    fn current_directory(&mut self) -> StackResult<String> {
        self.runtime.block_on(self.client.pwd())
    }

    fn set_current_directory(&mut self, path: &str) -> StackResult<()> {
        self.runtime.block_on(self.client.cwd(path))
    }

    fn find_first(&mut self, mask: &str) -> StackResult<(FindData, SocketFind)> {
        let (dir, pattern) = split_mask(mask)?;
        let entries = self.runtime.block_on(self.client.list(dir.as_deref()))?;

        let mut pending: VecDeque<FindData> = entries
            .iter()
            .filter(|e| pattern.as_ref().map_or(true, |p| p.matches(&e.name)))
            .map(parser::to_find_data)
            .collect();
        log::trace!("find '{}' matched {} record(s)", mask, pending.len());

        let first = pending.pop_front().ok_or_else(StackError::no_more_files)?;
        Ok((first, SocketFind { pending }))
    }

    fn find_next(&mut self, find: &mut SocketFind) -> StackResult<FindData> {
        find.pending.pop_front().ok_or_else(StackError::no_more_files)
    }

    fn close_find(&mut self, find: SocketFind) {
        drop(find);
    }

    fn get_file(&mut self, remote: &str, local: &Path, fail_if_exists: bool) -> StackResult<()> {
        if fail_if_exists && local.exists() {
            return Err(StackError::new(
                ErrorCode::FILE_EXISTS,
                format!("{} already exists", local.display()),
            ));
        }
        self.runtime.block_on(self.client.download(remote, local))?;
        Ok(())
    }

    fn put_file(&mut self, local: &Path, remote: &str) -> StackResult<()> {
        if !local.is_file() {
            return Err(StackError::new(
                ErrorCode::FILE_NOT_FOUND,
                local.display().to_string(),
            ));
        }
        self.runtime.block_on(self.client.upload(local, remote))?;
        Ok(())
    }

    fn rename_file(&mut self, from: &str, to: &str) -> StackResult<()> {
        self.runtime.block_on(self.client.rename(from, to))
    }

    fn delete_file(&mut self, path: &str) -> StackResult<()> {
        self.runtime.block_on(self.client.delete(path))
    }

    fn create_directory(&mut self, path: &str) -> StackResult<()> {
        self.runtime.block_on(self.client.mkdir(path)).map(|_| ())
    }

    fn remove_directory(&mut self, path: &str) -> StackResult<()> {
        self.runtime.block_on(self.client.rmdir(path))
    }

    fn command(&mut self, command: &str, expect_data: bool) -> StackResult<Option<SocketData>> {
        if expect_data {
            let stream = self.runtime.block_on(self.client.begin_data(command))?;
            Ok(Some(SocketData { stream }))
        } else {
            self.runtime.block_on(self.client.execute(command))?;
            Ok(None)
        }
    }

    fn read_data(&mut self, data: &mut SocketData, buf: &mut [u8]) -> StackResult<usize> {
        let limit = self.client.config.data_timeout();
        self.runtime.block_on(with_timeout(limit, "Data read", async {
            data.stream.read(buf).await.map_err(StackError::from)
        }))
    }

    fn close_data(&mut self, data: SocketData) -> StackResult<()> {
        drop(data);
        self.runtime.block_on(self.client.finish_data()).map(|_| ())
    }

    fn last_response_info(&self) -> (u32, String) {
        response_info(self.client.last_response())
    }

    fn close(&mut self) -> StackResult<()> {
        self.runtime.block_on(self.client.quit())
    }
}

// ─── Masks ───────────────────────────────────────────────────────────

/// Split a find mask into the directory to list and an optional name glob.
///
/// - `""` lists the working directory
/// - `"/pub/*.txt"` lists `/pub` and keeps names matching `*.txt`
/// - anything else is passed to the listing command unchanged
fn split_mask(mask: &str) -> StackResult<(Option<String>, Option<Pattern>)> {
    let mask = mask.trim();
    if mask.is_empty() {
        return Ok((None, None));
    }

    let (parent, last) = match mask.rfind('/') {
        Some(0) => (Some("/"), &mask[1..]),
        Some(pos) => (Some(&mask[..pos]), &mask[pos + 1..]),
        None => (None, mask),
    };

    if !last.contains(|c: char| matches!(c, '*' | '?' | '[')) {
        return Ok((Some(mask.to_string()), None));
    }

    let pattern = Pattern::new(last)
        .map_err(|e| StackError::new(ErrorCode::INVALID_NAME, format!("'{}': {}", mask, e)))?;
    Ok((parent.map(str::to_string), Some(pattern)))
}
