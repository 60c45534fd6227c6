//! Blocking FTP session.
//!
//! Lifecycle: construct (no I/O) → [`FtpSession::log_on`] opens the stack
//! and connects → remote operations → [`FtpSession::close`] (or drop)
//! releases the connection, then the stack.
//!
//! Every remote operation fails with `NotConnected` before logon or after
//! close without touching the stack. Stack failures pass through
//! [`translate`] exactly once. One operation runs at a time; a session is
//! not meant to be shared between threads.

use crate::ftp::entry::{entry_path, remote_file_name, FtpDirectoryInfo, FtpFileInfo};
use crate::ftp::error::{translate, FtpError, FtpErrorKind, FtpResult, StackResult};
use crate::ftp::find;
use crate::ftp::socket::SocketStack;
use crate::ftp::stack::{FtpStack, FtpTransport};
use crate::ftp::types::{FindData, FtpSessionConfig, DEFAULT_PORT};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Read size used when draining a command's data channel.
pub const COMMAND_BUFFER_SIZE: usize = 8192;

/// Commands whose reply arrives over a data channel.
const DATA_VERBS: [&str; 4] = ["LIST", "NLST", "MLSD", "RETR"];
/// Commands that would need data sent by the client.
const UPLOAD_VERBS: [&str; 3] = ["STOR", "STOU", "APPE"];

pub struct FtpSession<S: FtpStack = SocketStack> {
    id: Uuid,
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
    local_directory: Option<PathBuf>,
    stack: S,
    connection: Option<S::Connection>,
}

// ─── Construction ────────────────────────────────────────────────────

impl FtpSession<SocketStack> {
    /// Anonymous session on port 21.
    pub fn new(host: impl Into<String>) -> Self {
        Self::from_config(FtpSessionConfig::new(host))
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self::from_config(FtpSessionConfig {
            port,
            ..FtpSessionConfig::new(host)
        })
    }

    pub fn with_credentials(host: impl Into<String>, username: &str, password: &str) -> Self {
        Self::with_port_and_credentials(host, DEFAULT_PORT, username, password)
    }

    pub fn with_port_and_credentials(
        host: impl Into<String>,
        port: u16,
        username: &str,
        password: &str,
    ) -> Self {
        Self::from_config(FtpSessionConfig {
            port,
            username: Some(username.to_string()),
            password: Some(password.to_string()),
            ..FtpSessionConfig::new(host)
        })
    }

    pub fn from_config(config: FtpSessionConfig) -> Self {
        let stack = SocketStack::new(config.clone());
        Self::with_stack(config, stack)
    }
}

impl<S: FtpStack> FtpSession<S> {
    /// Session over a caller-supplied stack.
    pub fn with_stack(config: FtpSessionConfig, stack: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            host: config.host,
            port: config.port,
            username: non_empty(config.username),
            password: non_empty(config.password),
            local_directory: config.local_directory,
            stack,
            connection: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn stack(&self) -> &S {
        &self.stack
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Open the stack for the current OS user. No-op when already open.
    pub fn open(&mut self) -> FtpResult<()> {
        if self.host.trim().is_empty() {
            return Err(FtpError::configuration("Host must not be empty"));
        }
        if self.stack.is_open() {
            return Ok(());
        }
        let agent = format!("taskpack-ftp/{} ({})", env!("CARGO_PKG_VERSION"), os_user());
        let stack = &mut self.stack;
        stack
            .open(&agent)
            .map_err(|e| translate(e, FtpErrorKind::Connect, || stack.last_response_info()))
    }

    /// Log on with the session's credentials (anonymous when absent).
    pub fn log_on(&mut self) -> FtpResult<()> {
        self.open()?;

        if let Some(mut previous) = self.connection.take() {
            if let Err(e) = previous.close() {
                log::debug!("[{}] closing previous connection: {}", self.id, e);
            }
        }

        let stack = &mut self.stack;
        let connection = stack
            .connect(
                &self.host,
                self.port,
                self.username.as_deref(),
                self.password.as_deref(),
            )
            .map_err(|e| translate(e, FtpErrorKind::Connect, || stack.last_response_info()))?;

        log::info!("[{}] connected to {}:{}", self.id, self.host, self.port);
        self.connection = Some(connection);
        Ok(())
    }

    /// Replace the credentials, then log on. Empty values count as absent.
    pub fn log_on_with(&mut self, username: Option<&str>, password: Option<&str>) -> FtpResult<()> {
        self.username = non_empty(username.map(str::to_string));
        self.password = non_empty(password.map(str::to_string));
        self.log_on()
    }

    /// Release the connection, then the stack. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                log::debug!("[{}] QUIT failed: {}", self.id, e);
            }
            log::info!("[{}] disconnected from {}", self.id, self.host);
        }
        if self.stack.is_open() {
            self.stack.close();
        }
    }

    // ─── Plumbing ────────────────────────────────────────────────

    fn connection(&mut self) -> FtpResult<&mut S::Connection> {
        self.connection.as_mut().ok_or_else(FtpError::not_connected)
    }

    /// Run `op` on the live connection and translate its failure.
    fn run<T, F>(&mut self, op: F) -> FtpResult<T>
    where
        F: FnOnce(&mut S::Connection) -> StackResult<T>,
    {
        let connection = self.connection()?;
        op(&mut *connection).map_err(|e| {
            translate(e, FtpErrorKind::Transfer, || connection.last_response_info())
        })
    }

    fn resolve_local(&self, path: &Path) -> PathBuf {
        match &self.local_directory {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    // ─── Working directory ───────────────────────────────────────

    pub fn get_current_directory(&mut self) -> FtpResult<String> {
        self.run(|c| c.current_directory())
    }

    pub fn set_current_directory(&mut self, path: &str) -> FtpResult<()> {
        self.run(|c| c.set_current_directory(path))
    }

    pub fn get_current_directory_info(&mut self) -> FtpResult<FtpDirectoryInfo> {
        let dir = self.get_current_directory()?;
        Ok(FtpDirectoryInfo::from_path(dir, self.id))
    }

    // ─── Enumeration ─────────────────────────────────────────────

    fn find_records(&mut self, mask: &str, directories: bool) -> FtpResult<Vec<FindData>> {
        self.run(|c| find::enumerate(c, mask, |r| r.is_directory() == directories))
    }

    /// Files in the current remote directory.
    pub fn get_files(&mut self) -> FtpResult<Vec<FtpFileInfo>> {
        let cwd = self.get_current_directory()?;
        self.get_files_matching(&cwd)
    }

    /// Files matching `mask`: a directory, a path, or a wildcard such as `/pub/*.txt`.
    pub fn get_files_matching(&mut self, mask: &str) -> FtpResult<Vec<FtpFileInfo>> {
        let records = self.find_records(mask, false)?;
        Ok(records
            .iter()
            .map(|r| FtpFileInfo::from_find_data(r, entry_path(mask, r.name()), self.id))
            .collect())
    }

    /// Subdirectories of the current remote directory.
    pub fn get_directories(&mut self) -> FtpResult<Vec<FtpDirectoryInfo>> {
        let cwd = self.get_current_directory()?;
        self.get_directories_in(&cwd)
    }

    pub fn get_directories_in(&mut self, path: &str) -> FtpResult<Vec<FtpDirectoryInfo>> {
        let records = self.find_records(path, true)?;
        Ok(records
            .iter()
            .map(|r| FtpDirectoryInfo::from_find_data(r, entry_path(path, r.name()), self.id))
            .collect())
    }

    /// True when the parent listing holds a directory named like `path`.
    /// Lookup failures count as absence.
    pub fn directory_exists(&mut self, path: &str) -> FtpResult<bool> {
        let id = self.id;
        let connection = self.connection()?;

        let trimmed = path.trim();
        let target = trimmed.trim_end_matches('/');
        if target.is_empty() {
            let mask = if trimmed.starts_with('/') { "/" } else { "" };
            return Ok(match find::probe(connection, mask) {
                Ok(_) => true,
                Err(e) if e.is_no_more_files() => true,
                Err(e) => {
                    log::debug!("[{}] directory_exists('{}'): {}", id, path, e);
                    false
                }
            });
        }

        let (parent, name) = match target.rfind('/') {
            Some(0) => ("/", &target[1..]),
            Some(pos) => (&target[..pos], &target[pos + 1..]),
            None => ("", target),
        };
        match find::enumerate(connection, parent, |r| r.is_directory() && r.name() == name) {
            Ok(found) => Ok(!found.is_empty()),
            Err(e) => {
                log::debug!("[{}] directory_exists('{}'): {}", id, path, e);
                Ok(false)
            }
        }
    }

    /// True when find-first on `path` returns a handle.
    pub fn file_exists(&mut self, path: &str) -> FtpResult<bool> {
        let id = self.id;
        let connection = self.connection()?;
        match find::probe(connection, path) {
            Ok(_) => Ok(true),
            Err(e) => {
                log::debug!("[{}] file_exists('{}'): {}", id, path, e);
                Ok(false)
            }
        }
    }

    // ─── Transfers ───────────────────────────────────────────────

    /// Download `remote` in binary mode. `local` defaults to the remote
    /// file name; relative paths resolve against the local directory.
    pub fn get_file(
        &mut self,
        remote: &str,
        local: Option<&Path>,
        fail_if_exists: bool,
    ) -> FtpResult<PathBuf> {
        self.connection()?;
        let local = match local {
            Some(p) => self.resolve_local(p),
            None => match remote_file_name(remote) {
                "" => {
                    return Err(FtpError::configuration(format!(
                        "'{}' does not name a file",
                        remote
                    )))
                }
                name => self.resolve_local(Path::new(name)),
            },
        };
        self.run(|c| c.get_file(remote, &local, fail_if_exists))?;
        log::info!("[{}] downloaded {} -> {}", self.id, remote, local.display());
        Ok(local)
    }

    /// Upload `local` in binary mode. `remote` defaults to the local base name.
    pub fn put_file(&mut self, local: &Path, remote: Option<&str>) -> FtpResult<String> {
        self.connection()?;
        let local = self.resolve_local(local);
        let remote = match remote {
            Some(r) => r.to_string(),
            None => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    FtpError::configuration(format!("'{}' does not name a file", local.display()))
                })?,
        };
        self.run(|c| c.put_file(&local, &remote))?;
        log::info!("[{}] uploaded {} -> {}", self.id, local.display(), remote);
        Ok(remote)
    }

    pub fn rename_file(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.run(|c| c.rename_file(from, to))
    }

    pub fn delete_file(&mut self, path: &str) -> FtpResult<()> {
        self.run(|c| c.delete_file(path))
    }

    pub fn create_directory(&mut self, path: &str) -> FtpResult<()> {
        self.run(|c| c.create_directory(path))
    }

    pub fn delete_directory(&mut self, path: &str) -> FtpResult<()> {
        self.run(|c| c.remove_directory(path))
    }

    // ─── Raw commands ────────────────────────────────────────────

    /// Send a raw command.
    ///
    /// `LIST`, `NLST`, `MLSD` and `RETR` return the data-channel body as
    /// text. Other commands return an empty string; their reply is
    /// available from [`FtpSession::last_response`].
    pub fn send_command(&mut self, command: &str) -> FtpResult<String> {
        self.connection()?;
        let command = command.trim();
        let verb = command
            .split_whitespace()
            .next()
            .map(str::to_ascii_uppercase)
            .ok_or_else(|| FtpError::configuration("Command must not be empty"))?;
        if UPLOAD_VERBS.contains(&verb.as_str()) {
            return Err(FtpError::configuration(format!(
                "{} needs a local source; use put_file",
                verb
            )));
        }
        let expect_data = DATA_VERBS.contains(&verb.as_str());

        let body = self.run(|c| match c.command(command, expect_data)? {
            Some(data) => drain(c, data),
            None => Ok(Vec::new()),
        })?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Code and text of the last server reply on this connection.
    pub fn last_response(&self) -> Option<(u32, String)> {
        self.connection.as_ref().map(|c| c.last_response_info())
    }

    // ─── Local side ──────────────────────────────────────────────

    /// Base directory for relative local paths in transfers.
    pub fn set_local_directory(&mut self, path: impl AsRef<Path>) -> FtpResult<()> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(FtpError::io_error(format!("{} is not a directory!", path.display())));
        }
        self.local_directory = Some(path.to_path_buf());
        Ok(())
    }

    pub fn local_directory(&self) -> Option<&Path> {
        self.local_directory.as_deref()
    }
}

impl<S: FtpStack> Drop for FtpSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Owns an open data channel and closes it on drop.
struct DataGuard<'a, T: FtpTransport> {
    transport: &'a mut T,
    data: Option<T::Data>,
}

impl<T: FtpTransport> DataGuard<'_, T> {
    fn finish(mut self) -> StackResult<()> {
        match self.data.take() {
            Some(data) => self.transport.close_data(data),
            None => Ok(()),
        }
    }
}

impl<T: FtpTransport> Drop for DataGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            if let Err(e) = self.transport.close_data(data) {
                log::debug!("closing abandoned data channel: {}", e);
            }
        }
    }
}

/// Read a data channel to the end in fixed-size chunks, then close it.
fn drain<T: FtpTransport>(transport: &mut T, data: T::Data) -> StackResult<Vec<u8>> {
    let mut guard = DataGuard {
        transport,
        data: Some(data),
    };
    let mut body = Vec::new();
    let mut buf = vec![0u8; COMMAND_BUFFER_SIZE];
    loop {
        let n = match guard.data.as_mut() {
            Some(data) => guard.transport.read_data(data, &mut buf)?,
            None => 0,
        };
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }
    guard.finish()?;
    Ok(body)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn os_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
