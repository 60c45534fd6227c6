//! The interface a session drives.
//!
//! An [`FtpStack`] is the network context (opened once per session, for the
//! current OS user). It hands out one [`FtpTransport`] per logon. Both report
//! failures as [`StackError`] codes; the session translates them.
//!
//! Transports are blocking. Handles returned by `find_first` and `command`
//! must be given back through `close_find` / `close_data`.

use crate::ftp::error::StackResult;
use crate::ftp::types::FindData;
use std::path::Path;

/// Network context that can open control connections.
pub trait FtpStack {
    type Connection: FtpTransport;

    /// Initialise the context. Calling it again while open is a no-op.
    fn open(&mut self, agent: &str) -> StackResult<()>;

    fn is_open(&self) -> bool;

    /// Connect and authenticate. `None` credentials log on anonymously.
    fn connect(
        &mut self,
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
    ) -> StackResult<Self::Connection>;

    /// Reply code and text behind the last failed `connect`.
    fn last_response_info(&self) -> (u32, String);

    /// Release the context. Safe to call more than once.
    fn close(&mut self);
}

/// An authenticated control connection.
pub trait FtpTransport {
    /// Enumeration cursor from `find_first`.
    type Find;
    /// Open data channel from `command`.
    type Data;

    fn current_directory(&mut self) -> StackResult<String>;

    fn set_current_directory(&mut self, path: &str) -> StackResult<()>;

    /// First record matching `mask`; `NO_MORE_FILES` when nothing matches.
    fn find_first(&mut self, mask: &str) -> StackResult<(FindData, Self::Find)>;

    /// Next record; `NO_MORE_FILES` once exhausted.
    fn find_next(&mut self, find: &mut Self::Find) -> StackResult<FindData>;

    fn close_find(&mut self, find: Self::Find);

    fn get_file(&mut self, remote: &str, local: &Path, fail_if_exists: bool) -> StackResult<()>;

    fn put_file(&mut self, local: &Path, remote: &str) -> StackResult<()>;

    fn rename_file(&mut self, from: &str, to: &str) -> StackResult<()>;

    fn delete_file(&mut self, path: &str) -> StackResult<()>;

    fn create_directory(&mut self, path: &str) -> StackResult<()>;

    fn remove_directory(&mut self, path: &str) -> StackResult<()>;

    /// Send a raw command. With `expect_data` a data channel is opened
    /// first and returned for reading.
    fn command(&mut self, command: &str, expect_data: bool) -> StackResult<Option<Self::Data>>;

    /// Read from an open data channel; 0 means the server finished.
    fn read_data(&mut self, data: &mut Self::Data, buf: &mut [u8]) -> StackResult<usize>;

    /// Close a data channel and consume the transfer's closing reply.
    fn close_data(&mut self, data: Self::Data) -> StackResult<()>;

    /// Reply code and text of the last server reply.
    fn last_response_info(&self) -> (u32, String);

    /// Log off. The transport is dropped afterwards.
    fn close(&mut self) -> StackResult<()>;
}
