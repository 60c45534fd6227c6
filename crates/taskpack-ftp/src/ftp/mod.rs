//! FTP session core over a pluggable stack.
//!
//! Architecture:
//! - `types`: config, replies, native find records, file times, attributes
//! - `error`: stack error codes, the public `FtpError` and the translator
//! - `protocol`: low-level command/response codec
//! - `connection`: TCP control connection
//! - `transfer`: passive data channel (PASV/EPSV)
//! - `parser`: Unix/Windows/MLSD LIST parsing into find records
//! - `client`: async stateful FTP client (login, CWD, TYPE, FEAT)
//! - `directory`: mkdir, rmdir, rename, delete
//! - `file_ops`: binary download and upload
//! - `stack`: the stack/transport traits the session drives
//! - `socket`: stack implementation backed by `client` on a private runtime
//! - `find`: find-first/find-next loop with scoped handle release
//! - `entry`: `FtpFileInfo` / `FtpDirectoryInfo`
//! - `session`: the blocking `FtpSession`

pub mod types;
pub mod error;
pub mod protocol;
pub mod connection;
pub mod transfer;
pub mod parser;
pub mod client;
pub mod directory;
pub mod file_ops;
pub mod stack;
pub mod socket;
pub mod find;
pub mod entry;
pub mod session;

#[cfg(test)]
mod testing;

pub use client::FtpClient;
pub use entry::{FtpDirectoryInfo, FtpFileInfo};
pub use error::{ErrorCode, FtpError, FtpErrorKind, FtpResult, StackError, StackResult};
pub use session::FtpSession;
pub use socket::{SocketConnection, SocketStack};
pub use stack::{FtpStack, FtpTransport};
pub use types::*;
