//! Error types and the stack-to-session error translator.
//!
//! Two layers:
//! - [`StackError`] is reported by a stack: a numeric [`ErrorCode`] plus detail.
//! - [`FtpError`] is reported by a session: a kind, an optional code and a message.
//!
//! [`translate`] maps the former to the latter. When the stack code is
//! [`ErrorCode::EXTENDED_ERROR`] the server's own reply text is fetched with
//! one follow-up call and carried in the message.

use crate::ftp::types::FtpResponse;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// Longest server text kept by an extended-error lookup.
pub const MAX_RESPONSE_INFO: usize = 8192;

// ─── Stack error codes ───────────────────────────────────────────────

/// Numeric code reported by a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const FILE_NOT_FOUND: ErrorCode = ErrorCode(2);
    pub const ACCESS_DENIED: ErrorCode = ErrorCode(5);
    /// Enumeration exhausted. Not a failure.
    pub const NO_MORE_FILES: ErrorCode = ErrorCode(18);
    pub const FILE_EXISTS: ErrorCode = ErrorCode(80);
    pub const INVALID_NAME: ErrorCode = ErrorCode(123);
    pub const INTERNET_TIMEOUT: ErrorCode = ErrorCode(12002);
    /// The server rejected the request; its reply holds the detail.
    pub const EXTENDED_ERROR: ErrorCode = ErrorCode(12003);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(12004);
    pub const NAME_NOT_RESOLVED: ErrorCode = ErrorCode(12007);
    pub const INCORRECT_HANDLE_STATE: ErrorCode = ErrorCode(12019);
    pub const CANNOT_CONNECT: ErrorCode = ErrorCode(12029);
    pub const CONNECTION_ABORTED: ErrorCode = ErrorCode(12030);
    pub const CONNECTION_RESET: ErrorCode = ErrorCode(12031);
    pub const FTP_DROPPED: ErrorCode = ErrorCode(12111);
    pub const NO_PASSIVE_MODE: ErrorCode = ErrorCode(12112);
    pub const INVALID_SERVER_RESPONSE: ErrorCode = ErrorCode(12152);

    pub fn description(self) -> &'static str {
        match self {
            Self::FILE_NOT_FOUND => "The system cannot find the file specified",
            Self::ACCESS_DENIED => "Access is denied",
            Self::NO_MORE_FILES => "There are no more files",
            Self::FILE_EXISTS => "The file exists",
            Self::INVALID_NAME => "The filename, directory name, or volume label syntax is incorrect",
            Self::INTERNET_TIMEOUT => "The operation timed out",
            Self::EXTENDED_ERROR => "An extended error was returned from the server",
            Self::INTERNAL_ERROR => "An internal error occurred",
            Self::NAME_NOT_RESOLVED => "The server name could not be resolved",
            Self::INCORRECT_HANDLE_STATE => {
                "The requested operation cannot be carried out in the current handle state"
            }
            Self::CANNOT_CONNECT => "The attempt to connect to the server failed",
            Self::CONNECTION_ABORTED => "The connection with the server has been terminated",
            Self::CONNECTION_RESET => "The connection with the server has been reset",
            Self::FTP_DROPPED => "The FTP operation was not completed because the session was aborted",
            Self::NO_PASSIVE_MODE => "Passive mode is not available on the server",
            Self::INVALID_SERVER_RESPONSE => "The server response could not be parsed",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─── StackError ──────────────────────────────────────────────────────

/// Failure reported by a stack or the async client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackError {
    pub code: ErrorCode,
    pub detail: String,
    /// Reply that caused the failure, when the server sent one.
    pub reply: Option<FtpResponse>,
}

pub type StackResult<T> = Result<T, StackError>;

impl StackError {
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: detail.into(),
            reply: None,
        }
    }

    pub fn no_more_files() -> Self {
        Self::new(ErrorCode::NO_MORE_FILES, "")
    }

    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CANNOT_CONNECT, msg)
    }

    pub fn name_not_resolved(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NAME_NOT_RESOLVED, msg)
    }

    pub fn protocol_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_SERVER_RESPONSE, msg)
    }

    pub fn data_channel(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::NO_PASSIVE_MODE, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNET_TIMEOUT, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FTP_DROPPED, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, msg)
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::INCORRECT_HANDLE_STATE, msg)
    }

    /// A 4xx/5xx reply. Always extended: the text is fetched separately.
    pub fn from_reply(resp: &FtpResponse) -> Self {
        Self {
            code: ErrorCode::EXTENDED_ERROR,
            detail: resp.text(),
            reply: Some(resp.clone()),
        }
    }

    pub fn reply_code(&self) -> Option<u16> {
        self.reply.as_ref().map(|r| r.code)
    }

    pub fn is_no_more_files(&self) -> bool {
        self.code == ErrorCode::NO_MORE_FILES
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            write!(f, "[stack {}] {}", self.code, self.code.description())
        } else {
            write!(f, "[stack {}] {}: {}", self.code, self.code.description(), self.detail)
        }
    }
}

impl std::error::Error for StackError {}

impl From<io::Error> for StackError {
    fn from(e: io::Error) -> Self {
        let code = match e.kind() {
            io::ErrorKind::NotFound => ErrorCode::FILE_NOT_FOUND,
            io::ErrorKind::PermissionDenied => ErrorCode::ACCESS_DENIED,
            io::ErrorKind::AlreadyExists => ErrorCode::FILE_EXISTS,
            io::ErrorKind::TimedOut => ErrorCode::INTERNET_TIMEOUT,
            io::ErrorKind::ConnectionRefused => ErrorCode::CANNOT_CONNECT,
            io::ErrorKind::ConnectionReset => ErrorCode::CONNECTION_RESET,
            io::ErrorKind::ConnectionAborted => ErrorCode::CONNECTION_ABORTED,
            io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe => ErrorCode::FTP_DROPPED,
            _ => ErrorCode::INTERNAL_ERROR,
        };
        Self::new(code, e.to_string())
    }
}

// ─── FtpError ────────────────────────────────────────────────────────

/// Categorised session error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    /// Stack code, or the server reply code for extended errors.
    pub code: Option<u32>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// Operation attempted without a live connection.
    NotConnected,
    /// Opening the stack or logging on failed.
    Connect,
    /// A remote operation failed with a stack code.
    Transfer,
    /// The server rejected a request; the message is its reply text.
    ProtocolExtended,
    /// Bad arguments or session state supplied by the caller.
    Configuration,
    /// Local filesystem failure.
    Io,
}

pub type FtpResult<T> = Result<T, FtpError>;

pub const NOT_CONNECTED_MESSAGE: &str =
    "The user is not connected to the FTP server. Please connect and try again.";

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: msg.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn not_connected() -> Self {
        Self::new(FtpErrorKind::NotConnected, NOT_CONNECTED_MESSAGE)
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Configuration, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Io, msg)
    }

    /// Generic path: code plus the code's description and any detail.
    pub fn generic(kind: FtpErrorKind, err: &StackError) -> Self {
        let message = if err.detail.is_empty() {
            format!("Error code: {}. {}", err.code, err.code.description())
        } else {
            format!(
                "Error code: {}. {} ({})",
                err.code,
                err.code.description(),
                err.detail
            )
        };
        Self::new(kind, message).with_code(err.code.0)
    }

    /// Extended path: the server's reply code and text.
    pub fn extended(kind: FtpErrorKind, reply_code: u32, text: impl Into<String>) -> Self {
        Self::new(kind, text).with_code(reply_code)
    }

    pub fn is_not_connected(&self) -> bool {
        self.kind == FtpErrorKind::NotConnected
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[FTP {:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<io::Error> for FtpError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

// ─── Translator ──────────────────────────────────────────────────────

/// Turn a stack failure into a session error.
///
/// `context` is the kind used for the generic path: `Connect` during logon,
/// `Transfer` elsewhere. For [`ErrorCode::EXTENDED_ERROR`] `last_response` is
/// called exactly once; during logon the result keeps the `Connect` kind.
pub fn translate<F>(err: StackError, context: FtpErrorKind, last_response: F) -> FtpError
where
    F: FnOnce() -> (u32, String),
{
    if err.code == ErrorCode::EXTENDED_ERROR {
        let (reply_code, text) = last_response();
        let kind = if context == FtpErrorKind::Connect {
            FtpErrorKind::Connect
        } else {
            FtpErrorKind::ProtocolExtended
        };
        log::debug!("extended error {}: {}", reply_code, text);
        return FtpError::extended(kind, reply_code, text);
    }
    log::debug!("stack error {}: {}", err.code, err.detail);
    FtpError::generic(context, &err)
}

/// Reply code and text of `resp`, bounded to [`MAX_RESPONSE_INFO`] bytes.
pub fn response_info(resp: Option<&FtpResponse>) -> (u32, String) {
    match resp {
        Some(r) => {
            let mut text = r.text();
            if text.len() > MAX_RESPONSE_INFO {
                let mut cut = MAX_RESPONSE_INFO;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            (u32::from(r.code), text)
        }
        None => (0, String::new()),
    }
}
