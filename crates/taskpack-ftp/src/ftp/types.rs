//! Shared types for the FTP crate.

use crate::ftp::error::{FtpError, FtpResult};
use bitflags::bitflags;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known FTP control port.
pub const DEFAULT_PORT: u16 = 21;

/// Credentials sent when the caller supplies none.
pub const ANONYMOUS_USER: &str = "anonymous";
pub const ANONYMOUS_PASSWORD: &str = "anonymous@";

// ─── Connection / Session ────────────────────────────────────────────

/// Passive negotiation used for the data channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DataChannelMode {
    /// `PASV`: server returns an IPv4 address and port.
    Passive,
    /// `EPSV`: server returns only a port on the control host.
    ExtendedPassive,
}

impl Default for DataChannelMode {
    fn default() -> Self {
        Self::Passive
    }
}

/// Configuration for a single FTP session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpSessionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `None` logs on anonymously.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub data_channel_mode: DataChannelMode,
    /// Remote directory to CWD into after logon.
    #[serde(default)]
    pub initial_directory: Option<String>,
    /// Base for relative local paths in transfers.
    #[serde(default)]
    pub local_directory: Option<PathBuf>,
    /// Control-connection timeout in seconds. `None` waits indefinitely.
    #[serde(default)]
    pub connect_timeout_sec: Option<u64>,
    /// Data-channel timeout in seconds. `None` waits indefinitely.
    #[serde(default)]
    pub data_timeout_sec: Option<u64>,
    /// UTF-8 encoding (OPTS UTF8 ON).
    #[serde(default = "default_true")]
    pub utf8: bool,
    /// Prefer MLSD over LIST when the server advertises it.
    #[serde(default = "default_true")]
    pub prefer_mlsd: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_true() -> bool {
    true
}

impl Default for FtpSessionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            data_channel_mode: DataChannelMode::Passive,
            initial_directory: None,
            local_directory: None,
            connect_timeout_sec: None,
            data_timeout_sec: None,
            utf8: true,
            prefer_mlsd: true,
        }
    }
}

impl FtpSessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Build a config from `ftp://[user[:password]@]host[:port][/dir]`.
    pub fn from_url(raw: &str) -> FtpResult<Self> {
        let parsed = url::Url::parse(raw)
            .map_err(|e| FtpError::configuration(format!("Invalid FTP URL '{}': {}", raw, e)))?;
        if parsed.scheme() != "ftp" {
            return Err(FtpError::configuration(format!(
                "Unsupported URL scheme '{}'",
                parsed.scheme()
            )));
        }
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FtpError::configuration("FTP URL has no host"))?;

        let username = Some(decode_url_part(parsed.username())?).filter(|u| !u.is_empty());
        let password = match parsed.password() {
            Some(p) => Some(decode_url_part(p)?).filter(|p| !p.is_empty()),
            None => None,
        };
        let initial_directory = match parsed.path() {
            "" | "/" => None,
            p => Some(decode_url_part(p)?),
        };

        Ok(Self {
            host: host.to_string(),
            port: parsed.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            initial_directory,
            ..Self::default()
        })
    }

    /// Parse a JSON config document.
    pub fn from_json(text: &str) -> FtpResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| FtpError::configuration(format!("Invalid session config: {}", e)))
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_sec.map(Duration::from_secs)
    }

    pub fn data_timeout(&self) -> Option<Duration> {
        self.data_timeout_sec.map(Duration::from_secs)
    }
}

// ─── FTP Response ────────────────────────────────────────────────────

/// A single FTP response (may be multi-line).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FtpResponse {
    pub code: u16,
    pub lines: Vec<String>,
}

impl FtpResponse {
    /// Full response text (all lines joined).
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Whether the response code indicates success (1xx–3xx).
    pub fn is_success(&self) -> bool {
        self.code < 400
    }

    /// Whether this is a positive-preliminary reply (1xx).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Whether this is a positive-completion reply (2xx).
    pub fn is_completion(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

// ─── Server Capabilities ─────────────────────────────────────────────

/// Parsed FEAT response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFeatures {
    pub mlsd: bool,
    pub utf8: bool,
    pub epsv: bool,
    pub raw_features: Vec<String>,
}

// ─── Directory Listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FtpEntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry from a directory listing (parsed from LIST or MLSD output).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpEntry {
    pub name: String,
    pub kind: FtpEntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
    pub link_target: Option<String>,
    /// MLSD fact map (e.g. "type" → "file", "size" → "1234").
    #[serde(default)]
    pub facts: HashMap<String, String>,
}

// ─── Native find records ─────────────────────────────────────────────

/// 100 ns ticks between 1601-01-01 and 1970-01-01.
const EPOCH_OFFSET_TICKS: i64 = 116_444_736_000_000_000;
const TICKS_PER_SECOND: i64 = 10_000_000;

/// A 64-bit timestamp split into two 32-bit words, counting 100 ns
/// ticks since 1601-01-01 UTC. The all-zero pair means "unknown".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileTime {
    pub high: u32,
    pub low: u32,
}

impl FileTime {
    pub const ZERO: FileTime = FileTime { high: 0, low: 0 };

    pub fn from_ticks(ticks: u64) -> Self {
        Self {
            high: (ticks >> 32) as u32,
            low: ticks as u32,
        }
    }

    pub fn ticks(self) -> u64 {
        (u64::from(self.high) << 32) | u64::from(self.low)
    }

    pub fn is_zero(self) -> bool {
        self.high == 0 && self.low == 0
    }

    /// `None` for the all-zero pair or a value past the calendar range.
    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_zero() {
            return None;
        }
        let ticks = i64::try_from(self.ticks()).ok()? - EPOCH_OFFSET_TICKS;
        let secs = ticks.div_euclid(TICKS_PER_SECOND);
        let nanos = (ticks.rem_euclid(TICKS_PER_SECOND) * 100) as u32;
        Utc.timestamp_opt(secs, nanos).single()
    }

    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        let ticks = dt.timestamp() * TICKS_PER_SECOND
            + i64::from(dt.timestamp_subsec_nanos() / 100)
            + EPOCH_OFFSET_TICKS;
        if ticks <= 0 {
            return Self::ZERO;
        }
        Self::from_ticks(ticks as u64)
    }
}

impl From<Option<DateTime<Utc>>> for FileTime {
    fn from(dt: Option<DateTime<Utc>>) -> Self {
        dt.map(|d| Self::from_datetime(&d)).unwrap_or(Self::ZERO)
    }
}

bitflags! {
    /// Attribute bitmask carried on every find record.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct FileAttributes: u32 {
        const READONLY = 0x0000_0001;
        const HIDDEN = 0x0000_0002;
        const SYSTEM = 0x0000_0004;
        const DIRECTORY = 0x0000_0010;
        const ARCHIVE = 0x0000_0020;
        const NORMAL = 0x0000_0080;
        const REPARSE_POINT = 0x0000_0400;
    }
}

/// One record produced by find-first / find-next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindData {
    /// May carry trailing NUL padding.
    pub file_name: String,
    pub attributes: FileAttributes,
    pub creation_time: FileTime,
    pub last_access_time: FileTime,
    pub last_write_time: FileTime,
    pub file_size: u64,
}

impl FindData {
    pub fn is_directory(&self) -> bool {
        self.attributes.contains(FileAttributes::DIRECTORY)
    }

    /// Name with NUL padding stripped.
    pub fn name(&self) -> &str {
        self.file_name.trim_end_matches('\0')
    }
}

/// Undo URL percent-encoding in a user, password or path component.
fn decode_url_part(part: &str) -> FtpResult<String> {
    percent_encoding::percent_decode_str(part)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|e| FtpError::configuration(format!("Invalid FTP URL component '{}': {}", part, e)))
}
