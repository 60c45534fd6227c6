//! Data-channel management for FTP transfers.
//!
//! Passive modes only (RFC 959 + RFC 2428):
//! - **PASV**: server opens a port and returns `h1,h2,h3,h4,p1,p2`
//! - **EPSV**: server returns a port on the control-connection host

use crate::ftp::connection::with_timeout;
use crate::ftp::error::{ErrorCode, StackError, StackResult};
use crate::ftp::protocol::FtpCodec;
use crate::ftp::types::DataChannelMode;
use lazy_static::lazy_static;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})").unwrap();
    static ref EPSV_RE: Regex = Regex::new(r"\((.)(.)(.)(\d+)(.)\)").unwrap();
}

/// Open a data channel according to the configured mode.
pub async fn open_data_channel(
    codec: &mut FtpCodec,
    mode: DataChannelMode,
    host: &str,
    data_timeout: Option<Duration>,
) -> StackResult<TcpStream> {
    match mode {
        DataChannelMode::Passive => open_pasv(codec, data_timeout).await,
        DataChannelMode::ExtendedPassive => open_epsv(codec, host, data_timeout).await,
    }
}

// ─── PASV ────────────────────────────────────────────────────────────

/// Issue `PASV`, parse the response, connect to the returned address.
///
/// Response format: `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)`
async fn open_pasv(codec: &mut FtpCodec, data_timeout: Option<Duration>) -> StackResult<TcpStream> {
    let resp = codec.expect_ok("PASV").await.map_err(no_passive)?;
    let addr = parse_pasv_response(&resp.text())?;
    connect_data(addr.to_string(), data_timeout).await
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 response.
pub(crate) fn parse_pasv_response(text: &str) -> StackResult<SocketAddr> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| StackError::protocol_error(format!("Cannot parse PASV: {}", text)))?;

    let nums = (1..=6)
        .map(|i| {
            caps[i]
                .parse::<u8>()
                .map_err(|_| StackError::protocol_error("PASV number out of range"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ip = IpAddr::from([nums[0], nums[1], nums[2], nums[3]]);
    let port = u16::from(nums[4]) * 256 + u16::from(nums[5]);
    Ok(SocketAddr::new(ip, port))
}

// ─── EPSV ────────────────────────────────────────────────────────────

/// Issue `EPSV`, parse port, connect to the *same host* on that port.
///
/// Response format: `229 Entering Extended Passive Mode (|||port|)`
async fn open_epsv(codec: &mut FtpCodec, host: &str, data_timeout: Option<Duration>) -> StackResult<TcpStream> {
    let resp = codec.expect_ok("EPSV").await.map_err(no_passive)?;
    let port = parse_epsv_response(&resp.text())?;
    connect_data(format!("{}:{}", host, port), data_timeout).await
}

pub(crate) fn parse_epsv_response(text: &str) -> StackResult<u16> {
    let caps = EPSV_RE
        .captures(text)
        .ok_or_else(|| StackError::protocol_error(format!("Cannot parse EPSV: {}", text)))?;
    let delim = &caps[1];
    if &caps[2] != delim || &caps[3] != delim || &caps[5] != delim {
        return Err(StackError::protocol_error(format!("Bad EPSV delimiters: {}", text)));
    }
    caps[4]
        .parse::<u16>()
        .map_err(|_| StackError::protocol_error("EPSV port out of range"))
}

async fn connect_data(addr: String, data_timeout: Option<Duration>) -> StackResult<TcpStream> {
    with_timeout(data_timeout, "Data connect", async {
        TcpStream::connect(&addr)
            .await
            .map_err(|e| StackError::data_channel(format!("Data connect to {}: {}", addr, e)))
    })
    .await
}

/// A rejected PASV/EPSV keeps the server text but reports the passive-mode code.
fn no_passive(mut err: StackError) -> StackError {
    if err.code == ErrorCode::EXTENDED_ERROR && matches!(err.reply_code(), Some(500..=502)) {
        err.code = ErrorCode::NO_PASSIVE_MODE;
    }
    err
}
