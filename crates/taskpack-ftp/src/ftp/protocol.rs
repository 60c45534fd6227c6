//! Low-level FTP command/response codec (RFC 959 §4).
//!
//! Handles:
//! - Sending FTP commands terminated with `\r\n`
//! - Reading single-line and multi-line replies
//! - Parsing the 3-digit reply code
//! - Remembering the last reply for extended-error lookups

use crate::ftp::error::{StackError, StackResult};
use crate::ftp::types::FtpResponse;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// The FTP command/response codec operating on split halves.
pub struct FtpCodec {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    last_reply: Option<FtpResponse>,
}

impl FtpCodec {
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (rd, wr) = stream.into_split();
        Self {
            reader: BufReader::new(rd),
            writer: wr,
            last_reply: None,
        }
    }

    /// Last reply read from the server, successful or not.
    pub fn last_reply(&self) -> Option<&FtpResponse> {
        self.last_reply.as_ref()
    }

    /// Send a raw FTP command without the trailing CRLF.
    pub async fn send_command(&mut self, cmd: &str) -> StackResult<()> {
        let line = format!("{}\r\n", cmd);
        self.writer.write_all(line.as_bytes()).await?;
        if cmd.len() >= 5 && cmd[..5].eq_ignore_ascii_case("PASS ") {
            log::trace!(">>> PASS ****");
        } else {
            log::trace!(">>> {}", cmd);
        }
        Ok(())
    }

    /// Read a single line from the control channel, CRLF stripped.
    async fn read_line(&mut self) -> StackResult<String> {
        let mut buf = Vec::new();
        let n = self.reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(StackError::disconnected("Server closed connection"));
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
    }

    /// Read a complete FTP response (possibly multi-line).
    ///
    /// Multi-line responses look like:
    /// ```text
    /// 220-Welcome to my FTP server
    /// 220-This is line 2
    /// 220 End of greeting
    /// ```
    pub async fn read_response(&mut self) -> StackResult<FtpResponse> {
        let first = self.read_line().await?;
        let code = parse_code(&first)?;
        let mut lines = vec![first];

        // "NNN-" means more lines follow until "NNN " is seen.
        let is_multi = lines[0].as_bytes().get(3) == Some(&b'-');
        if is_multi {
            let terminator = format!("{} ", code);
            loop {
                let next = self.read_line().await?;
                let done = next.starts_with(&terminator) || next == code.to_string();
                lines.push(next);
                if done {
                    break;
                }
            }
        }

        let resp = FtpResponse { code, lines };
        log::trace!("<<< {}", resp.lines.last().map(String::as_str).unwrap_or(""));
        self.last_reply = Some(resp.clone());
        Ok(resp)
    }

    /// Send a command and return the response.
    pub async fn execute(&mut self, cmd: &str) -> StackResult<FtpResponse> {
        self.send_command(cmd).await?;
        self.read_response().await
    }

    /// Send a command, expect a specific response-code class.
    pub async fn expect(&mut self, cmd: &str, expected_first_digit: u16) -> StackResult<FtpResponse> {
        let resp = self.execute(cmd).await?;
        if resp.code / 100 != expected_first_digit {
            return Err(StackError::from_reply(&resp));
        }
        Ok(resp)
    }

    /// Expect a 2xx reply.
    pub async fn expect_ok(&mut self, cmd: &str) -> StackResult<FtpResponse> {
        self.expect(cmd, 2).await
    }

    /// Read the reply that closes a data transfer; anything but 2xx fails.
    pub async fn read_completion(&mut self) -> StackResult<FtpResponse> {
        let done = self.read_response().await?;
        if !done.is_completion() {
            return Err(StackError::from_reply(&done));
        }
        Ok(done)
    }

    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

/// Parse the 3-digit reply code from the start of a line.
fn parse_code(line: &str) -> StackResult<u16> {
    let digits = line
        .get(..3)
        .filter(|d| d.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| StackError::protocol_error(format!("Invalid reply: '{}'", line)))?;
    digits
        .parse::<u16>()
        .map_err(|_| StackError::protocol_error(format!("Invalid reply code in: '{}'", line)))
}
