//! Protocol client for tests.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// How long a reply may take before a read is considered hung.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed `Q` reply. Values are kept as the daemon formatted them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub exec: Option<String>,
    pub prog: Option<String>,
    pub pos: Option<String>,
}

impl Status {
    /// Elapsed run time in seconds, if a program is running.
    pub fn exec_seconds(&self) -> Option<f64> {
        self.exec.as_deref().and_then(|value| value.parse().ok())
    }

    /// Parses the three `Q` reply lines.
    pub fn parse(lines: &[String]) -> anyhow::Result<Self> {
        let [exec, prog, pos] = lines else {
            bail!("expected 3 status lines, got {lines:?}");
        };
        Ok(Self {
            exec: field(exec, "EXEC=")?,
            prog: field(prog, "PROG=")?,
            pos: field(pos, "POS=")?,
        })
    }
}

fn field(line: &str, prefix: &str) -> anyhow::Result<Option<String>> {
    let value = line
        .strip_prefix(prefix)
        .ok_or_else(|| anyhow!("expected {prefix} line, got {line:?}"))?;
    Ok((!value.is_empty()).then(|| value.to_string()))
}

/// A TCP client speaking the control protocol.
pub struct TestClient {
    stream: TcpStream,
    pending: String,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to {addr}"))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            pending: String::new(),
        })
    }

    /// Sends one raw chunk.
    pub async fn send(&mut self, chunk: &str) -> anyhow::Result<()> {
        self.stream.write_all(chunk.as_bytes()).await?;
        Ok(())
    }

    /// Reads `count` CRLF-terminated lines (without the terminators).
    pub async fn read_lines(&mut self, count: usize) -> anyhow::Result<Vec<String>> {
        let mut lines = Vec::with_capacity(count);
        while lines.len() < count {
            if let Some(end) = self.pending.find("\r\n") {
                let line = self.pending[..end].to_string();
                self.pending.drain(..end + 2);
                lines.push(line);
                continue;
            }

            let mut buf = [0u8; 1024];
            let len = tokio::time::timeout(REPLY_TIMEOUT, self.stream.read(&mut buf))
                .await
                .context("timed out waiting for reply")??;
            if len == 0 {
                bail!("connection closed after {} of {count} lines", lines.len());
            }
            self.pending.push_str(&String::from_utf8_lossy(&buf[..len]));
        }
        Ok(lines)
    }

    /// Sends a chunk and returns the raw reply made of `lines` lines.
    pub async fn request(&mut self, chunk: &str, lines: usize) -> anyhow::Result<String> {
        self.send(chunk).await?;
        let reply = self.read_lines(lines).await?;
        Ok(reply.iter().map(|line| format!("{line}\r\n")).collect())
    }

    /// Sends a chunk expecting a single-line reply (`OK` or `ERROR=...`).
    pub async fn command(&mut self, chunk: &str) -> anyhow::Result<String> {
        self.request(chunk, 1).await
    }

    /// Sends `Q` and parses the reply.
    pub async fn query(&mut self) -> anyhow::Result<Status> {
        self.send("Q\n").await?;
        let lines = self.read_lines(3).await?;
        Status::parse(&lines)
    }

    /// Waits up to `within` for the daemon to close the connection.
    pub async fn closed_within(&mut self, within: Duration) -> bool {
        let mut buf = [0u8; 64];
        loop {
            match tokio::time::timeout(within, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return true,
                // Stray data; keep waiting for the close
                Ok(Ok(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Whether nothing arrives for `period`.
    pub async fn silent_for(&mut self, period: Duration) -> bool {
        if !self.pending.is_empty() {
            return false;
        }
        let mut buf = [0u8; 64];
        matches!(
            tokio::time::timeout(period, self.stream.read(&mut buf)).await,
            Err(_)
        )
    }
}
