//! `Content-Length` framing for the controller/worker channel.
//!
//! Every message is `Content-Length: N\r\n\r\n{json}` where `N` counts body
//! bytes. [`FrameReader`] and [`FrameWriter`] wrap the two halves of the
//! worker's stdio pipes.

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Largest accepted body. Diagnostics for a very large source file stay well
/// under this.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Parse one header line. Returns the length for a `Content-Length` header,
/// `None` for any other header.
fn parse_header_line(line: &str) -> Result<Option<usize>> {
    let Some((key, value)) = line.split_once(':') else {
        bail!("malformed header line: {line:?}");
    };
    if !key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return Ok(None);
    }
    let len = value
        .trim()
        .parse::<usize>()
        .with_context(|| format!("invalid Content-Length value {:?}", value.trim()))?;
    Ok(Some(len))
}

/// Reads framed JSON messages from an async reader.
pub struct FrameReader<R> {
    reader: BufReader<R>,
    line: String,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line: String::new(),
        }
    }

    /// Read the next message.
    ///
    /// `Ok(None)` means the peer closed the pipe between messages.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>> {
        let Some(len) = self.read_headers().await? else {
            return Ok(None);
        };
        if len > MAX_FRAME_BYTES {
            bail!("Content-Length {len} exceeds maximum {MAX_FRAME_BYTES}");
        }

        let mut body = vec![0u8; len];
        self.reader
            .read_exact(&mut body)
            .await
            .context("reading frame body")?;
        let value = serde_json::from_slice(&body).context("parsing frame body as JSON")?;
        Ok(Some(value))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>> {
        let mut content_length = None;
        let mut started = false;

        loop {
            self.line.clear();
            let n = self
                .reader
                .read_line(&mut self.line)
                .await
                .context("reading header line")?;
            if n == 0 {
                // A close is only clean before the first header byte.
                if started {
                    bail!("pipe closed inside frame headers");
                }
                return Ok(None);
            }
            started = true;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some(len) = parse_header_line(trimmed)? {
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .context("frame is missing a Content-Length header")
    }
}

/// Writes framed JSON messages to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame<T: Serialize + ?Sized>(&mut self, message: &T) -> Result<()> {
        let body = serde_json::to_vec(message).context("serializing frame")?;
        let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());

        self.writer
            .write_all(header.as_bytes())
            .await
            .context("writing frame header")?;
        self.writer
            .write_all(&body)
            .await
            .context("writing frame body")?;
        self.writer.flush().await.context("flushing frame")?;
        Ok(())
    }
}
