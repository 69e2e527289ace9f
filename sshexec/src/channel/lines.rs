//! Line-framed draining of a remote output stream.
//!
//! Output is copied line by line: each line is re-terminated with `\n`,
//! a CRLF terminator (as produced under a PTY) collapses to `\n`, and a final
//! line without a terminator is still flushed.

use log::trace;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::error::{StreamError, StreamKind};

/// Drain `reader` until end-of-stream into a newline-normalized buffer.
pub async fn drain_lines<R>(reader: R, stream: StreamKind) -> Result<String, StreamError>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut output = String::new();
    let mut line = Vec::with_capacity(256);
    let mut lines = 0usize;

    loop {
        line.clear();
        let n = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|source| StreamError::Read { stream, source })?;
        if n == 0 {
            break;
        }
        push_line(&mut output, &line);
        lines += 1;
    }

    trace!("{}: drained {} lines ({} bytes)", stream, lines, output.len());
    Ok(output)
}

/// Append one raw line, replacing its terminator with `\n`.
fn push_line(output: &mut String, raw: &[u8]) {
    let body = raw.strip_suffix(b"\n").unwrap_or(raw);
    let body = body.strip_suffix(b"\r").unwrap_or(body);
    output.push_str(&String::from_utf8_lossy(body));
    output.push('\n');
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[tokio::test]
    async fn test_lines_are_renormalized() {
        let reader = tokio_test::io::Builder::new()
            .read(b"hello\r\nwor")
            .read(b"ld\n")
            .build();
        let out = drain_lines(reader, StreamKind::Stdout).await.unwrap();
        assert_eq!(out, "hello\nworld\n");
    }

    #[tokio::test]
    async fn test_trailing_partial_line_is_flushed() {
        let reader = tokio_test::io::Builder::new().read(b"a\nno newline").build();
        let out = drain_lines(reader, StreamKind::Stdout).await.unwrap();
        assert_eq!(out, "a\nno newline\n");
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let out = drain_lines(tokio::io::empty(), StreamKind::Stderr)
            .await
            .unwrap();
        assert_eq!(out, "");
    }

    #[tokio::test]
    async fn test_blank_lines_survive() {
        let reader = tokio_test::io::Builder::new().read(b"\n\r\nx\n").build();
        let out = drain_lines(reader, StreamKind::Stdout).await.unwrap();
        assert_eq!(out, "\n\nx\n");
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let reader = tokio_test::io::Builder::new().read(b"ok \xff\n").build();
        let out = drain_lines(reader, StreamKind::Stdout).await.unwrap();
        assert_eq!(out, "ok \u{FFFD}\n");
    }

    #[tokio::test]
    async fn test_read_error_names_stream() {
        let reader = tokio_test::io::Builder::new()
            .read(b"first\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let err = drain_lines(reader, StreamKind::Stderr).await.unwrap_err();
        match err {
            StreamError::Read { stream, source } => {
                assert_eq!(stream, StreamKind::Stderr);
                assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
            }
        }
    }
}
