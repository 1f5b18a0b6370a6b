//! Plain TCP downloader
//!
//! Connects, arms a read deadline once reading starts, and reads exactly
//! the requested number of bytes. Extra bytes on the wire are left unread.

use crate::downloaders::{Downloader, OnBytes};
use crate::error::JobError;
use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on the buffer reserved before any byte arrives
const INITIAL_CAPACITY: usize = 64 * 1024;

fn timed_out() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "i/o timeout")
}

/// Downloader reading raw bytes from a TCP connection
#[derive(Debug, Clone)]
pub struct TcpDownloader {
    address: String,
    dial_timeout: Duration,
}

impl TcpDownloader {
    /// Create a downloader bound to `address` and its connect timeout
    pub fn new(address: impl Into<String>, dial_timeout: Duration) -> Self {
        Self {
            address: address.into(),
            dial_timeout,
        }
    }

    /// Address this downloader connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<TcpStream, JobError> {
        let dial_error = |source| JobError::Dial {
            address: self.address.clone(),
            source,
        };

        match tokio::time::timeout(self.dial_timeout, TcpStream::connect(self.address.as_str()))
            .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(err)) => Err(dial_error(err)),
            Err(_) => Err(dial_error(timed_out())),
        }
    }
}

/// `local->peer` description of a connection for error messages
fn describe(stream: &TcpStream) -> String {
    match (stream.local_addr(), stream.peer_addr()) {
        (Ok(local), Ok(peer)) => format!("{}->{}", local, peer),
        (_, Ok(peer)) => peer.to_string(),
        _ => "connection".to_string(),
    }
}

/// Read until `buf` holds `content_length` bytes, EOF, or the deadline
async fn read_exact_within(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    content_length: u64,
    read_timeout: Duration,
) -> Result<(), JobError> {
    if read_timeout.is_zero() {
        return Err(JobError::Read {
            connection: describe(stream),
            source: timed_out(),
        });
    }
    let deadline = tokio::time::Instant::now() + read_timeout;

    while (buf.len() as u64) < content_length {
        let remaining = content_length - buf.len() as u64;
        // read_buf fills spare capacity; keep at least some free and never
        // more than what is still owed.
        let want = usize::try_from(remaining)
            .unwrap_or(usize::MAX)
            .min(INITIAL_CAPACITY);
        buf.reserve(want);

        let mut limited = (&mut *stream).take(remaining);
        let read = tokio::time::timeout_at(deadline, limited.read_buf(buf)).await;

        match read {
            Ok(Ok(0)) => {
                return Err(JobError::ShortRead {
                    expected: content_length,
                    received: buf.len() as u64,
                })
            }
            Ok(Ok(_)) => {}
            Ok(Err(err)) => {
                return Err(JobError::Read {
                    connection: describe(stream),
                    source: err,
                })
            }
            Err(_) => {
                return Err(JobError::Read {
                    connection: describe(stream),
                    source: timed_out(),
                })
            }
        }
    }

    Ok(())
}

#[async_trait]
impl Downloader for TcpDownloader {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn download(
        &self,
        content_length: u64,
        read_timeout: Duration,
        on_bytes: OnBytes<'_>,
    ) -> Result<(), JobError> {
        debug!(address = %self.address, timeout = ?self.dial_timeout, "Dialing");
        let mut stream = self.connect().await?;

        let capacity = usize::try_from(content_length)
            .unwrap_or(usize::MAX)
            .min(INITIAL_CAPACITY);
        let mut buf = BytesMut::with_capacity(capacity);

        read_exact_within(&mut stream, &mut buf, content_length, read_timeout).await?;
        debug!(address = %self.address, bytes = buf.len(), "Content downloaded");

        // The stream stays open until the continuation returns.
        let result = on_bytes(&buf[..]);
        drop(stream);
        result
    }
}
