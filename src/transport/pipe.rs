//! The pipe the console server listens on.
//!
//! Unix builds use a domain socket, Windows builds a named pipe. Both are
//! wrapped in [`PipeStream`] so the connection layer sees one byte stream
//! type. [`PipeListener`] is the accepting side, for in-process servers and
//! test harnesses.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Result;

/// A fresh pipe path unique to this process.
///
/// - Unix: `/tmp/conwire-{pid}-{tag}.sock`
/// - Windows: `\\.\pipe\conwire-{pid}-{tag}`
pub fn generate_pipe_path() -> String {
    let pid = std::process::id();
    let tag = unique_tag();

    #[cfg(unix)]
    {
        format!("/tmp/conwire-{}-{:x}.sock", pid, tag)
    }

    #[cfg(windows)]
    {
        format!(r"\\.\pipe\conwire-{}-{:x}", pid, tag)
    }
}

fn unique_tag() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static SEQ: AtomicU64 = AtomicU64::new(0);

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    (nanos << 8) ^ seq
}

trait Duplex: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Duplex for T {}

/// Connected end of the console pipe.
pub struct PipeStream {
    inner: Box<dyn Duplex>,
}

impl PipeStream {
    fn wrap(inner: impl Duplex + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    fn io(self: Pin<&mut Self>) -> Pin<&mut (dyn Duplex + 'static)> {
        Pin::new(&mut *self.get_mut().inner)
    }

    /// Connect to a console server listening at `path`.
    #[cfg(unix)]
    pub async fn connect(path: &str) -> Result<Self> {
        let stream = tokio::net::UnixStream::connect(path).await?;
        tracing::debug!(path, "Connected to console pipe");
        Ok(Self::wrap(stream))
    }

    /// Connect to a console server listening at `path`.
    ///
    /// A busy pipe (every server instance taken) is retried a few times.
    #[cfg(windows)]
    pub async fn connect(path: &str) -> Result<Self> {
        use std::time::Duration;
        use tokio::net::windows::named_pipe::ClientOptions;

        const ERROR_PIPE_BUSY: i32 = 231;
        const BUSY_RETRIES: u32 = 20;

        let mut attempt = 0;
        loop {
            match ClientOptions::new().open(path) {
                Ok(client) => {
                    tracing::debug!(path, attempt, "Connected to console pipe");
                    return Ok(Self::wrap(client));
                }
                Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY)
                    && attempt < BUSY_RETRIES =>
                {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AsyncRead for PipeStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.io().poll_read(cx, buf)
    }
}

impl AsyncWrite for PipeStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.io().poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.io().poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.io().poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.io().poll_shutdown(cx)
    }
}

/// Server side of the console pipe.
pub struct PipeListener {
    path: String,
    #[cfg(unix)]
    listener: tokio::net::UnixListener,
}

impl PipeListener {
    /// Listen at `path`. A stale socket file left at `path` is replaced.
    #[cfg(unix)]
    pub async fn bind(path: &str) -> Result<Self> {
        if std::path::Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }
        let listener = tokio::net::UnixListener::bind(path)?;
        Ok(Self {
            path: path.to_string(),
            listener,
        })
    }

    /// Listen at `path`. Pipe instances are created per accept.
    #[cfg(windows)]
    pub async fn bind(path: &str) -> Result<Self> {
        Ok(Self {
            path: path.to_string(),
        })
    }

    /// Wait for one client.
    #[cfg(unix)]
    pub async fn accept(&self) -> Result<PipeStream> {
        let (stream, _) = self.listener.accept().await?;
        Ok(PipeStream::wrap(stream))
    }

    /// Wait for one client.
    #[cfg(windows)]
    pub async fn accept(&self) -> Result<PipeStream> {
        use tokio::net::windows::named_pipe::ServerOptions;

        let server = ServerOptions::new().create(&self.path)?;
        server.connect().await?;
        Ok(PipeStream::wrap(server))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[cfg(unix)]
impl Drop for PipeListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
