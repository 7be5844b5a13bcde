//! Writer task for outgoing request frames.
//!
//! Every call on a connection shares the pipe's write half. Calls queue
//! their frames on a bounded channel and one task drains it, coalescing
//! whatever is already queued into a single vectored write.
//!
//! ```text
//! call ─┐
//! call ─┼─► mpsc ─► writer task ─► pipe
//! call ─┘
//! ```

use std::collections::VecDeque;
use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{ConwireError, Result};
use crate::protocol::Frame;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Frames coalesced into one write at most.
const MAX_BATCH_FRAMES: usize = 64;

/// Bytes coalesced into one write before it is flushed.
const MAX_BATCH_BYTES: usize = 1024 * 1024;

/// Writer task settings.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Frames that may wait in the queue before `send` blocks.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Sending side of the writer task.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<Frame>,
    queued: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue `frame`, waiting while the channel is full.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.queued.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).await.map_err(|_| {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            ConwireError::ConnectionClosed
        })
    }

    /// Frames accepted but not yet written.
    #[inline]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }
}

/// Spawn the writer task over `writer`.
///
/// The task ends when every handle is dropped, or with the first write
/// error.
pub(crate) fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let queued = Arc::new(AtomicUsize::new(0));
    let task = tokio::spawn(writer_loop(rx, writer, queued.clone()));
    (WriterHandle { tx, queued }, task)
}

async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Frame>,
    mut writer: W,
    queued: Arc<AtomicUsize>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(first) = rx.recv().await {
        let mut batch = Batch::default();
        batch.push(first);
        while batch.frames < MAX_BATCH_FRAMES && batch.remaining() < MAX_BATCH_BYTES {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        let frames = batch.frames;
        let result = batch.write_to(&mut writer).await;
        queued.fetch_sub(frames, Ordering::AcqRel);

        if let Err(e) = result {
            tracing::error!(frames, error = %e, "Pipe write failed");
            return Err(e);
        }
        tracing::trace!(frames, "Wrote frame batch");
    }

    tracing::debug!("Writer queue closed");
    Ok(())
}

/// Wire sections of several frames, consumed front to back.
#[derive(Default)]
struct Batch {
    sections: VecDeque<Bytes>,
    frames: usize,
}

impl Batch {
    fn push(&mut self, frame: Frame) {
        let header = Bytes::copy_from_slice(&frame.header.encode());
        for section in [header, frame.body, frame.capture] {
            if !section.is_empty() {
                self.sections.push_back(section);
            }
        }
        self.frames += 1;
    }

    fn remaining(&self) -> usize {
        self.sections.iter().map(Bytes::len).sum()
    }

    /// Drop `n` written bytes from the front.
    fn consume(&mut self, mut n: usize) {
        while n > 0 {
            let Some(front) = self.sections.front_mut() else {
                return;
            };
            if n < front.len() {
                front.advance(n);
                return;
            }
            n -= front.len();
            self.sections.pop_front();
        }
    }

    async fn write_to<W: AsyncWrite + Unpin>(mut self, writer: &mut W) -> Result<()> {
        while !self.sections.is_empty() {
            let slices: Vec<IoSlice<'_>> =
                self.sections.iter().map(|s| IoSlice::new(s)).collect();
            let written = writer.write_vectored(&slices).await?;
            if written == 0 {
                return Err(ConwireError::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "pipe accepted no bytes",
                )));
            }
            self.consume(written);
        }
        writer.flush().await?;
        Ok(())
    }
}
