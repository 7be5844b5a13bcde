//! Chunking driver.
//!
//! Writes larger than one frame's payload go out as a sequence of calls.
//! The driver owns the bookkeeping and the sink owns the call:
//!
//! ```text
//! remaining = requested, cursor = start
//! while remaining > 0:
//!     chunk = min(remaining, per_frame)
//!     done, end = sink.send(offset, chunk, cursor)
//!     done == 0   -> stop, success
//!     done > chunk -> protocol error
//!     offset += done, remaining -= done, cursor = end
//! ```
//!
//! Progress always comes from the server's reply. A short chunk moves the
//! offset by what was accepted, and the next chunk starts there. The
//! cursor is whatever the server reported, never recomputed locally.

use crate::error::{ConwireError, Result};
use crate::transport::BoxFuture;
use crate::types::Coord;

/// One chunk to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkStep {
    /// Element offset into the caller's data.
    pub offset: usize,
    /// Elements in this chunk.
    pub len: usize,
    /// Screen position to write at, for positional writes.
    pub cursor: Option<Coord>,
}

/// What the server reported for one chunk, or for the whole sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkProgress {
    /// Elements accepted.
    pub done: usize,
    /// Position after the last accepted element.
    pub end_cursor: Option<Coord>,
}

/// Sends one chunk and reports server progress.
pub trait ChunkSink: Send {
    fn send(&mut self, step: ChunkStep) -> BoxFuture<'_, Result<ChunkProgress>>;
}

/// Progress through a chunked transfer.
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    offset: usize,
    remaining: usize,
    done_total: usize,
    cursor: Option<Coord>,
    per_frame: usize,
    calls: usize,
}

impl ChunkCursor {
    /// Fails with `InvalidParameter` if no element fits in one frame.
    pub fn new(requested: usize, per_frame: usize, start: Option<Coord>) -> Result<Self> {
        if per_frame == 0 && requested > 0 {
            return Err(ConwireError::InvalidParameter(
                "frame payload cannot hold a single element",
            ));
        }
        Ok(Self {
            offset: 0,
            remaining: requested,
            done_total: 0,
            cursor: start,
            per_frame,
            calls: 0,
        })
    }

    /// Next chunk to send, `None` once everything was accepted.
    pub fn next_step(&self) -> Option<ChunkStep> {
        if self.remaining == 0 {
            return None;
        }
        Some(ChunkStep {
            offset: self.offset,
            len: self.remaining.min(self.per_frame),
            cursor: self.cursor,
        })
    }

    /// Apply server progress for `step`.
    ///
    /// Returns `false` when the server accepted nothing and the transfer
    /// should stop.
    pub fn advance(&mut self, step: ChunkStep, progress: ChunkProgress) -> Result<bool> {
        self.calls += 1;
        if progress.done > step.len {
            return Err(ConwireError::Protocol(format!(
                "Server reported {} elements done for a chunk of {}",
                progress.done, step.len
            )));
        }
        if progress.done == 0 {
            return Ok(false);
        }

        self.done_total += progress.done;
        self.remaining -= progress.done;
        self.offset += progress.done;
        if progress.end_cursor.is_some() {
            self.cursor = progress.end_cursor;
        }
        Ok(true)
    }

    /// Elements accepted so far.
    #[inline]
    pub fn done_total(&self) -> usize {
        self.done_total
    }

    /// Calls made so far.
    #[inline]
    pub fn calls(&self) -> usize {
        self.calls
    }

    #[inline]
    pub fn cursor(&self) -> Option<Coord> {
        self.cursor
    }

    fn progress(&self) -> ChunkProgress {
        ChunkProgress {
            done: self.done_total,
            end_cursor: self.cursor,
        }
    }
}

/// Run a chunked transfer of `requested` elements through `sink`.
///
/// A failure after some chunks were accepted is reported as
/// [`ConwireError::PartialTransfer`] carrying the accepted count.
pub async fn drive<S: ChunkSink + ?Sized>(
    requested: usize,
    per_frame: usize,
    start: Option<Coord>,
    sink: &mut S,
) -> Result<ChunkProgress> {
    let mut chunks = ChunkCursor::new(requested, per_frame, start)?;

    while let Some(step) = chunks.next_step() {
        let result = match sink.send(step).await {
            Ok(progress) => chunks.advance(step, progress),
            Err(e) => Err(e),
        };

        match result {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    done = chunks.done_total(),
                    requested,
                    "Server accepted no elements, stopping"
                );
                break;
            }
            Err(e) if chunks.done_total() > 0 => {
                tracing::debug!(done = chunks.done_total(), "Chunked transfer interrupted: {}", e);
                return Err(ConwireError::PartialTransfer {
                    transferred: chunks.done_total(),
                    source: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }

    Ok(chunks.progress())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Status;

    /// Accepts up to `accept` elements per chunk and fails on `fail_on`.
    struct Recorder {
        steps: Vec<ChunkStep>,
        accept: usize,
        fail_on: Option<usize>,
        advance_cursor: bool,
    }

    impl Recorder {
        fn new(accept: usize) -> Self {
            Self {
                steps: Vec::new(),
                accept,
                fail_on: None,
                advance_cursor: false,
            }
        }
    }

    impl ChunkSink for Recorder {
        fn send(&mut self, step: ChunkStep) -> BoxFuture<'_, Result<ChunkProgress>> {
            self.steps.push(step);
            let call = self.steps.len();
            let fail = self.fail_on == Some(call);
            let done = step.len.min(self.accept);
            let end_cursor = if self.advance_cursor {
                step.cursor.map(|c| Coord::new(c.x + done as i16, c.y))
            } else {
                None
            };
            Box::pin(async move {
                if fail {
                    return Err(ConwireError::Status(Status::UNSUCCESSFUL));
                }
                Ok(ChunkProgress { done, end_cursor })
            })
        }
    }

    #[tokio::test]
    async fn test_call_count_is_ceiling() {
        for (requested, per_frame, expected) in [(10, 3, 4), (9, 3, 3), (1, 100, 1), (100, 1, 100)] {
            let mut sink = Recorder::new(usize::MAX);
            let progress = drive(requested, per_frame, None, &mut sink).await.unwrap();
            assert_eq!(sink.steps.len(), expected);
            assert_eq!(progress.done, requested);
            let sum: usize = sink.steps.iter().map(|s| s.len).sum();
            assert_eq!(sum, requested);
        }
    }

    #[tokio::test]
    async fn test_zero_requested_makes_no_calls() {
        let mut sink = Recorder::new(usize::MAX);
        let progress = drive(0, 0, None, &mut sink).await.unwrap();
        assert_eq!(progress.done, 0);
        assert!(sink.steps.is_empty());
    }

    #[tokio::test]
    async fn test_zero_capacity_rejected() {
        let mut sink = Recorder::new(usize::MAX);
        let err = drive(5, 0, None, &mut sink).await.unwrap_err();
        assert!(matches!(err, ConwireError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_short_chunks_advance_by_reported_count() {
        let mut sink = Recorder::new(4);
        let progress = drive(10, 6, None, &mut sink).await.unwrap();

        let offsets: Vec<_> = sink.steps.iter().map(|s| (s.offset, s.len)).collect();
        assert_eq!(offsets, vec![(0, 6), (4, 6), (8, 2)]);
        assert_eq!(progress.done, 10);
    }

    #[tokio::test]
    async fn test_zero_progress_stops_with_success() {
        let mut sink = Recorder::new(0);
        let progress = drive(10, 5, None, &mut sink).await.unwrap();
        assert_eq!(progress.done, 0);
        assert_eq!(sink.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_cursor_follows_server() {
        let mut sink = Recorder::new(usize::MAX);
        sink.advance_cursor = true;
        let progress = drive(7, 3, Some(Coord::new(2, 1)), &mut sink).await.unwrap();

        let cursors: Vec<_> = sink.steps.iter().map(|s| s.cursor).collect();
        assert_eq!(
            cursors,
            vec![
                Some(Coord::new(2, 1)),
                Some(Coord::new(5, 1)),
                Some(Coord::new(8, 1))
            ]
        );
        assert_eq!(progress.end_cursor, Some(Coord::new(9, 1)));
    }

    #[tokio::test]
    async fn test_mid_sequence_failure_reports_transferred() {
        let mut sink = Recorder::new(usize::MAX);
        sink.fail_on = Some(3);

        let err = drive(50_000, 10_000, None, &mut sink).await.unwrap_err();
        assert_eq!(sink.steps.len(), 3);
        assert_eq!(err.transferred(), 20_000);
        assert_eq!(err.status(), Some(Status::UNSUCCESSFUL));
    }

    #[tokio::test]
    async fn test_first_chunk_failure_is_plain_error() {
        let mut sink = Recorder::new(usize::MAX);
        sink.fail_on = Some(1);

        let err = drive(100, 10, None, &mut sink).await.unwrap_err();
        assert!(matches!(err, ConwireError::Status(_)));
    }

    #[test]
    fn test_overreport_is_protocol_error() {
        let mut cursor = ChunkCursor::new(10, 5, None).unwrap();
        let step = cursor.next_step().unwrap();
        let err = cursor
            .advance(
                step,
                ChunkProgress {
                    done: 6,
                    end_cursor: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, ConwireError::Protocol(_)));
    }
}
