//! Call transport: one request, resolved to a completion.
//!
//! A single round trip ends one of two ways:
//! - **Completed**: the reply carries a status, an optional body and the
//!   capture region written by the server.
//! - **Pending**: the server deferred the call and named an unpause event.
//!
//! [`CallTransport::call`] drives the pending case to completion. It waits
//! once on the event and reissues the identical request, as many times as
//! the server keeps deferring.

use std::time::Duration;

use bytes::Bytes;

use crate::allocator::StagedRequest;
use crate::error::{ConwireError, Result};
use crate::protocol::{Frame, Reply, Status};
use crate::transport::{Limits, Transport};

/// Reply to a call that the server did not defer.
#[derive(Debug, Clone)]
pub struct Completion {
    pub status: Status,
    /// Reply body. Failure replies may omit it.
    pub reply: Option<Reply>,
    /// Capture region as written by the server.
    pub capture: Bytes,
}

impl Completion {
    /// Turn a failure status into an error.
    pub fn check(&self) -> Result<()> {
        if self.status.is_success() {
            Ok(())
        } else {
            Err(ConwireError::Status(self.status))
        }
    }

    /// Typed reply body, if present, regardless of status.
    ///
    /// Out-parameters that the caller keeps even on failure are read
    /// through this before [`check`](Self::check).
    pub fn body<R>(&self) -> Result<Option<R>>
    where
        R: TryFrom<Reply, Error = ConwireError>,
    {
        self.reply.map(R::try_from).transpose()
    }

    /// Check the status, then require a typed body.
    pub fn success<R>(&self) -> Result<R>
    where
        R: TryFrom<Reply, Error = ConwireError>,
    {
        self.check()?;
        self.body()?
            .ok_or_else(|| ConwireError::Protocol("Successful reply without a body".to_string()))
    }
}

/// Outcome of one round trip.
#[derive(Debug, Clone)]
pub enum CallOutcome {
    Completed(Completion),
    /// Server deferred the call until this event is signaled.
    Pending(u32),
}

#[derive(Debug, Clone, Copy)]
enum CallState {
    Issued,
    Pending(u32),
}

/// Issues requests over a [`Transport`], handling deferral.
pub struct CallTransport<T> {
    transport: T,
    pending_timeout: Option<Duration>,
}

impl<T: Transport> CallTransport<T> {
    /// Wait forever on pending calls.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            pending_timeout: None,
        }
    }

    /// Give up on a pending call after `timeout`.
    pub fn with_pending_timeout(transport: T, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            pending_timeout: timeout,
        }
    }

    #[inline]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    #[inline]
    pub fn limits(&self) -> Limits {
        self.transport.limits()
    }

    /// Perform exactly one round trip.
    ///
    /// A body over the transport's body limit is refused without sending.
    pub async fn issue(&self, request: &StagedRequest, capture: &Bytes) -> Result<CallOutcome> {
        let api = request.api();
        let max_body = self.limits().max_body as usize;
        if request.body().len() > max_body {
            return Err(ConwireError::Protocol(format!(
                "{:?} body of {} bytes exceeds the {} byte limit",
                api,
                request.body().len(),
                max_body
            )));
        }

        let frame = Frame::request_body(api, request.body().clone(), capture.clone())?;
        let reply = self.transport.round_trip(frame).await?;

        if !reply.is_reply() || reply.header.api != api.as_u16() {
            return Err(ConwireError::Protocol(format!(
                "Reply frame for api {} does not answer {:?}",
                reply.header.api, api
            )));
        }

        if reply.is_pending() || reply.status().is_pending() {
            let notice = reply.decode_pending()?;
            tracing::debug!(?api, event = notice.event, "Call pending");
            return Ok(CallOutcome::Pending(notice.event));
        }

        let body = reply.decode_reply()?;
        Ok(CallOutcome::Completed(Completion {
            status: reply.status(),
            reply: body,
            capture: reply.capture,
        }))
    }

    /// Issue a request until it completes.
    ///
    /// Each pending outcome costs one wait and one reissue of the same
    /// request and capture. Transport errors end the call.
    pub async fn call(&self, request: &StagedRequest, capture: &Bytes) -> Result<Completion> {
        let mut state = CallState::Issued;
        loop {
            state = match state {
                CallState::Issued => match self.issue(request, capture).await? {
                    CallOutcome::Completed(completion) => return Ok(completion),
                    CallOutcome::Pending(event) => CallState::Pending(event),
                },
                CallState::Pending(event) => {
                    self.wait(event).await?;
                    CallState::Issued
                }
            };
        }
    }

    async fn wait(&self, event: u32) -> Result<()> {
        match self.pending_timeout {
            None => self.transport.wait_event(event).await,
            Some(timeout) => tokio::time::timeout(timeout, self.transport.wait_event(event))
                .await
                .map_err(|_| ConwireError::PendingTimeout { event })?,
        }
    }
}
