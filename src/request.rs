//! Callback-to-stream adapter for platform requests.
//!
//! A [`RequestStream`] owns the receiving end of an ordered channel and the
//! handle of the platform request feeding it. The platform callback gets a
//! [`RequestSink`] and pushes results, a failure, or completion into it. Once
//! the sink has reached a terminal state every later callback is dropped.
//!
//! Dropping the stream before the terminal state cancels the platform request
//! exactly once. Requests that never produced a handle are not cancelled.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use futures::Stream;
use futures::stream::FusedStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Sleep;
use tracing::{debug, trace};

use crate::error::{LoaderError, Result};
use crate::platform::{PhotoPlatform, RequestId};

enum Delivery<T> {
    Item(T),
    Failed(LoaderError),
    Finished,
}

#[derive(Debug, Default)]
struct RequestState {
    terminated: AtomicBool,
}

impl RequestState {
    /// Returns true for the caller that moved the request into its terminal state.
    fn terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::AcqRel)
    }

    fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

/// Producer side of a [`RequestStream`], handed to platform callbacks.
pub struct RequestSink<T> {
    tx: UnboundedSender<Delivery<T>>,
    state: Arc<RequestState>,
}

impl<T> Clone for RequestSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> RequestSink<T> {
    /// Emit a value. Ignored once the request is terminal.
    pub fn next(&self, value: T) {
        if self.state.is_terminated() {
            trace!("dropping result delivered after terminal state");
            return;
        }
        // The consumer may already be gone; nothing to do then.
        let _ = self.tx.send(Delivery::Item(value));
    }

    /// Fail the stream.
    pub fn fail(&self, error: LoaderError) {
        if !self.state.terminate() {
            trace!(%error, "dropping failure delivered after terminal state");
            return;
        }
        let _ = self.tx.send(Delivery::Failed(error));
    }

    /// Complete the stream successfully.
    pub fn finish(&self) {
        if self.state.terminate() {
            let _ = self.tx.send(Delivery::Finished);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }
}

/// Stream of results from one platform request.
pub struct RequestStream<T> {
    rx: UnboundedReceiver<Delivery<T>>,
    state: Arc<RequestState>,
    handle: Option<RequestId>,
    platform: Arc<dyn PhotoPlatform>,
    done: bool,
}

impl<T> RequestStream<T> {
    /// Start a platform request immediately.
    ///
    /// `start` receives the sink to move into the platform callback and returns
    /// the handle the platform issued, if any.
    pub fn start<F>(platform: &Arc<dyn PhotoPlatform>, start: F) -> Self
    where
        F: FnOnce(RequestSink<T>) -> Option<RequestId>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(RequestState::default());
        let sink = RequestSink {
            tx,
            state: Arc::clone(&state),
        };
        let handle = start(sink);
        debug!(request = ?handle, "platform request started");
        Self {
            rx,
            state,
            handle,
            platform: Arc::clone(platform),
            done: false,
        }
    }

    /// Handle issued by the platform for this request.
    pub fn request_id(&self) -> Option<RequestId> {
        self.handle
    }
}

// Nothing in the stream is structurally pinned.
impl<T> Unpin for RequestStream<T> {}

impl<T> Stream for RequestStream<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match ready!(this.rx.poll_recv(cx)) {
            Some(Delivery::Item(value)) => Poll::Ready(Some(Ok(value))),
            Some(Delivery::Failed(error)) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            // A platform that dropped its callback has nothing more to say.
            Some(Delivery::Finished) | None => {
                this.done = true;
                Poll::Ready(None)
            }
        }
    }
}

impl<T> FusedStream for RequestStream<T> {
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Drop for RequestStream<T> {
    fn drop(&mut self) {
        if !self.state.terminate() {
            return;
        }
        if let Some(id) = self.handle.take() {
            debug!(request = ?id, "consumer detached early; cancelling request");
            self.platform.cancel_request(id);
        }
    }
}

/// Fail `inner` with [`LoaderError::Timeout`] unless it terminates within
/// `after`, measured from the first poll.
///
/// On expiry the inner stream is dropped, which cancels its platform request.
pub fn with_timeout<S>(inner: S, after: Duration) -> Timeout<S> {
    Timeout {
        inner: Some(inner),
        after,
        deadline: None,
    }
}

pub struct Timeout<S> {
    inner: Option<S>,
    after: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl<S, T> Stream for Timeout<S>
where
    S: Stream<Item = Result<T>> + Unpin,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };
        let after = this.after;
        let deadline = this
            .deadline
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(after)));

        if let Poll::Ready(item) = Pin::new(inner).poll_next(cx) {
            if item.is_none() {
                this.inner = None;
            }
            return Poll::Ready(item);
        }

        ready!(deadline.as_mut().poll(cx));
        debug!(timeout = ?after, "request timed out");
        this.inner = None;
        Poll::Ready(Some(Err(LoaderError::Timeout(after))))
    }
}

impl<S, T> FusedStream for Timeout<S>
where
    S: Stream<Item = Result<T>> + Unpin,
{
    fn is_terminated(&self) -> bool {
        self.inner.is_none()
    }
}
