//! Ordered one-producer/one-consumer event channel with a final-result slot.
//!
//! [`EventStream`] carries events from exactly one producer to exactly one
//! consumer in publish order. The consumer may attach after events have been
//! pushed (they are buffered), and the way the interaction ended is available
//! separately through [`EventStream::result`].
//!
//! Handles are cheap to clone; the producer keeps one and hands another to the
//! consumer. Only one handle may be polled as a [`Stream`] at a time.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use futures::Stream;
use tokio::sync::Notify;

type CompletionFn<T> = dyn Fn(&T) -> bool + Send + Sync;
type ExtractFn<T, R> = dyn Fn(&T) -> R + Send + Sync;

struct State<T, R> {
    queue: VecDeque<T>,
    done: bool,
    result: Option<R>,
    waiter: Option<Waker>,
}

struct Shared<T, R> {
    state: Mutex<State<T, R>>,
    result_ready: Notify,
    is_complete: Box<CompletionFn<T>>,
    extract: Box<ExtractFn<T, R>>,
}

/// A cancelable, ordered event channel with completion detection.
pub struct EventStream<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for EventStream<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> std::fmt::Debug for EventStream<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventStream")
            .field("buffered", &state.queue.len())
            .field("done", &state.done)
            .finish()
    }
}

impl<T, R> EventStream<T, R> {
    /// Create a channel.
    ///
    /// `is_complete` marks the terminal event; `extract` turns that event into
    /// the final result.
    pub fn new(
        is_complete: impl Fn(&T) -> bool + Send + Sync + 'static,
        extract: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    done: false,
                    result: None,
                    waiter: None,
                }),
                result_ready: Notify::new(),
                is_complete: Box::new(is_complete),
                extract: Box::new(extract),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T, R>> {
        // A poisoned lock only means a panicking predicate; the queue itself is intact.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event. Ignored once the channel is done.
    pub fn push(&self, event: T) {
        let waiter = {
            let mut state = self.lock();
            if state.done {
                return;
            }
            if (self.shared.is_complete)(&event) {
                state.done = true;
                if state.result.is_none() {
                    state.result = Some((self.shared.extract)(&event));
                }
                self.shared.result_ready.notify_waiters();
            }
            state.queue.push_back(event);
            state.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Force completion, optionally resolving the final result.
    ///
    /// A result is only recorded if none has been resolved yet. A suspended
    /// consumer is released and sees end-of-sequence once the buffer drains.
    pub fn close(&self, result: Option<R>) {
        let waiter = {
            let mut state = self.lock();
            state.done = true;
            if state.result.is_none() {
                state.result = result;
            }
            self.shared.result_ready.notify_waiters();
            state.waiter.take()
        };
        if let Some(waker) = waiter {
            waker.wake();
        }
    }

    /// Whether the channel has completed (buffered events may remain).
    pub fn is_done(&self) -> bool {
        self.lock().done
    }
}

impl<T, R: Clone> EventStream<T, R> {
    /// Wait for the final result.
    ///
    /// Resolves once the channel completes; `None` means it was closed without
    /// a result. Safe to await from several call sites.
    pub async fn result(&self) -> Option<R> {
        loop {
            let notified = self.shared.result_ready.notified();
            {
                let state = self.lock();
                if let Some(result) = &state.result {
                    return Some(result.clone());
                }
                if state.done {
                    return None;
                }
            }
            notified.await;
        }
    }
}

impl<T, R> Stream for EventStream<T, R> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        let mut state = self.lock();
        if let Some(event) = state.queue.pop_front() {
            return Poll::Ready(Some(event));
        }
        if state.done {
            return Poll::Ready(None);
        }
        state.waiter = Some(cx.waker().clone());
        Poll::Pending
    }
}
