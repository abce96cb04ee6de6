//! # Awaitable results of registered operations.
//!
//! An [`Awaitable<T>`] is the caller's side of a continuation parked on a
//! link. It resolves when the link settles, is rejected when the link is
//! cleared, and resolves to [`AsyncError::Abandoned`] if the link is dropped
//! without settling (a muted one-shot that fired).
//!
//! Joined callers share one type-erased result; each downcasts it to its own
//! `T`, so awaiting a survivor of another result type yields
//! [`AsyncError::TypeMismatch`].

use std::any::type_name;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::error::AsyncError;
use crate::registry::{Continuation, OperationId, Settled};

enum State<T> {
    Ready(Option<Result<T, AsyncError>>),
    Waiting(oneshot::Receiver<Result<T, AsyncError>>),
}

/// Future resolving to the settled result of one operation.
pub struct Awaitable<T> {
    id: Option<OperationId>,
    state: State<T>,
}

impl<T> Unpin for Awaitable<T> {}

impl<T: Clone + 'static> Awaitable<T> {
    /// Creates the continuation/awaitable pair for one caller.
    pub(crate) fn channel() -> (Continuation, Self) {
        let (tx, rx) = oneshot::channel();
        let continuation = Continuation::new(move |settled: Settled| {
            let result = settled.and_then(|value| {
                value
                    .downcast_ref::<T>()
                    .cloned()
                    .ok_or(AsyncError::TypeMismatch {
                        expected: type_name::<T>(),
                    })
            });
            let _ = tx.send(result);
        });
        let awaitable = Self {
            id: None,
            state: State::Waiting(rx),
        };
        (continuation, awaitable)
    }
}

impl<T> Awaitable<T> {
    /// Already-resolved awaitable.
    pub fn ready(value: T) -> Self {
        Self {
            id: None,
            state: State::Ready(Some(Ok(value))),
        }
    }

    /// Already-rejected awaitable.
    pub fn failed(err: AsyncError) -> Self {
        Self {
            id: None,
            state: State::Ready(Some(Err(err))),
        }
    }

    pub(crate) fn with_id(mut self, id: OperationId) -> Self {
        self.id = Some(id);
        self
    }

    /// Id of the link this awaitable is parked on (the survivor after a merge).
    ///
    /// `None` if registration failed or the result was ready up front.
    pub fn id(&self) -> Option<OperationId> {
        self.id
    }
}

impl<T> Future for Awaitable<T> {
    type Output = Result<T, AsyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            State::Ready(slot) => Poll::Ready(slot.take().unwrap_or(Err(AsyncError::Abandoned))),
            State::Waiting(rx) => Pin::new(rx)
                .poll(cx)
                .map(|received| received.unwrap_or(Err(AsyncError::Abandoned))),
        }
    }
}

impl<T> fmt::Debug for Awaitable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Ready(_) => "ready",
            State::Waiting(_) => "waiting",
        };
        f.debug_struct("Awaitable")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use futures::FutureExt;

    use super::*;
    use crate::registry::Value;

    #[test]
    fn mismatched_result_type_is_reported() {
        let (continuation, awaitable) = Awaitable::<String>::channel();
        continuation.settle(Ok(Rc::new(5u32) as Value));
        let err = awaitable.now_or_never().expect("settled").unwrap_err();
        assert!(matches!(err, AsyncError::TypeMismatch { .. }));
    }

    #[test]
    fn dropped_continuation_abandons_the_caller() {
        let (continuation, awaitable) = Awaitable::<u8>::channel();
        drop(continuation);
        let err = awaitable.now_or_never().expect("settled").unwrap_err();
        assert!(matches!(err, AsyncError::Abandoned));
    }

    #[test]
    fn ready_resolves_immediately() {
        let value = Awaitable::ready(3).now_or_never().expect("ready");
        assert_eq!(value.ok(), Some(3));
    }
}
