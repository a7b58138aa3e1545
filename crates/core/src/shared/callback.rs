//! Bridges one-shot completion callbacks into blocking, cancellable calls.
//!
//! Collaborators such as the detector service and the still camera report
//! their outcome through a boxed `FnOnce`. [`await_callback`] hands such a
//! callback to the collaborator and parks the caller on a one-slot channel
//! until the callback fires, the owning scope is cancelled, or the
//! collaborator drops the callback without calling it.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use thiserror::Error;

use crate::shared::cancellation::CancellationToken;

/// One-shot completion handed to a callback-style collaborator.
pub type Completion<T, E> = Box<dyn FnOnce(Result<T, E>) + Send>;

#[derive(Error, Debug, PartialEq)]
pub enum CallbackError<E> {
    #[error("{0}")]
    Failed(E),
    #[error("cancelled before the callback fired")]
    Cancelled,
    #[error("callback dropped without completing")]
    Abandoned,
}

/// Registers a completion with `register` and blocks until it resolves.
///
/// Exactly one outcome is returned. A value that arrives after `cancel`
/// was triggered is discarded and reported as `Cancelled`; once this
/// function returns, a late completion lands on a closed channel and its
/// payload is dropped there.
pub fn await_callback<T, E, F>(
    cancel: &CancellationToken,
    poll_interval: Duration,
    register: F,
) -> Result<T, CallbackError<E>>
where
    T: Send + 'static,
    E: Send + 'static,
    F: FnOnce(Completion<T, E>),
{
    let (tx, rx) = crossbeam_channel::bounded::<Result<T, E>>(1);
    register(Box::new(move |outcome| {
        let _ = tx.send(outcome);
    }));

    loop {
        if cancel.is_cancelled() {
            return Err(CallbackError::Cancelled);
        }
        match rx.recv_timeout(poll_interval) {
            Ok(Ok(_)) if cancel.is_cancelled() => return Err(CallbackError::Cancelled),
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => return Err(CallbackError::Failed(e)),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return Err(CallbackError::Abandoned),
        }
    }
}
