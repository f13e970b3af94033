//! Cancellation handles raced against process completion.
//!
//! An explicit cancel and an expired deadline look the same to the executor:
//! the signal has fired.

use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Caller-owned signal that aborts an invocation.
pub trait CancelSignal: Send + Sync {
    /// True once the signal has fired. Never resets.
    fn is_fired(&self) -> bool;

    /// Resolves when the signal fires.
    fn fired(&self) -> BoxFuture<'_, ()>;
}

impl CancelSignal for CancellationToken {
    fn is_fired(&self) -> bool {
        self.is_cancelled()
    }

    fn fired(&self) -> BoxFuture<'_, ()> {
        self.cancelled().boxed()
    }
}

/// Signal that fires at a point in time, or earlier when its linked token is
/// cancelled.
#[derive(Debug, Clone)]
pub struct Deadline {
    at: Instant,
    token: Option<CancellationToken>,
}

impl Deadline {
    pub fn at(at: Instant) -> Self {
        Self { at, token: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// Also fire when `token` is cancelled.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn instant(&self) -> Instant {
        self.at
    }
}

impl CancelSignal for Deadline {
    fn is_fired(&self) -> bool {
        Instant::now() >= self.at
            || self
                .token
                .as_ref()
                .is_some_and(CancellationToken::is_cancelled)
    }

    fn fired(&self) -> BoxFuture<'_, ()> {
        let sleep = tokio::time::sleep_until(self.at);
        match &self.token {
            Some(token) => async move {
                tokio::select! {
                    () = sleep => {}
                    () = token.cancelled() => {}
                }
            }
            .boxed(),
            None => sleep.boxed(),
        }
    }
}

/// Signal that never fires.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    fn is_fired(&self) -> bool {
        false
    }

    fn fired(&self) -> BoxFuture<'_, ()> {
        future::pending().boxed()
    }
}
