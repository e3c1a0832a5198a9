//! Awaitables settled by hand.

use anyhow::anyhow;
use futures::channel::oneshot;
use futures::FutureExt;
use std::fmt;

use crate::routine::Awaitable;

/// Resolves or rejects the awaitable returned alongside it by [`deferred`].
///
/// Dropping it unsettled rejects the awaitable.
pub struct Settle<V> {
    tx: oneshot::Sender<anyhow::Result<V>>,
}

impl<V> Settle<V> {
    /// Resolves the awaitable with a value.
    pub fn resolve(self, value: V) {
        let _ = self.tx.send(Ok(value));
    }

    /// Rejects the awaitable.
    pub fn reject(self, reason: impl Into<anyhow::Error>) {
        let _ = self.tx.send(Err(reason.into()));
    }

    /// Returns true if the awaitable has been dropped.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_canceled()
    }
}

impl<V> fmt::Debug for Settle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settle")
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

/// Creates an awaitable that stays pending until its [`Settle`] handle is used.
pub fn deferred<V: 'static>() -> (Awaitable<V>, Settle<V>) {
    let (tx, rx) = oneshot::channel();
    let awaitable = async move {
        match rx.await {
            Ok(outcome) => outcome,
            Err(oneshot::Canceled) => Err(anyhow!("deferred value dropped before settling")),
        }
    }
    .boxed_local();
    (awaitable, Settle { tx })
}
