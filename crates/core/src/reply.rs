//! Single-slot coordination between the connection's message dispatch and
//! whoever is waiting for the agent's next complete reply.

use crate::error::AgentError;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};
use std::time::Duration;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

/// A future resolving to the agent's next reply. Clones observe the same outcome.
pub type ReplyFuture = Shared<BoxFuture<'static, Result<String, AgentError>>>;

struct PendingReply {
    id: u64,
    resolve: oneshot::Sender<Result<String, AgentError>>,
    future: ReplyFuture,
    deadline: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<PendingReply>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<PendingReply>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Holds at most one outstanding reply request.
///
/// Whichever of [`fulfill`](Self::fulfill), [`cancel`](Self::cancel) or the
/// deadline takes the pending entry out of the slot decides the outcome; the
/// others find the slot empty and do nothing.
pub struct ReplyWaiter {
    timeout: Duration,
    slot: Slot,
    next_id: AtomicU64,
}

impl ReplyWaiter {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the pending reply future, creating it (and starting its
    /// deadline) if nothing is pending. Must be called within a Tokio runtime.
    pub fn wait(&self) -> ReplyFuture {
        let mut slot = lock(&self.slot);
        if let Some(pending) = slot.as_ref() {
            return pending.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (resolve, outcome) = oneshot::channel();
        let future = outcome
            .map(|received| received.unwrap_or(Err(AgentError::ConnectionClosed)))
            .boxed()
            .shared();
        let deadline = self.spawn_deadline(id);

        *slot = Some(PendingReply {
            id,
            resolve,
            future: future.clone(),
            deadline,
        });
        future
    }

    fn spawn_deadline(&self, id: u64) -> JoinHandle<()> {
        let slot = Arc::clone(&self.slot);
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = {
                let mut slot = lock(&slot);
                match slot.as_ref() {
                    Some(pending) if pending.id == id => slot.take(),
                    _ => None,
                }
            };
            if let Some(pending) = expired {
                warn!(timeout_secs = timeout.as_secs(), "Agent reply timed out");
                let _ = pending.resolve.send(Err(AgentError::ResponseTimeout(timeout)));
            }
        })
    }

    /// Resolves the pending reply with `text`. Returns `false` if nobody was waiting.
    pub fn fulfill(&self, text: String) -> bool {
        let Some(pending) = lock(&self.slot).take() else {
            return false;
        };
        pending.deadline.abort();
        let _ = pending.resolve.send(Ok(text));
        true
    }

    /// Fails the pending reply with [`AgentError::ConnectionClosed`].
    pub fn cancel(&self) -> bool {
        let Some(pending) = lock(&self.slot).take() else {
            return false;
        };
        debug!("Cancelling pending agent reply");
        pending.deadline.abort();
        let _ = pending.resolve.send(Err(AgentError::ConnectionClosed));
        true
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_fulfill_resolves_pending_reply() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        let reply = waiter.wait();
        assert!(waiter.is_pending());

        assert!(waiter.fulfill("Hello".to_string()));
        assert_eq!(reply.await, Ok("Hello".to_string()));
        assert!(!waiter.is_pending());
    }

    #[tokio::test]
    async fn test_fulfill_without_waiter_is_discarded() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        assert!(!waiter.fulfill("nobody listening".to_string()));
        assert!(!waiter.is_pending());
    }

    #[tokio::test]
    async fn test_second_wait_shares_the_pending_future() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        let first = waiter.wait();
        let second = waiter.wait();
        assert!(first.ptr_eq(&second));

        waiter.fulfill("shared".to_string());
        assert_eq!(first.await, Ok("shared".to_string()));
        assert_eq!(second.await, Ok("shared".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fails_reply_and_clears_slot() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        let started = Instant::now();
        let reply = waiter.wait();

        assert_eq!(reply.clone().await, Err(AgentError::ResponseTimeout(TIMEOUT)));
        let elapsed = started.elapsed();
        assert!(elapsed >= TIMEOUT && elapsed < TIMEOUT + Duration::from_millis(5));
        assert!(!waiter.is_pending());

        let fresh = waiter.wait();
        assert!(!fresh.ptr_eq(&reply));
        assert!(waiter.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fulfill_before_deadline_wins() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        let reply = waiter.wait();

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(waiter.fulfill("just in time".to_string()));
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(reply.await, Ok("just in time".to_string()));
        assert!(!waiter.is_pending());
    }

    #[tokio::test]
    async fn test_cancel_fails_reply_with_connection_closed() {
        let waiter = ReplyWaiter::new(TIMEOUT);
        let reply = waiter.wait();

        assert!(waiter.cancel());
        assert!(!waiter.cancel());
        assert_eq!(reply.await, Err(AgentError::ConnectionClosed));
    }
}
