//! Per-message-type receive queue.
//!
//! One `Inbox` per routed message kind, so a burst of one kind never delays
//! delivery of another. Waiters park on the inbox's own [`Notify`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};

pub(crate) struct Inbox<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> Inbox<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.queue.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Enqueues an item, dropping the oldest one when full.
    pub(crate) fn push(&self, item: T) {
        {
            let mut q = self.lock();
            if q.len() >= self.capacity {
                q.pop_front();
            }
            q.push_back(item);
        }
        self.notify.notify_one();
    }

    pub(crate) fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Waits up to `timeout` for an item.
    ///
    /// Returns `None` on timeout or as soon as `connected` reads false.
    pub(crate) async fn pop(&self, timeout: Duration, connected: &AtomicBool) -> Option<T> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !connected.load(Ordering::Acquire) {
                return None;
            }
            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Drops everything queued.
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Wakes every parked waiter so it can re-check the connection flag.
    pub(crate) fn wake_all(&self) {
        self.notify.notify_waiters();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn pop_returns_queued_item() {
        let inbox = Inbox::new(4);
        let up = AtomicBool::new(true);
        inbox.push(1u32);
        assert_eq!(inbox.pop(Duration::from_millis(10), &up).await, Some(1));
        assert_eq!(inbox.pop(Duration::from_millis(10), &up).await, None);
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let inbox = Inbox::new(2);
        inbox.push(1u32);
        inbox.push(2);
        inbox.push(3);
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.try_pop(), Some(2));
        assert_eq!(inbox.try_pop(), Some(3));
    }

    #[tokio::test]
    async fn waiter_is_woken_by_push() {
        let inbox = Arc::new(Inbox::new(4));
        let up = Arc::new(AtomicBool::new(true));

        let waiter = {
            let inbox = Arc::clone(&inbox);
            let up = Arc::clone(&up);
            tokio::spawn(async move { inbox.pop(Duration::from_secs(5), &up).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        inbox.push(9u32);
        assert_eq!(waiter.await.unwrap(), Some(9));
    }

    #[tokio::test]
    async fn disconnect_releases_waiter_early() {
        let inbox: Arc<Inbox<u32>> = Arc::new(Inbox::new(4));
        let up = Arc::new(AtomicBool::new(true));

        let waiter = {
            let inbox = Arc::clone(&inbox);
            let up = Arc::clone(&up);
            tokio::spawn(async move {
                let started = std::time::Instant::now();
                let got = inbox.pop(Duration::from_secs(5), &up).await;
                (got, started.elapsed())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        up.store(false, Ordering::Release);
        inbox.wake_all();

        let (got, waited) = waiter.await.unwrap();
        assert_eq!(got, None);
        assert!(waited < Duration::from_secs(1));
    }
}
