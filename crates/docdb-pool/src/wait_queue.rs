//! FIFO wait queue for checkout requesters.
//!
//! Each requester enrolls before touching the pool and withdraws when its
//! checkout attempt terminates, success or failure. Fairness comes from the
//! head-only wake: the check-in path signals only the head entry's latch, so
//! a latecomer can never be woken ahead of an earlier waiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

/// Single-shot wake latch.
///
/// Signaled at most once; `notify` after the first signal is a no-op, and a
/// wait that starts after the signal returns immediately.
#[derive(Debug, Default)]
pub(crate) struct Waiter {
    notified: Mutex<bool>,
    signal: Condvar,
}

impl Waiter {
    /// Signal the latch. Idempotent.
    pub(crate) fn notify(&self) {
        let mut notified = self.notified.lock();
        if !*notified {
            *notified = true;
            self.signal.notify_one();
        }
    }

    /// Block until the latch is signaled or `deadline` passes.
    ///
    /// Returns `true` if the latch was signaled.
    pub(crate) fn wait_until(&self, deadline: Instant) -> bool {
        let mut notified = self.notified.lock();
        while !*notified {
            if self.signal.wait_until(&mut notified, deadline).timed_out() {
                return *notified;
            }
        }
        true
    }
}

struct Entry {
    ticket: u64,
    waiter: Arc<Waiter>,
}

/// A requester's membership in the wait queue.
///
/// Holds the ticket used for withdrawal and, for non-head enrollments, the
/// latch to sleep on before attempting checkout.
pub(crate) struct Enrollment {
    ticket: u64,
    waiter: Option<Arc<Waiter>>,
}

impl Enrollment {
    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    /// The latch to wait on, or `None` when the requester enrolled at the
    /// head of an empty queue and may attempt checkout immediately.
    pub(crate) fn waiter(&self) -> Option<&Arc<Waiter>> {
        self.waiter.as_ref()
    }
}

/// Strict-FIFO queue of checkout requesters.
#[derive(Default)]
pub(crate) struct WaitQueue {
    entries: Mutex<VecDeque<Entry>>,
    next_ticket: AtomicU64,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a new entry.
    ///
    /// The enrollment carries no latch when the queue was empty prior to
    /// this call: the requester is the head and skips the pre-checkout wait.
    pub(crate) fn enroll(&self) -> Enrollment {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let waiter = Arc::new(Waiter::default());
        let mut entries = self.entries.lock();
        let was_empty = entries.is_empty();
        entries.push_back(Entry {
            ticket,
            waiter: Arc::clone(&waiter),
        });
        Enrollment {
            ticket,
            waiter: (!was_empty).then_some(waiter),
        }
    }

    /// Wake the head entry, if any.
    pub(crate) fn signal_head(&self) {
        let entries = self.entries.lock();
        if let Some(head) = entries.front() {
            head.waiter.notify();
        }
    }

    /// Remove an entry by identity.
    pub(crate) fn withdraw(&self, ticket: u64) {
        let mut entries = self.entries.lock();
        if let Some(position) = entries.iter().position(|entry| entry.ticket == ticket) {
            entries.remove(position);
        }
    }

    /// Number of enrolled requesters.
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_first_enrollment_is_immediate() {
        let queue = WaitQueue::new();
        let first = queue.enroll();
        assert!(first.waiter().is_none());

        let second = queue.enroll();
        assert!(second.waiter().is_some());

        queue.withdraw(first.ticket());
        queue.withdraw(second.ticket());
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_head_becomes_immediate_again_after_drain() {
        let queue = WaitQueue::new();
        let first = queue.enroll();
        queue.withdraw(first.ticket());

        let next = queue.enroll();
        assert!(next.waiter().is_none());
        queue.withdraw(next.ticket());
    }

    #[test]
    fn test_signal_head_wakes_only_head() {
        let queue = WaitQueue::new();
        let first = queue.enroll();
        let second = queue.enroll();

        queue.signal_head();

        // The head's latch is signaled even though the head enrolled
        // immediately and never waits on it.
        let head_waiter = {
            let entries = queue.entries.lock();
            Arc::clone(&entries.front().unwrap().waiter)
        };
        assert!(head_waiter.wait_until(Instant::now()));

        // The second entry's latch stays unsignaled.
        let second_waiter = second.waiter().unwrap();
        assert!(!second_waiter.wait_until(Instant::now() + Duration::from_millis(10)));

        queue.withdraw(first.ticket());
        queue.withdraw(second.ticket());
    }

    #[test]
    fn test_notify_is_single_shot_and_sticky() {
        let waiter = Arc::new(Waiter::default());
        waiter.notify();
        waiter.notify();

        // A wait that begins after the signal returns immediately.
        assert!(waiter.wait_until(Instant::now()));
    }

    #[test]
    fn test_waiter_wakes_blocked_thread() {
        let waiter = Arc::new(Waiter::default());
        let blocked = Arc::clone(&waiter);

        let handle = thread::spawn(move || {
            blocked.wait_until(Instant::now() + Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(20));
        waiter.notify();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_withdraw_by_identity_preserves_order() {
        let queue = WaitQueue::new();
        let a = queue.enroll();
        let b = queue.enroll();
        let c = queue.enroll();

        queue.withdraw(b.ticket());
        assert_eq!(queue.len(), 2);

        // With b gone, a is still the head.
        queue.signal_head();
        let head_ticket = queue.entries.lock().front().unwrap().ticket;
        assert_eq!(head_ticket, a.ticket());

        queue.withdraw(a.ticket());
        queue.withdraw(c.ticket());
    }
}
