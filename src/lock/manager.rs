//! Per-key lock manager
//!
//! Every key has at most one holder. Requests for a held key join that key's
//! FIFO wait queue and suspend on a one-shot grant; release hands the lock to
//! the first waiter still listening. Timeout, cancellation and forced release
//! on close are explicit transitions of the queue, not side effects of the
//! runtime.
//!
//! All locking is single-key, so there is no lock ordering to maintain and
//! no cross-key deadlock.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use super::errors::{LockError, LockResult};
use super::timeout::{CancelToken, Timeout};
use crate::txn::TransactionId;

/// Outcome delivered to a queued waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Grant {
    Granted,
    Closed,
}

#[derive(Debug)]
struct Waiter {
    id: u64,
    owner: TransactionId,
    grant: oneshot::Sender<Grant>,
}

#[derive(Debug)]
struct KeyLock {
    holder: TransactionId,
    waiters: VecDeque<Waiter>,
}

impl KeyLock {
    fn held_by(holder: TransactionId) -> Self {
        Self {
            holder,
            waiters: VecDeque::new(),
        }
    }
}

#[derive(Debug)]
struct LockTable<K> {
    keys: BTreeMap<K, KeyLock>,
    closed: bool,
    next_waiter: u64,
}

/// Proof that `owner` holds the lock on `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle<K> {
    key: K,
    owner: TransactionId,
    reentrant: bool,
}

impl<K> LockHandle<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn owner(&self) -> TransactionId {
        self.owner
    }

    /// True if the owner already held the key before this request.
    pub fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}

enum WaitEnd {
    Delivered(Result<Grant, oneshot::error::RecvError>),
    Expired,
    Cancelled,
}

/// A queued request. Dropping it before it resolves withdraws the waiter,
/// so a grant delivered to a future nobody polls any more is not lost.
struct PendingGrant<'a, K>
where
    K: Ord + Clone + Debug,
{
    locks: &'a LockManager<K>,
    key: &'a K,
    owner: TransactionId,
    waiter_id: u64,
    receiver: oneshot::Receiver<Grant>,
    settled: bool,
}

impl<K> PendingGrant<'_, K>
where
    K: Ord + Clone + Debug,
{
    fn abandon(mut self, error: LockError) -> LockError {
        self.settled = true;
        let closed = self
            .locks
            .withdraw(self.key, self.owner, self.waiter_id, &mut self.receiver);
        if closed {
            LockError::Closed
        } else {
            error
        }
    }
}

impl<K> Drop for PendingGrant<'_, K>
where
    K: Ord + Clone + Debug,
{
    fn drop(&mut self) {
        if !self.settled {
            self.locks
                .withdraw(self.key, self.owner, self.waiter_id, &mut self.receiver);
        }
    }
}

/// Grants and releases exclusive per-key locks.
#[derive(Debug)]
pub struct LockManager<K> {
    table: Mutex<LockTable<K>>,
}

impl<K> LockManager<K>
where
    K: Ord + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable {
                keys: BTreeMap::new(),
                closed: false,
                next_waiter: 0,
            }),
        }
    }

    fn table(&self) -> MutexGuard<'_, LockTable<K>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquires the lock on `key` for `owner`.
    ///
    /// Re-acquisition by the current holder succeeds immediately. Otherwise
    /// the request waits behind earlier requests until granted, until
    /// `timeout` elapses (`TimedOut`), until `cancel` fires (`Cancelled`), or
    /// until the manager is closed (`Closed`).
    pub async fn acquire(
        &self,
        owner: TransactionId,
        key: &K,
        timeout: Timeout,
        cancel: &CancelToken,
    ) -> LockResult<LockHandle<K>> {
        if cancel.is_cancelled() {
            return Err(LockError::Cancelled);
        }

        let (waiter_id, receiver) = {
            let mut guard = self.table();
            let table = &mut *guard;
            if table.closed {
                return Err(LockError::Closed);
            }
            let waiter_id = table.next_waiter;
            match table.keys.get_mut(key) {
                None => {
                    table.keys.insert(key.clone(), KeyLock::held_by(owner));
                    return Ok(self.handle(key, owner, false));
                }
                Some(lock) if lock.holder == owner => {
                    return Ok(self.handle(key, owner, true));
                }
                Some(_) if timeout.is_immediate() => return Err(LockError::TimedOut),
                Some(lock) => {
                    let (sender, receiver) = oneshot::channel();
                    lock.waiters.push_back(Waiter {
                        id: waiter_id,
                        owner,
                        grant: sender,
                    });
                    table.next_waiter += 1;
                    (waiter_id, receiver)
                }
            }
        };

        let mut pending = PendingGrant {
            locks: self,
            key,
            owner,
            waiter_id,
            receiver,
            settled: false,
        };

        let end = tokio::select! {
            biased;
            delivered = &mut pending.receiver => WaitEnd::Delivered(delivered),
            _ = cancel.cancelled() => WaitEnd::Cancelled,
            _ = timeout.expired() => WaitEnd::Expired,
        };

        match end {
            WaitEnd::Delivered(Ok(Grant::Granted)) => {
                pending.settled = true;
                Ok(self.handle(key, owner, false))
            }
            WaitEnd::Delivered(Ok(Grant::Closed)) | WaitEnd::Delivered(Err(_)) => {
                pending.settled = true;
                Err(LockError::Closed)
            }
            WaitEnd::Expired => Err(pending.abandon(LockError::TimedOut)),
            WaitEnd::Cancelled => Err(pending.abandon(LockError::Cancelled)),
        }
    }

    fn handle(&self, key: &K, owner: TransactionId, reentrant: bool) -> LockHandle<K> {
        LockHandle {
            key: key.clone(),
            owner,
            reentrant,
        }
    }

    /// Takes a waiter out of the queue. A grant that already reached it is
    /// passed on to the next waiter.
    ///
    /// Returns true if the manager closed before the waiter was withdrawn.
    fn withdraw(
        &self,
        key: &K,
        owner: TransactionId,
        waiter_id: u64,
        receiver: &mut oneshot::Receiver<Grant>,
    ) -> bool {
        {
            let mut table = self.table();
            if let Some(lock) = table.keys.get_mut(key) {
                if let Some(pos) = lock.waiters.iter().position(|w| w.id == waiter_id) {
                    lock.waiters.remove(pos);
                    return false;
                }
            }
        }

        // Grants and close notices are sent under the table mutex, so a
        // waiter missing from the queue already has its message.
        match receiver.try_recv() {
            Ok(Grant::Granted) => {
                self.release(owner, key);
                false
            }
            Ok(Grant::Closed) => true,
            Err(_) => false,
        }
    }

    /// Releases `owner`'s lock on `key`, handing it to the next live waiter.
    ///
    /// Returns false if `owner` did not hold the key.
    pub fn release(&self, owner: TransactionId, key: &K) -> bool {
        let mut table = self.table();
        let handed_off = match table.keys.get_mut(key) {
            Some(lock) if lock.holder == owner => {
                let mut handed_off = false;
                while let Some(waiter) = lock.waiters.pop_front() {
                    // A dropped receiver means the waiting future is gone.
                    if waiter.grant.send(Grant::Granted).is_ok() {
                        lock.holder = waiter.owner;
                        handed_off = true;
                        break;
                    }
                }
                handed_off
            }
            _ => return false,
        };
        if !handed_off {
            table.keys.remove(key);
        }
        true
    }

    /// Releases the lock proven by `handle`.
    pub fn release_handle(&self, handle: &LockHandle<K>) -> bool {
        self.release(handle.owner, &handle.key)
    }

    /// Closes the manager: every queued waiter fails with `Closed` and new
    /// requests are refused. Current holders keep their locks until they
    /// release them.
    ///
    /// Returns the number of waiters that were force-released.
    pub fn close(&self) -> usize {
        let mut table = self.table();
        table.closed = true;
        let mut released = 0;
        for lock in table.keys.values_mut() {
            for waiter in lock.waiters.drain(..) {
                let _ = waiter.grant.send(Grant::Closed);
                released += 1;
            }
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Current holder of `key`.
    pub fn holder(&self, key: &K) -> Option<TransactionId> {
        self.table().keys.get(key).map(|lock| lock.holder)
    }

    /// Number of requests queued behind the holder of `key`.
    pub fn waiter_count(&self, key: &K) -> usize {
        self.table()
            .keys
            .get(key)
            .map_or(0, |lock| lock.waiters.len())
    }

    /// Number of keys currently locked.
    pub fn locked_keys(&self) -> usize {
        self.table().keys.len()
    }
}

impl<K> Default for LockManager<K>
where
    K: Ord + Clone + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::CancelSource;
    use std::sync::Arc;
    use std::time::Duration;

    fn txn(id: u64) -> TransactionId {
        TransactionId::new(id)
    }

    async fn wait_for_waiters(locks: &LockManager<u32>, key: u32, count: usize) {
        for _ in 0..500 {
            if locks.waiter_count(&key) == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("waiters never reached {}", count);
    }

    #[tokio::test]
    async fn test_uncontended_acquire() {
        let locks = LockManager::new();
        let handle = locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        assert!(!handle.is_reentrant());
        assert_eq!(locks.holder(&5), Some(txn(1)));
    }

    #[tokio::test]
    async fn test_reentrant_acquire() {
        let locks = LockManager::new();
        let cancel = CancelToken::none();
        locks.acquire(txn(1), &5u32, Timeout::IMMEDIATE, &cancel).await.unwrap();
        let again = locks.acquire(txn(1), &5u32, Timeout::IMMEDIATE, &cancel).await.unwrap();
        assert!(again.is_reentrant());
    }

    #[tokio::test]
    async fn test_immediate_timeout_on_contention() {
        let locks = LockManager::new();
        let cancel = CancelToken::none();
        locks.acquire(txn(1), &5u32, Timeout::IMMEDIATE, &cancel).await.unwrap();
        let result = locks.acquire(txn(2), &5u32, Timeout::IMMEDIATE, &cancel).await;
        assert_eq!(result.unwrap_err(), LockError::TimedOut);
        assert_eq!(locks.waiter_count(&5), 0);
    }

    #[tokio::test]
    async fn test_finite_timeout_withdraws_waiter() {
        let locks = LockManager::new();
        let cancel = CancelToken::none();
        locks.acquire(txn(1), &5u32, Timeout::IMMEDIATE, &cancel).await.unwrap();
        let result = locks
            .acquire(txn(2), &5u32, Timeout::from_millis(20), &cancel)
            .await;
        assert_eq!(result.unwrap_err(), LockError::TimedOut);
        assert_eq!(locks.waiter_count(&5), 0);
        assert_eq!(locks.holder(&5), Some(txn(1)));
    }

    #[tokio::test]
    async fn test_release_hands_off_in_fifo_order() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();

        let second = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(2), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 1).await;
        let third = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(3), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 2).await;

        assert!(locks.release(txn(1), &5));
        second.await.unwrap().unwrap();
        assert_eq!(locks.holder(&5), Some(txn(2)));

        assert!(locks.release(txn(2), &5));
        third.await.unwrap().unwrap();
        assert_eq!(locks.holder(&5), Some(txn(3)));

        assert!(locks.release(txn(3), &5));
        assert_eq!(locks.holder(&5), None);
        assert_eq!(locks.locked_keys(), 0);
    }

    #[tokio::test]
    async fn test_release_by_non_holder_is_rejected() {
        let locks = LockManager::new();
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        assert!(!locks.release(txn(2), &5));
        assert!(!locks.release(txn(1), &6));
        assert_eq!(locks.holder(&5), Some(txn(1)));
    }

    #[tokio::test]
    async fn test_cancel_withdraws_waiter() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();

        let source = CancelSource::new();
        let token = source.token();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move { locks.acquire(txn(2), &5u32, Timeout::Infinite, &token).await })
        };
        wait_for_waiters(&locks, 5, 1).await;
        source.cancel();

        assert_eq!(waiter.await.unwrap().unwrap_err(), LockError::Cancelled);
        assert_eq!(locks.waiter_count(&5), 0);
    }

    #[tokio::test]
    async fn test_close_fails_infinite_waiters() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(2), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 1).await;

        assert_eq!(locks.close(), 1);
        assert_eq!(waiter.await.unwrap().unwrap_err(), LockError::Closed);

        let late = locks
            .acquire(txn(3), &6u32, Timeout::Infinite, &CancelToken::none())
            .await;
        assert_eq!(late.unwrap_err(), LockError::Closed);
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_skipped_on_release() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        let abandoned = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(2), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 1).await;
        abandoned.abort();
        let _ = abandoned.await;
        assert_eq!(locks.waiter_count(&5), 0);

        assert!(locks.release(txn(1), &5));
        assert_eq!(locks.holder(&5), None);
    }

    #[tokio::test]
    async fn test_grant_to_dropped_waiter_is_passed_on() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        let second = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(2), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 1).await;
        let third = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(3), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 2).await;

        // The grant reaches the second waiter, whose task never runs again.
        assert!(locks.release(txn(1), &5));
        assert_eq!(locks.holder(&5), Some(txn(2)));
        second.abort();
        assert!(second.await.unwrap_err().is_cancelled());

        third.await.unwrap().unwrap();
        assert_eq!(locks.holder(&5), Some(txn(3)));
        assert!(locks.release(txn(3), &5));
        assert_eq!(locks.locked_keys(), 0);
    }

    #[tokio::test]
    async fn test_grant_to_dropped_last_waiter_frees_key() {
        let locks = Arc::new(LockManager::new());
        locks
            .acquire(txn(1), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                locks.acquire(txn(2), &5u32, Timeout::Infinite, &CancelToken::none()).await
            })
        };
        wait_for_waiters(&locks, 5, 1).await;

        assert!(locks.release(txn(1), &5));
        waiter.abort();
        let _ = waiter.await;

        assert_eq!(locks.holder(&5), None);
        locks
            .acquire(txn(3), &5u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_handle() {
        let locks = LockManager::new();
        let handle = locks
            .acquire(txn(4), &1u32, Timeout::IMMEDIATE, &CancelToken::none())
            .await
            .unwrap();
        assert_eq!(handle.owner(), txn(4));
        assert_eq!(handle.key(), &1);
        assert!(locks.release_handle(&handle));
        assert_eq!(locks.locked_keys(), 0);
    }
}
