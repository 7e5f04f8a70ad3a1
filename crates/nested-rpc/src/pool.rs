// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Bounded resource pool.
//!
//! A fixed number of resources is created up front and handed out one caller
//! at a time. Admission is counted by a fair [`Semaphore`] whose permits
//! mirror the idle store, so `acquire` can only complete once a resource is
//! actually idle. Resources are returned by dropping the [`Pooled`] guard.

use std::fmt;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, info};

/// Errors raised by [`ResourcePool`].
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool capacity must be at least 1")]
    ZeroCapacity,

    #[error("failed to create pooled resource #{index}: {reason}")]
    Init { index: usize, reason: String },

    #[error("no pooled resource became idle within {0:?}")]
    ExhaustedTimeout(Duration),

    #[error("pool is closed")]
    Closed,
}

struct PoolInner<T> {
    capacity: usize,
    /// One permit per idle resource
    permits: Semaphore,
    /// LIFO store
    idle: Mutex<Vec<T>>,
    outstanding: AtomicUsize,
    closed: AtomicBool,
}

impl<T> PoolInner<T> {
    fn idle(&self) -> MutexGuard<'_, Vec<T>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pop an idle resource after a permit was consumed. Only a concurrent
    /// `close` can leave the store empty here.
    fn take(self: &Arc<Self>) -> Result<Pooled<T>, PoolError> {
        let mut idle = self.idle();
        let resource = idle.pop().ok_or(PoolError::Closed)?;
        // Counter moves under the idle lock, see `counts`
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        drop(idle);
        Ok(Pooled {
            resource: Some(resource),
            pool: Arc::clone(self),
        })
    }

    fn give_back(&self, resource: T) {
        let mut idle = self.idle();
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        // `closed` only flips under the idle lock
        if self.closed.load(Ordering::Acquire) {
            drop(idle);
            drop(resource);
            return;
        }
        debug_assert!(idle.len() < self.capacity, "pool over-released");
        idle.push(resource);
        drop(idle);
        self.permits.add_permits(1);
    }
}

/// Fixed-capacity pool of eagerly created resources.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct ResourcePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (idle, outstanding) = self.counts();
        f.debug_struct("ResourcePool")
            .field("capacity", &self.capacity())
            .field("idle", &idle)
            .field("outstanding", &outstanding)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<T> ResourcePool<T> {
    /// Create a pool by calling `factory(index)` `capacity` times, in order.
    ///
    /// If any call fails the resources already created are dropped.
    pub fn new<F, E>(capacity: usize, mut factory: F) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Result<T, E>,
        E: fmt::Display,
    {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let mut resources = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let resource = factory(index).map_err(|e| PoolError::Init {
                index,
                reason: e.to_string(),
            })?;
            resources.push(resource);
        }
        Ok(Self::from_resources(resources))
    }

    /// Like [`ResourcePool::new`] for factories that must await (connections,
    /// broker channels). Resources are still created one after another.
    pub async fn from_async_factory<F, Fut, E>(
        capacity: usize,
        mut factory: F,
    ) -> Result<Self, PoolError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let mut resources = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let resource = factory(index).await.map_err(|e| PoolError::Init {
                index,
                reason: e.to_string(),
            })?;
            resources.push(resource);
        }
        Ok(Self::from_resources(resources))
    }

    fn from_resources(resources: Vec<T>) -> Self {
        let capacity = resources.len();
        debug!(capacity, "resource pool initialized");
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                permits: Semaphore::new(capacity),
                idle: Mutex::new(resources),
                outstanding: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Wait until a resource is idle and check it out.
    ///
    /// Waiters are served in arrival order. Dropping the returned future
    /// before it completes leaves the pool untouched.
    pub async fn acquire(&self) -> Result<Pooled<T>, PoolError> {
        let permit = self
            .inner
            .permits
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;
        permit.forget();
        self.inner.take()
    }

    /// [`ResourcePool::acquire`] bounded by `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Pooled<T>, PoolError> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::ExhaustedTimeout(timeout)),
        }
    }

    /// Check out a resource only if one is idle right now.
    pub fn try_acquire(&self) -> Option<Pooled<T>> {
        match self.inner.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                self.inner.take().ok()
            }
            Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
        }
    }

    /// Destroy every idle resource and refuse further checkouts.
    ///
    /// Resources still checked out are destroyed when their guard drops.
    pub fn close(&self) {
        let drained: Vec<T> = {
            let mut idle = self.inner.idle();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            self.inner.permits.close();
            std::mem::take(&mut *idle)
        };
        info!(
            destroyed = drained.len(),
            outstanding = self.outstanding(),
            "resource pool closed"
        );
        drop(drained);
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn idle(&self) -> usize {
        self.inner.idle().len()
    }

    pub fn outstanding(&self) -> usize {
        self.counts().1
    }

    /// `(idle, outstanding)` read together under the idle lock. Until the
    /// pool is closed the two always add up to the capacity.
    pub fn counts(&self) -> (usize, usize) {
        let idle = self.inner.idle();
        (idle.len(), self.inner.outstanding.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// A checked-out resource. Dropping it returns the resource to its pool.
pub struct Pooled<T> {
    resource: Option<T>,
    pool: Arc<PoolInner<T>>,
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` takes the resource out
        match &self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource accessed after release"),
        }
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.resource {
            Some(resource) => resource,
            None => unreachable!("pooled resource accessed after release"),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.resource).finish()
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.give_back(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        let err = ResourcePool::new(0, |i| Ok::<_, String>(i)).unwrap_err();
        assert!(matches!(err, PoolError::ZeroCapacity));
    }

    #[test]
    fn test_factory_called_in_order() {
        let mut calls = Vec::new();
        let pool = ResourcePool::new(3, |i| {
            calls.push(i);
            Ok::<_, String>(i * 10)
        })
        .unwrap();
        assert_eq!(calls, vec![0, 1, 2]);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.idle(), 3);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn test_factory_failure_aborts() {
        let err = ResourcePool::new(4, |i| {
            if i == 2 {
                Err("database unreachable")
            } else {
                Ok(i)
            }
        })
        .unwrap_err();
        match err {
            PoolError::Init { index, reason } => {
                assert_eq!(index, 2);
                assert_eq!(reason, "database unreachable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_try_acquire_exhausts() {
        let pool = ResourcePool::new(2, |i| Ok::<_, String>(i)).unwrap();
        let a = pool.try_acquire().unwrap();
        let b = pool.try_acquire().unwrap();
        assert!(pool.try_acquire().is_none());
        assert_eq!(pool.outstanding(), 2);
        assert_ne!(*a, *b);
        drop(a);
        assert_eq!(pool.idle(), 1);
        assert!(pool.try_acquire().is_some());
        drop(b);
    }

    #[test]
    fn test_lifo_reuse() {
        let pool = ResourcePool::new(3, |i| Ok::<_, String>(i)).unwrap();
        let first = pool.try_acquire().unwrap();
        let value = *first;
        drop(first);
        let again = pool.try_acquire().unwrap();
        assert_eq!(*again, value);
    }

    #[test]
    fn test_deref_mut_persists() {
        let pool = ResourcePool::new(1, |_| Ok::<_, String>(Vec::<u8>::new())).unwrap();
        pool.try_acquire().unwrap().push(7);
        assert_eq!(*pool.try_acquire().unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn test_async_factory() {
        let pool = ResourcePool::from_async_factory(2, |i| async move {
            tokio::task::yield_now().await;
            Ok::<_, String>(format!("conn-{i}"))
        })
        .await
        .unwrap();
        assert_eq!(pool.idle(), 2);
        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, "conn-1");
    }

    #[tokio::test]
    async fn test_acquire_timeout() {
        let pool = ResourcePool::new(1, |i| Ok::<_, String>(i)).unwrap();
        let _held = pool.acquire().await.unwrap();
        let err = pool
            .acquire_timeout(Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::ExhaustedTimeout(_)));
        assert_eq!(pool.outstanding(), 1);
        assert_eq!(pool.idle(), 0);
    }

    #[tokio::test]
    async fn test_close_fails_later_acquire() {
        let pool = ResourcePool::new(2, |i| Ok::<_, String>(i)).unwrap();
        let held = pool.acquire().await.unwrap();
        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.idle(), 0);
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
        assert!(pool.try_acquire().is_none());

        // Released after close: destroyed, not re-pooled
        drop(held);
        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_close_wakes_waiters() {
        let pool = ResourcePool::new(1, |i| Ok::<_, String>(i)).unwrap();
        let held = pool.acquire().await.unwrap();
        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await.map(|r| *r) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.close();
        assert!(matches!(waiter.await.unwrap(), Err(PoolError::Closed)));
        drop(held);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_counts_add_up_under_churn() {
        let pool = ResourcePool::new(3, |i| Ok::<_, String>(i)).unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let workers: Vec<_> = (0..6)
            .map(|_| {
                let pool = pool.clone();
                let stop = Arc::clone(&stop);
                tokio::spawn(async move {
                    while !stop.load(Ordering::Relaxed) {
                        if let Some(held) = pool.try_acquire() {
                            tokio::task::yield_now().await;
                            drop(held);
                        }
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..20_000 {
            let (idle, outstanding) = pool.counts();
            assert_eq!(idle + outstanding, 3, "idle={idle} outstanding={outstanding}");
            tokio::task::yield_now().await;
        }

        stop.store(true, Ordering::Relaxed);
        for worker in workers {
            worker.await.unwrap();
        }
        assert_eq!(pool.counts(), (3, 0));
    }
}
