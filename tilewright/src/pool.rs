//! Bounded pool of expensive renderer instances.
//!
//! A [`ResourcePool`] caps how many instances of one compiled map
//! configuration exist at once. Instances are created lazily through an
//! [`InstanceFactory`] up to the capacity, reused once released, and
//! destroyed only when the pool is drained.
//!
//! # Release discipline
//!
//! [`ResourcePool::acquire`] returns a [`PooledInstance`] guard. The instance
//! goes back to the idle list when the guard is released or dropped, so every
//! exit path of the caller (early return, `?`, panic) releases it exactly once.
//! [`ResourcePool::with_instance`] wraps the whole acquire/run/release cycle.
//!
//! # Shutdown
//!
//! [`ResourcePool::drain_and_close_all`] closes the semaphore so queued and
//! future acquires fail with [`TileError::PoolClosed`], waits until every
//! in-use instance has been released, then destroys the idle instances.
//! An owner going away without draining calls
//! [`ResourcePool::close_in_background`] instead.
//!
//! ```ignore
//! let pool = ResourcePool::new("roads", factory, 4, EventSink::disabled());
//! let tile = pool.with_instance(|map| async move { map.render(&coord).await }).await?;
//! pool.drain_and_close_all().await;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::error::{TileError, TileResult};
use crate::events::{EventSink, TileEvent};

/// Default pool capacity: one instance per available processing unit.
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Creates and destroys the instances held by a [`ResourcePool`].
pub trait InstanceFactory<T>: Send + Sync {
    /// Opens a new instance.
    fn create(&self) -> BoxFuture<'_, TileResult<T>>;

    /// Releases an instance for good.
    fn destroy(&self, instance: T) -> BoxFuture<'_, ()>;
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub in_use: usize,
    pub idle: usize,
    pub created: usize,
    pub acquired: u64,
    pub released: u64,
    pub peak_in_use: usize,
}

/// A semaphore-bounded pool of reusable instances.
pub struct ResourcePool<T> {
    name: String,
    factory: Arc<dyn InstanceFactory<T>>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    idle: Mutex<Vec<T>>,
    in_use: watch::Sender<usize>,
    closing: AtomicBool,
    created: AtomicUsize,
    acquired: AtomicU64,
    released: AtomicU64,
    peak_in_use: AtomicUsize,
    events: EventSink,
}

impl<T> ResourcePool<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty pool. A capacity of zero is raised to one.
    pub fn new(
        name: impl Into<String>,
        factory: Box<dyn InstanceFactory<T>>,
        capacity: usize,
        events: EventSink,
    ) -> Self {
        let capacity = capacity.max(1);
        let (in_use, _) = watch::channel(0);
        Self {
            name: name.into(),
            factory: Arc::from(factory),
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            in_use,
            closing: AtomicBool::new(false),
            created: AtomicUsize::new(0),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            peak_in_use: AtomicUsize::new(0),
            events,
        }
    }

    /// Acquires an instance, waiting for a free slot if the pool is at capacity.
    ///
    /// Reuses an idle instance when one exists, otherwise opens a new one.
    /// A creation failure rejects only this call.
    pub async fn acquire(&self) -> TileResult<PooledInstance<'_, T>> {
        if self.closing.load(Ordering::SeqCst) {
            return Err(TileError::PoolClosed);
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TileError::PoolClosed)?;

        // Count the slot before re-checking `closing` so a concurrent drain
        // either sees this acquire or this acquire sees the drain. Until the
        // guard is built, `slot` gives the count back if this future fails or
        // is dropped mid-creation.
        let slot = SlotReservation::new(self);
        if self.closing.load(Ordering::SeqCst) {
            return Err(TileError::PoolClosed);
        }

        let reused = self.idle.lock().pop();
        let instance = match reused {
            Some(instance) => instance,
            None => {
                let instance = self.factory.create().await?;
                self.created.fetch_add(1, Ordering::Relaxed);
                self.events.emit(TileEvent::PoolInstanceCreated);
                debug!(pool = %self.name, "Opened renderer instance");
                instance
            }
        };

        slot.commit();
        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.update_peak(*self.in_use.borrow());

        Ok(PooledInstance {
            instance: Some(instance),
            pool: self,
            _permit: permit,
        })
    }

    /// Returns an instance to the pool.
    pub fn release(&self, instance: PooledInstance<'_, T>) {
        drop(instance);
    }

    /// Runs `action` with an acquired instance, releasing it on every exit path.
    pub async fn with_instance<F, Fut, R>(&self, action: F) -> TileResult<R>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future<Output = TileResult<R>>,
    {
        let guard = self.acquire().await?;
        let result = action(guard.instance().clone()).await;
        self.release(guard);
        result
    }

    /// Stops accepting acquires, waits for in-use instances, destroys them all.
    ///
    /// Safe to call repeatedly and while acquires are queued; queued acquires
    /// fail with [`TileError::PoolClosed`].
    pub async fn drain_and_close_all(&self) {
        self.closing.store(true, Ordering::SeqCst);
        self.semaphore.close();

        let mut rx = self.in_use.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|n| *n == 0).await;

        let idle: Vec<T> = std::mem::take(&mut *self.idle.lock());
        let count = idle.len();
        for instance in idle {
            self.factory.destroy(instance).await;
            self.events.emit(TileEvent::PoolInstanceDestroyed);
        }

        if count > 0 {
            debug!(pool = %self.name, destroyed = count, "Drained resource pool");
        }
    }

    /// Closes the pool and destroys its idle instances on a background task.
    ///
    /// For owners that are being dropped: nothing can hold an instance any
    /// more, so there is nothing to wait for. No-op once a drain started.
    pub fn close_in_background(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        self.semaphore.close();

        let idle: Vec<T> = std::mem::take(&mut *self.idle.lock());
        if idle.is_empty() {
            return;
        }

        let name = self.name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let factory = Arc::clone(&self.factory);
                let events = self.events.clone();
                handle.spawn(async move {
                    let count = idle.len();
                    for instance in idle {
                        factory.destroy(instance).await;
                        events.emit(TileEvent::PoolInstanceDestroyed);
                    }
                    debug!(pool = %name, destroyed = count, "Closed released resource pool");
                });
            }
            Err(_) => {
                warn!(pool = %name, "No async runtime; idle instances dropped without closing");
            }
        }
    }

    /// True once a drain has started.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            available: self.semaphore.available_permits(),
            in_use: *self.in_use.borrow(),
            idle: self.idle.lock().len(),
            created: self.created.load(Ordering::Relaxed),
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            peak_in_use: self.peak_in_use.load(Ordering::Relaxed),
        }
    }

    fn update_peak(&self, current: usize) {
        let mut peak = self.peak_in_use.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_in_use.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    fn give_back(&self, instance: T) {
        self.idle.lock().push(instance);
        self.released.fetch_add(1, Ordering::Relaxed);
        self.in_use.send_modify(|n| *n -= 1);
    }
}

impl<T> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field(
                "in_use",
                &format_args!("{}/{}", *self.in_use.borrow(), self.capacity),
            )
            .field("closing", &self.closing.load(Ordering::Relaxed))
            .finish()
    }
}

/// One counted `in_use` slot that has no instance yet.
///
/// Dropping it uncounts the slot; [`SlotReservation::commit`] hands the count
/// over to the [`PooledInstance`] about to be built.
struct SlotReservation<'a, T> {
    pool: &'a ResourcePool<T>,
    committed: bool,
}

impl<'a, T> SlotReservation<'a, T> {
    fn new(pool: &'a ResourcePool<T>) -> Self {
        pool.in_use.send_modify(|n| *n += 1);
        Self {
            pool,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<T> Drop for SlotReservation<'_, T> {
    fn drop(&mut self) {
        if !self.committed {
            self.pool.in_use.send_modify(|n| *n -= 1);
        }
    }
}

/// An instance checked out of a [`ResourcePool`].
///
/// Returned to the pool when dropped.
pub struct PooledInstance<'a, T>
where
    T: Clone + Send + Sync + 'static,
{
    instance: Option<T>,
    pool: &'a ResourcePool<T>,
    _permit: OwnedSemaphorePermit,
}

impl<T> PooledInstance<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Borrows the pooled instance.
    pub fn instance(&self) -> &T {
        // Only `Drop` takes the instance out
        self.instance
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled instance already released"))
    }
}

impl<T> std::fmt::Debug for PooledInstance<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledInstance")
            .field("pool", &self.pool.name)
            .field("held", &self.instance.is_some())
            .finish()
    }
}

impl<T> Drop for PooledInstance<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.pool.give_back(instance);
        }
    }
}
