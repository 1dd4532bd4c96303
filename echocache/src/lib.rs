//! # Echo cache
//!
//! A cell holding an immutable snapshot of a value which is expensive to
//! build (a directory scan, a remote listing), refreshed on demand once the
//! snapshot is older than the cell's expiration.
//!
//! Readers always receive a complete snapshot. A rebuild happens off to the
//! side and is published atomically, so a reader never observes a value in
//! the middle of being rebuilt. Callers which find the snapshot stale while
//! another rebuild is already in flight wait for that rebuild and echo its
//! result instead of starting their own.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

/// A snapshot value, together with the instant it was published.
#[derive(Debug)]
pub struct Loaded<T> {
    value: T,
    loaded_at: Instant,
}

impl<T> Loaded<T> {
    /// The instant this snapshot was published.
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// The snapshot value.
    pub fn value(&self) -> &T {
        &self.value
    }

    fn is_fresh(&self, expiration: Duration) -> bool {
        self.loaded_at.elapsed() <= expiration
    }
}

impl<T> Deref for Loaded<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

/// A TTL-gated snapshot cell.
///
/// The cell starts empty. The first call to [`Snapshot::get`] builds the
/// value, and later calls return the published snapshot until it is older
/// than the expiration, at which point the next caller rebuilds it.
/// Only one rebuild runs at a time.
pub struct Snapshot<T> {
    current: ArcSwapOption<Loaded<T>>,
    expiration: Duration,
    gate: Mutex<()>,
    loads: AtomicU64,
}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("expiration", &self.expiration)
            .field("loads", &self.loads())
            .field("loaded", &self.current.load().is_some())
            .finish()
    }
}

impl<T> Snapshot<T> {
    /// Create an empty cell whose snapshots stay fresh for `expiration`.
    #[must_use]
    pub fn new(expiration: Duration) -> Self {
        Self {
            current: ArcSwapOption::empty(),
            expiration,
            gate: Mutex::new(()),
            loads: AtomicU64::new(0),
        }
    }

    /// How long a published snapshot stays fresh.
    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Number of snapshots published so far.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::Acquire)
    }

    /// The most recently published snapshot, fresh or not.
    pub fn current(&self) -> Option<Arc<Loaded<T>>> {
        self.current.load_full()
    }

    /// The most recently published snapshot, if it has not expired.
    pub fn fresh(&self) -> Option<Arc<Loaded<T>>> {
        self.current
            .load_full()
            .filter(|loaded| loaded.is_fresh(self.expiration))
    }

    /// Get the current snapshot, rebuilding it with `load` when the cell is
    /// empty or the snapshot has expired.
    ///
    /// When `load` fails nothing is published and the error is returned;
    /// the next caller will try again.
    pub async fn get<F, Fut, E>(&self, load: F) -> Result<Arc<Loaded<T>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(loaded) = self.fresh() {
            return Ok(loaded);
        }

        let _guard = self.gate.lock().await;

        // Whoever held the gate before us may have just published.
        if let Some(loaded) = self.fresh() {
            tracing::trace!("Reusing snapshot from concurrent rebuild");
            return Ok(loaded);
        }

        let value = load().await?;
        Ok(self.publish(value))
    }

    /// Rebuild the snapshot with `load` regardless of its age.
    pub async fn refresh<F, Fut, E>(&self, load: F) -> Result<Arc<Loaded<T>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _guard = self.gate.lock().await;
        let value = load().await?;
        Ok(self.publish(value))
    }

    fn publish(&self, value: T) -> Arc<Loaded<T>> {
        let loaded = Arc::new(Loaded {
            value,
            loaded_at: Instant::now(),
        });
        self.current.store(Some(Arc::clone(&loaded)));
        self.loads.fetch_add(1, Ordering::AcqRel);
        tracing::trace!("Published new snapshot");
        loaded
    }
}
