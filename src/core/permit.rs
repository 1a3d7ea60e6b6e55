//! Counting permit pool (semaphore).
//!
//! At most `size` [`Permit`]s are outstanding at any instant. `acquire` parks
//! the calling thread on a `parking_lot::Condvar` while the pool is exhausted;
//! dropping a permit releases it and wakes one waiter. Release never blocks
//! and cannot fail, so it is safe on every exit path including unwinding.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use super::error::DispatchError;

struct Inner {
    size: usize,
    /// Permits currently available.
    available: Mutex<usize>,
    released: Condvar,
}

/// A fixed-size pool of permits. Cloning shares the same pool.
#[derive(Clone)]
pub struct PermitPool {
    inner: Arc<Inner>,
}

impl PermitPool {
    /// Create a pool of `size` permits.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidConfig`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, DispatchError> {
        if size == 0 {
            return Err(DispatchError::InvalidConfig(
                "permit pool size must be greater than 0".into(),
            ));
        }
        Ok(Self {
            inner: Arc::new(Inner {
                size,
                available: Mutex::new(size),
                released: Condvar::new(),
            }),
        })
    }

    /// Pool sized to the host's available parallelism.
    #[must_use]
    pub fn with_host_parallelism() -> Self {
        let size = num_cpus::get().max(1);
        Self {
            inner: Arc::new(Inner {
                size,
                available: Mutex::new(size),
                released: Condvar::new(),
            }),
        }
    }

    /// Block until a permit is available and take it.
    #[must_use = "the permit is released as soon as it is dropped"]
    pub fn acquire(&self) -> Permit {
        let mut available = self.inner.available.lock();
        while *available == 0 {
            self.inner.released.wait(&mut available);
        }
        *available -= 1;
        Permit {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Take a permit only if one is immediately available.
    #[must_use]
    pub fn try_acquire(&self) -> Option<Permit> {
        let mut available = self.inner.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(Permit {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Total permits in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Permits not currently held.
    #[must_use]
    pub fn available(&self) -> usize {
        *self.inner.available.lock()
    }

    /// Permits currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.inner.size - self.available()
    }
}

impl fmt::Debug for PermitPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitPool")
            .field("size", &self.inner.size)
            .field("available", &self.available())
            .finish()
    }
}

/// A held permit. Released when dropped.
pub struct Permit {
    inner: Arc<Inner>,
}

impl Permit {
    /// Release the permit explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut available = self.inner.available.lock();
        *available += 1;
        self.inner.released.notify_one();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit").field("pool_size", &self.inner.size).finish()
    }
}
