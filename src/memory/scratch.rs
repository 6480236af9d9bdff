use crossbeam_queue::ArrayQueue;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Recycling pool for actor scratch storage.
///
/// Checkout resizes a recycled `Vec` (or a fresh one when the free list is
/// empty) to the requested length, zeroed. Dropping the `ScratchBuffer`
/// returns the storage. The pool counts checkouts and releases so leaks and
/// double releases are observable.
#[derive(Debug)]
pub struct ScratchPool {
    free: ArrayQueue<Vec<u8>>,
    allocated: AtomicUsize,
    released: AtomicUsize,
    live_bytes: AtomicUsize,
}

/// Snapshot of pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScratchStats {
    /// Buffers checked out since the pool was created.
    pub allocated: usize,
    /// Buffers returned since the pool was created.
    pub released: usize,
    /// Bytes currently checked out.
    pub live_bytes: usize,
}

impl ScratchStats {
    /// Buffers currently checked out.
    pub fn live(&self) -> usize {
        self.allocated - self.released
    }
}

impl ScratchPool {
    /// Create a pool that keeps up to `capacity` recycled buffers.
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: ArrayQueue::new(capacity.max(1)),
            allocated: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            live_bytes: AtomicUsize::new(0),
        })
    }

    /// Check out a zeroed buffer of `len` bytes.
    pub fn checkout(self: &Arc<Self>, len: usize) -> ScratchBuffer {
        let mut buf = self.free.pop().unwrap_or_default();
        buf.clear();
        buf.resize(len, 0);
        self.allocated.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_add(len, Ordering::Relaxed);
        ScratchBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    pub fn stats(&self) -> ScratchStats {
        ScratchStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            live_bytes: self.live_bytes.load(Ordering::Relaxed),
        }
    }

    fn return_buf(&self, buf: Vec<u8>) {
        self.released.fetch_add(1, Ordering::Relaxed);
        self.live_bytes.fetch_sub(buf.len(), Ordering::Relaxed);
        // Full free list: drop the storage.
        let _ = self.free.push(buf);
    }
}

/// Scratch storage owned by exactly one actor. Derefs to `[u8]`.
pub struct ScratchBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<ScratchPool>,
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl DerefMut for ScratchBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for ScratchBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.return_buf(buf);
        }
    }
}

impl std::fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ScratchBuffer({}B)", self.len())
    }
}
