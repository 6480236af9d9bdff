//! Bounded views over caller-owned memory.
//!
//! The engine never owns caller buffers. A `BufferRef` pairs a raw pointer
//! with a byte length; the length is validated against the collective's
//! geometry at `start()` and every access is range checked against it.

/// A sized, borrowed view of caller memory (host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRef {
    ptr: u64,
    len_bytes: usize,
}

// SAFETY: a BufferRef is an address plus a length; the construction contract
// makes the caller responsible for exclusive access while a collective runs.
unsafe impl Send for BufferRef {}
unsafe impl Sync for BufferRef {}

impl BufferRef {
    /// Create a new buffer reference.
    ///
    /// # Safety
    /// `ptr` must point to at least `len_bytes` of valid memory, which must
    /// stay valid and must not be accessed by the caller until every
    /// collective started with this reference has completed.
    pub unsafe fn new(ptr: u64, len_bytes: usize) -> Self {
        Self { ptr, len_bytes }
    }

    /// View a slice as a read-only source buffer.
    ///
    /// # Safety
    /// Same contract as [`BufferRef::new`].
    pub unsafe fn from_slice(data: &[u8]) -> Self {
        Self {
            ptr: data.as_ptr() as u64,
            len_bytes: data.len(),
        }
    }

    /// View a mutable slice as a destination buffer.
    ///
    /// # Safety
    /// Same contract as [`BufferRef::new`].
    pub unsafe fn from_mut_slice(data: &mut [u8]) -> Self {
        Self {
            ptr: data.as_mut_ptr() as u64,
            len_bytes: data.len(),
        }
    }

    /// Size of the buffer in bytes.
    pub fn len_bytes(&self) -> usize {
        self.len_bytes
    }

    /// Returns true if the buffer has zero length.
    pub fn is_empty(&self) -> bool {
        self.len_bytes == 0
    }

    /// Get the raw `u64` pointer.
    pub fn as_u64(&self) -> u64 {
        self.ptr
    }

    /// Copy `len` bytes starting at `offset` out of the caller buffer.
    pub(crate) fn read(&self, offset: usize, len: usize) -> Option<&[u8]> {
        if len == 0 {
            return Some(&[]);
        }
        let end = offset.checked_add(len)?;
        if end > self.len_bytes {
            return None;
        }
        // SAFETY: range checked above; validity guaranteed by the constructor contract.
        Some(unsafe { std::slice::from_raw_parts((self.ptr as *const u8).add(offset), len) })
    }

    /// Copy `data` into the caller buffer at `offset`.
    pub(crate) fn write(&self, offset: usize, data: &[u8]) -> bool {
        if data.is_empty() {
            return true;
        }
        let Some(end) = offset.checked_add(data.len()) else {
            return false;
        };
        if end > self.len_bytes {
            return false;
        }
        // SAFETY: range checked above; exclusive access guaranteed by the constructor contract.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                (self.ptr as *mut u8).add(offset),
                data.len(),
            );
        }
        true
    }
}

impl std::fmt::Display for BufferRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BufferRef(0x{:x}, {}B)", self.ptr, self.len_bytes)
    }
}
