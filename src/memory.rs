use std::{fmt, slice, sync::Arc};

use crate::device::Driver;

/// Memory used for buffer exchange
#[allow(clippy::unreadable_literal)]
#[rustfmt::skip]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Memory {
    Mmap        = 1,
}

impl fmt::Display for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Memory::Mmap => write!(f, "memory-mapped"),
        }
    }
}

/// Memory-mapped region
///
/// The backing memory is allocated by the driver and mapped into the process, so frames reach
/// the application without a copy. Read access is only sound while the driver does not own
/// the buffer; [`crate::io::mmap::Arena`] tracks that.
///
/// The destructor automatically unmaps the memory.
pub struct Mmap {
    ptr: *mut u8,
    len: usize,
    driver: Arc<dyn Driver>,
}

// The region is plain memory; access is coordinated by the owning arena.
unsafe impl Send for Mmap {}
unsafe impl Sync for Mmap {}

impl Mmap {
    /// Maps `len` bytes at the driver-advertised `offset`
    pub(crate) fn new(driver: Arc<dyn Driver>, len: usize, offset: u32) -> std::io::Result<Self> {
        let ptr = driver.map(len, offset)?;
        Ok(Mmap { ptr, len, driver })
    }

    /// Size of the mapped region in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read-only view of the first `len` bytes (clamped to the mapping)
    ///
    /// # Safety
    ///
    /// The driver must not be writing into the buffer for the lifetime of the returned slice.
    pub(crate) unsafe fn view(&self, len: usize) -> &[u8] {
        slice::from_raw_parts(self.ptr, len.min(self.len))
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        if let Err(e) = unsafe { self.driver.unmap(self.ptr, self.len) } {
            tracing::warn!(len = self.len, error = %e, "failed to unmap buffer");
        }
    }
}

impl fmt::Debug for Mmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mmap")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}
