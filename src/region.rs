//! Shared memory region.
//!
//! The region holds the two buffer bodies followed by the control block:
//!
//! ```text
//! base + 0      buffer 0 body   (buffer_size bytes)
//! base + B      buffer 1 body   (buffer_size bytes)
//! base + 2*B    control block   (32 KiB)
//! ```
//!
//! The base address is deployment configuration (a linker-placed SRAM
//! window on hardware, an owned allocation in hosted tests); the library
//! never bakes one in. All address arithmetic lives here — the rest of the
//! crate only sees typed views.

use crate::control::{ControlBlock, CONTROL_BLOCK_SIZE, NUM_BUFFERS};

/// Default buffer body size.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Typed view over the shared window. Copyable: it is a view, not an owner.
#[derive(Clone, Copy)]
pub struct SharedRegion {
    base: *mut u8,
    buffer_size: usize,
}

// Views are handed to both sides; exclusivity of the buffer bodies is
// enforced by the ownership protocol, the control block is Sync itself.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Bytes the region occupies for a given buffer size.
    pub const fn required_size(buffer_size: usize) -> usize {
        NUM_BUFFERS * buffer_size + CONTROL_BLOCK_SIZE
    }

    /// Wrap a raw shared window.
    ///
    /// # Safety
    ///
    /// `base` must point to at least [`Self::required_size`] bytes of
    /// memory that both cores map at compatible addresses, aligned to 64
    /// bytes, and zero-initialized (or about to be initialized by the
    /// consumer). No other code may alias the control block except through
    /// `SharedRegion` views.
    pub unsafe fn from_raw(base: *mut u8, buffer_size: usize) -> SharedRegion {
        debug_assert!(base as usize % 64 == 0);
        debug_assert!(buffer_size % 64 == 0);
        SharedRegion { base, buffer_size }
    }

    /// Configured size of each buffer body.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// The control block at the tail of the region.
    pub fn control(&self) -> &ControlBlock {
        unsafe { &*(self.base.add(NUM_BUFFERS * self.buffer_size) as *const ControlBlock) }
    }

    /// Raw pointer to one buffer body. Callers must hold the matching
    /// WRITING/READING ownership before touching the bytes.
    pub(crate) fn buffer_ptr(&self, id: usize) -> *mut u8 {
        debug_assert!(id < NUM_BUFFERS);
        unsafe { self.base.add(id * self.buffer_size) }
    }
}

/// Owned, 64-byte aligned backing store for hosted runs and tests.
#[cfg(feature = "std")]
pub struct OwnedRegion {
    base: *mut u8,
    layout: std::alloc::Layout,
    buffer_size: usize,
}

#[cfg(feature = "std")]
unsafe impl Send for OwnedRegion {}
#[cfg(feature = "std")]
unsafe impl Sync for OwnedRegion {}

#[cfg(feature = "std")]
impl OwnedRegion {
    /// Allocate a zeroed region sized for `buffer_size` bodies.
    pub fn new(buffer_size: usize) -> OwnedRegion {
        let layout =
            std::alloc::Layout::from_size_align(SharedRegion::required_size(buffer_size), 64)
                .expect("region layout");
        let base = unsafe { std::alloc::alloc_zeroed(layout) };
        assert!(!base.is_null(), "region allocation failed");
        OwnedRegion {
            base,
            layout,
            buffer_size,
        }
    }

    /// A shareable view of this region.
    pub fn region(&self) -> SharedRegion {
        unsafe { SharedRegion::from_raw(self.base, self.buffer_size) }
    }
}

#[cfg(feature = "std")]
impl Drop for OwnedRegion {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.base, self.layout) }
    }
}
