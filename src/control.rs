//! Shared control block.
//!
//! One `ControlBlock` lives at a fixed offset of the shared region and is
//! the only metadata both cores touch. Its layout is `#[repr(C)]` and
//! asserted at compile time: producer and consumer builds must agree on it
//! byte for byte.
//!
//! State words are compare-and-swapped with sequentially consistent
//! ordering and each sits on its own 64-byte line so the two cores never
//! contend on one line. Counters are atomic fetch-adds. Timestamps are
//! plain 64-bit fields written with volatile stores: the owning side is the
//! only writer and peer reads are diagnostic snapshots, which sidesteps the
//! missing 64-bit atomics on Cortex-M33 and RV32 class cores.

use core::cell::UnsafeCell;
use core::mem::{offset_of, size_of};
use core::ptr;
use core::sync::atomic::{AtomicU32, Ordering};

/// Fixed size reserved for the control block in the shared region.
pub const CONTROL_BLOCK_SIZE: usize = 32 * 1024;

/// Number of ping-pong buffers. The protocol is defined for exactly two.
pub const NUM_BUFFERS: usize = 2;

/// Ownership state of one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum BufferState {
    /// Nobody owns the buffer; the producer may claim it.
    Idle = 0,
    /// Producer owns the buffer body.
    Writing = 1,
    /// Filled and waiting; the consumer may claim it.
    Ready = 2,
    /// Consumer owns the buffer body.
    Reading = 3,
}

impl BufferState {
    fn from_raw(v: u32) -> BufferState {
        match v {
            1 => BufferState::Writing,
            2 => BufferState::Ready,
            3 => BufferState::Reading,
            _ => BufferState::Idle,
        }
    }
}

/// One state word, alone on its cache line.
#[repr(C, align(64))]
struct StateWord {
    state: AtomicU32,
}

/// Shared record coordinating the two buffers.
///
/// Created (zeroed and marked ready) once by the consumer at startup; both
/// sides then hold shared references for the lifetime of the system. All
/// mutation goes through the methods below; no field is exposed.
#[repr(C, align(64))]
pub struct ControlBlock {
    states: [StateWord; NUM_BUFFERS],
    write_count: [AtomicU32; NUM_BUFFERS],
    read_count: [AtomicU32; NUM_BUFFERS],
    overrun_count: AtomicU32,
    timeout_count: AtomicU32,
    last_write_ts: [UnsafeCell<u64>; NUM_BUFFERS],
    last_read_ts: [UnsafeCell<u64>; NUM_BUFFERS],
    producer_ready: AtomicU32,
    consumer_ready: AtomicU32,
    buffer_size: AtomicU32,
    timeout_ms: AtomicU32,
    reserved: [u8; RESERVED_LEN],
}

const HEADER_LEN: usize = 2 * 64 + 4 * 4 + 2 * 4 + 4 * 8 + 4 * 4;
const RESERVED_LEN: usize = CONTROL_BLOCK_SIZE - HEADER_LEN;

const _: () = assert!(size_of::<ControlBlock>() == CONTROL_BLOCK_SIZE);
const _: () = assert!(offset_of!(ControlBlock, states) == 0);
const _: () = assert!(offset_of!(ControlBlock, write_count) == 128);
const _: () = assert!(offset_of!(ControlBlock, read_count) == 136);
const _: () = assert!(offset_of!(ControlBlock, overrun_count) == 144);
const _: () = assert!(offset_of!(ControlBlock, timeout_count) == 148);
const _: () = assert!(offset_of!(ControlBlock, last_write_ts) == 152);
const _: () = assert!(offset_of!(ControlBlock, last_read_ts) == 168);
const _: () = assert!(offset_of!(ControlBlock, producer_ready) == 184);
const _: () = assert!(offset_of!(ControlBlock, consumer_ready) == 188);
const _: () = assert!(offset_of!(ControlBlock, buffer_size) == 192);
const _: () = assert!(offset_of!(ControlBlock, timeout_ms) == 196);

// Timestamps are single-writer (per the ownership protocol) and reads are
// diagnostic; everything else is atomic.
unsafe impl Sync for ControlBlock {}

impl ControlBlock {
    /// Reset every field to its initial value. Idempotent.
    pub(crate) fn reset(&self, buffer_size: u32, timeout_ms: u32) {
        for i in 0..NUM_BUFFERS {
            self.states[i]
                .state
                .store(BufferState::Idle as u32, Ordering::SeqCst);
            self.write_count[i].store(0, Ordering::SeqCst);
            self.read_count[i].store(0, Ordering::SeqCst);
            self.set_last_write_ts(i, 0);
            self.set_last_read_ts(i, 0);
        }
        self.overrun_count.store(0, Ordering::SeqCst);
        self.timeout_count.store(0, Ordering::SeqCst);
        self.producer_ready.store(0, Ordering::SeqCst);
        self.buffer_size.store(buffer_size, Ordering::SeqCst);
        self.timeout_ms.store(timeout_ms, Ordering::SeqCst);
        self.consumer_ready.store(1, Ordering::SeqCst);
    }

    /// Atomic load of one buffer state.
    pub fn state(&self, id: usize) -> BufferState {
        BufferState::from_raw(self.states[id].state.load(Ordering::SeqCst))
    }

    /// CAS one buffer state; the only way a state ever changes.
    pub(crate) fn try_transition(&self, id: usize, from: BufferState, to: BufferState) -> bool {
        self.states[id]
            .state
            .compare_exchange(from as u32, to as u32, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn bump_write(&self, id: usize) -> u32 {
        self.write_count[id].fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn bump_read(&self, id: usize) -> u32 {
        self.read_count[id].fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn bump_overrun(&self) {
        self.overrun_count.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn bump_timeout(&self) {
        self.timeout_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn write_count(&self, id: usize) -> u32 {
        self.write_count[id].load(Ordering::SeqCst)
    }

    pub fn read_count(&self, id: usize) -> u32 {
        self.read_count[id].load(Ordering::SeqCst)
    }

    pub fn overrun_count(&self) -> u32 {
        self.overrun_count.load(Ordering::SeqCst)
    }

    pub fn timeout_count(&self) -> u32 {
        self.timeout_count.load(Ordering::SeqCst)
    }

    pub(crate) fn set_last_write_ts(&self, id: usize, ts: u64) {
        unsafe { ptr::write_volatile(self.last_write_ts[id].get(), ts) }
    }

    pub(crate) fn set_last_read_ts(&self, id: usize, ts: u64) {
        unsafe { ptr::write_volatile(self.last_read_ts[id].get(), ts) }
    }

    pub fn last_write_ts(&self, id: usize) -> u64 {
        unsafe { ptr::read_volatile(self.last_write_ts[id].get()) }
    }

    pub fn last_read_ts(&self, id: usize) -> u64 {
        unsafe { ptr::read_volatile(self.last_read_ts[id].get()) }
    }

    pub(crate) fn set_producer_ready(&self) {
        self.producer_ready.store(1, Ordering::SeqCst);
    }

    pub fn producer_ready(&self) -> bool {
        self.producer_ready.load(Ordering::SeqCst) == 1
    }

    pub fn consumer_ready(&self) -> bool {
        self.consumer_ready.load(Ordering::SeqCst) == 1
    }

    pub fn buffer_size(&self) -> u32 {
        self.buffer_size.load(Ordering::SeqCst)
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> alloc::boxed::Box<ControlBlock> {
        // Zeroed backing memory, as the shared region provides.
        unsafe {
            let layout = core::alloc::Layout::new::<ControlBlock>();
            let ptr = alloc::alloc::alloc_zeroed(layout) as *mut ControlBlock;
            assert!(!ptr.is_null());
            alloc::boxed::Box::from_raw(ptr)
        }
    }

    #[test]
    fn layout_is_stable() {
        assert_eq!(size_of::<ControlBlock>(), CONTROL_BLOCK_SIZE);
        assert_eq!(core::mem::align_of::<ControlBlock>(), 64);
    }

    #[test]
    fn reset_is_idempotent() {
        let cb = fresh();
        cb.reset(65536, 100);
        cb.bump_overrun();
        assert!(cb.try_transition(0, BufferState::Idle, BufferState::Writing));
        cb.reset(65536, 100);
        assert_eq!(cb.state(0), BufferState::Idle);
        assert_eq!(cb.state(1), BufferState::Idle);
        assert_eq!(cb.overrun_count(), 0);
        assert!(cb.consumer_ready());
        assert!(!cb.producer_ready());
        assert_eq!(cb.buffer_size(), 65536);
        assert_eq!(cb.timeout_ms(), 100);
    }

    #[test]
    fn cas_rejects_wrong_expectation() {
        let cb = fresh();
        cb.reset(65536, 100);
        assert!(!cb.try_transition(0, BufferState::Ready, BufferState::Reading));
        assert!(cb.try_transition(0, BufferState::Idle, BufferState::Writing));
        assert!(!cb.try_transition(0, BufferState::Idle, BufferState::Writing));
        assert_eq!(cb.state(0), BufferState::Writing);
    }

    #[test]
    fn timestamps_roundtrip() {
        let cb = fresh();
        cb.reset(65536, 100);
        cb.set_last_write_ts(1, 0xDEAD_BEEF_0123);
        assert_eq!(cb.last_write_ts(1), 0xDEAD_BEEF_0123);
        assert_eq!(cb.last_write_ts(0), 0);
    }
}
