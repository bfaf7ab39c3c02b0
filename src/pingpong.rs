//! Ping-pong buffer manager.
//!
//! Two fixed buffers in shared SRAM cycle through four states:
//!
//! ```text
//! IDLE -> WRITING  producer, acquire_for_write
//! WRITING -> READY producer, commit
//! READY -> READING consumer, acquire_for_read
//! READING -> IDLE  consumer, release
//! ```
//!
//! Every transition is a sequentially consistent compare-and-swap on the
//! buffer's state word; anything else is rejected with
//! [`IpcError::WrongState`]. A buffer in WRITING belongs to the producer
//! and one in READING to the consumer — nobody else may touch its body.
//!
//! Timeouts are the normal back-pressure signal. Overruns (producer finds
//! both buffers busy) are counted at most once per acquire call and are
//! visible in [`Statistics`], never returned as an error.

use core::sync::atomic::{fence, Ordering};

use crate::control::{BufferState, ControlBlock, NUM_BUFFERS};
use crate::notify::{Mailbox, Notifier};
use crate::region::SharedRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcError {
    /// Acquire could not complete inside the requested window. Expected
    /// under overload.
    Timeout,
    /// State-machine violation (double commit, release without acquire).
    /// A programming bug on the calling side.
    WrongState,
    /// Clearly invalid argument, e.g. a buffer id that is not 0 or 1.
    Invalid,
    /// The peer side has not initialized the control block yet.
    NotReady,
}

impl core::fmt::Display for IpcError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            IpcError::Timeout => f.write_str("acquire timed out"),
            IpcError::WrongState => f.write_str("buffer state violation"),
            IpcError::Invalid => f.write_str("invalid argument"),
            IpcError::NotReady => f.write_str("control block not initialized"),
        }
    }
}

/// Free-running monotonic millisecond clock, independent per side.
pub trait Clock {
    fn now_ms(&self) -> u64;

    /// Brief pause between polling attempts (on the order of 100 us).
    /// Must not monopolize a shared CPU; the default is a spin hint.
    fn pause(&self) {
        core::hint::spin_loop();
    }
}

/// `std` clock: milliseconds since construction, 100 us sleeps.
#[cfg(feature = "std")]
pub struct StdClock {
    epoch: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn pause(&self) {
        std::thread::sleep(std::time::Duration::from_micros(100));
    }
}

/// Exclusive access to a buffer body between acquire and commit.
///
/// Only the manager creates handles; consuming one in
/// [`BufferManager::commit`] is the only way to publish it.
#[derive(Debug)]
pub struct WriteHandle {
    id: u8,
    data: *mut u8,
    len: usize,
}

impl WriteHandle {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The buffer body. Zero-copy: this is the shared SRAM itself.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // Exclusive by the WRITING state owned through this handle.
        unsafe { core::slice::from_raw_parts_mut(self.data, self.len) }
    }
}

/// Exclusive read access to a buffer body between acquire and release.
#[derive(Debug)]
pub struct ReadHandle {
    id: u8,
    data: *const u8,
    len: usize,
}

impl ReadHandle {
    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        // Exclusive by the READING state owned through this handle.
        unsafe { core::slice::from_raw_parts(self.data, self.len) }
    }
}

/// Snapshot of the control block counters plus derived values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Statistics {
    pub writes: [u32; NUM_BUFFERS],
    pub reads: [u32; NUM_BUFFERS],
    pub overruns: u32,
    pub timeouts: u32,
    pub last_write_ts: [u64; NUM_BUFFERS],
    pub last_read_ts: [u64; NUM_BUFFERS],
}

impl Statistics {
    pub fn total_writes(&self) -> u32 {
        self.writes[0] + self.writes[1]
    }

    pub fn total_reads(&self) -> u32 {
        self.reads[0] + self.reads[1]
    }

    /// Committed but not yet released buffers (0..=2).
    ///
    /// Saturating: the snapshot loads are not taken atomically, so a
    /// release landing between them can briefly make reads exceed the
    /// older writes value.
    pub fn in_flight(&self) -> u32 {
        self.total_writes().saturating_sub(self.total_reads())
    }

    /// Mean spacing of commits, assuming the producer clock started near
    /// zero when the run began.
    pub fn avg_write_interval_ms(&self) -> u64 {
        let latest = self.last_write_ts[0].max(self.last_write_ts[1]);
        let writes = self.total_writes() as u64;
        if writes == 0 {
            0
        } else {
            latest / writes
        }
    }
}

/// One side's manager over the shared region.
///
/// Both cores construct their own manager over the same region; the
/// consumer additionally calls [`initialize`](Self::initialize) first.
/// `last_used` is producer-local round-robin state and deliberately not
/// shared.
pub struct BufferManager<C: Clock, M: Mailbox> {
    region: SharedRegion,
    clock: C,
    notifier: Notifier<M>,
    last_used: u8,
}

impl<C: Clock, M: Mailbox> BufferManager<C, M> {
    pub fn new(region: SharedRegion, clock: C, notifier: Notifier<M>) -> Self {
        Self {
            region,
            clock,
            notifier,
            last_used: 1,
        }
    }

    fn control(&self) -> &ControlBlock {
        self.region.control()
    }

    /// Consumer-side startup: reset the control block, mark both buffers
    /// IDLE, raise `consumer_ready`, fence. Idempotent: calling again
    /// yields the same observable control block.
    pub fn initialize(&mut self, timeout_ms: u32) -> Result<(), IpcError> {
        let cb = self.control();
        cb.reset(self.region.buffer_size() as u32, timeout_ms);
        self.last_used = 1;
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Producer-side startup: requires the consumer to have initialized,
    /// then raises `producer_ready`.
    pub fn attach(&self) -> Result<(), IpcError> {
        let cb = self.control();
        if !cb.consumer_ready() {
            return Err(IpcError::NotReady);
        }
        cb.set_producer_ready();
        fence(Ordering::SeqCst);
        Ok(())
    }

    /// Claim an IDLE buffer for writing, round-robin from the last used
    /// id. Blocks by polling with back-off for at most `timeout_ms`
    /// (0 = one scan, non-blocking).
    pub fn acquire_for_write(&mut self, timeout_ms: u32) -> Result<WriteHandle, IpcError> {
        let cb = self.control();
        let deadline = self.clock.now_ms() + timeout_ms as u64;
        let mut counted_overrun = false;

        loop {
            for attempt in 0..NUM_BUFFERS as u8 {
                let id = (self.last_used + 1 + attempt) % NUM_BUFFERS as u8;
                if cb.try_transition(id as usize, BufferState::Idle, BufferState::Writing) {
                    self.last_used = id;
                    return Ok(WriteHandle {
                        id,
                        data: self.region.buffer_ptr(id as usize),
                        len: self.region.buffer_size(),
                    });
                }
            }

            // Overrun: both buffers busy at the same time. Count it at
            // most once per call, however long we retry.
            if !counted_overrun
                && cb.state(0) != BufferState::Idle
                && cb.state(1) != BufferState::Idle
            {
                cb.bump_overrun();
                counted_overrun = true;
                log::debug!("producer overrun: both buffers busy");
            }

            if self.clock.now_ms() >= deadline {
                cb.bump_timeout();
                return Err(IpcError::Timeout);
            }
            self.clock.pause();
        }
    }

    /// Publish a written buffer: WRITING -> READY, bump the write counter,
    /// stamp the commit timestamp, fence, ring the consumer. A failed
    /// doorbell is logged and dropped — the state is already READY and a
    /// later ring or timed poll will drain it.
    pub fn commit(&mut self, handle: WriteHandle) -> Result<(), IpcError> {
        let cb = self.control();
        let id = handle.id as usize;
        if !cb.try_transition(id, BufferState::Writing, BufferState::Ready) {
            return Err(IpcError::WrongState);
        }
        cb.bump_write(id);
        cb.set_last_write_ts(id, self.clock.now_ms());
        fence(Ordering::SeqCst);
        if let Err(e) = self.notifier.notify() {
            log::warn!("consumer doorbell failed after commit: {}", e);
        }
        Ok(())
    }

    /// Claim the oldest READY buffer for reading (FIFO on commit
    /// timestamps, ties broken by ascending id). Polls with back-off for
    /// at most `timeout_ms` (0 = one scan, non-blocking).
    pub fn acquire_for_read(&mut self, timeout_ms: u32) -> Result<ReadHandle, IpcError> {
        let cb = self.control();
        let deadline = self.clock.now_ms() + timeout_ms as u64;

        loop {
            let mut best: Option<(u64, usize)> = None;
            for id in 0..NUM_BUFFERS {
                if cb.state(id) == BufferState::Ready {
                    let ts = cb.last_write_ts(id);
                    match best {
                        Some((best_ts, _)) if best_ts <= ts => {}
                        _ => best = Some((ts, id)),
                    }
                }
            }

            if let Some((_, id)) = best {
                if cb.try_transition(id, BufferState::Ready, BufferState::Reading) {
                    return Ok(ReadHandle {
                        id: id as u8,
                        data: self.region.buffer_ptr(id),
                        len: self.region.buffer_size(),
                    });
                }
                // Lost the race; rescan immediately.
                continue;
            }

            if self.clock.now_ms() >= deadline {
                cb.bump_timeout();
                return Err(IpcError::Timeout);
            }
            self.clock.pause();
        }
    }

    /// Return a drained buffer: READING -> IDLE, bump the read counter,
    /// stamp the release timestamp, fence, ring the producer.
    pub fn release(&mut self, handle: ReadHandle) -> Result<(), IpcError> {
        let cb = self.control();
        let id = handle.id as usize;
        if !cb.try_transition(id, BufferState::Reading, BufferState::Idle) {
            return Err(IpcError::WrongState);
        }
        cb.bump_read(id);
        cb.set_last_read_ts(id, self.clock.now_ms());
        fence(Ordering::SeqCst);
        if let Err(e) = self.notifier.notify() {
            log::warn!("producer doorbell failed after release: {}", e);
        }
        Ok(())
    }

    /// Atomic load of one buffer's state, for tests and diagnostics.
    pub fn state(&self, id: u8) -> Result<BufferState, IpcError> {
        if id as usize >= NUM_BUFFERS {
            return Err(IpcError::Invalid);
        }
        Ok(self.control().state(id as usize))
    }

    /// Counter snapshot.
    pub fn stats(&self) -> Statistics {
        let cb = self.control();
        Statistics {
            writes: [cb.write_count(0), cb.write_count(1)],
            reads: [cb.read_count(0), cb.read_count(1)],
            overruns: cb.overrun_count(),
            timeouts: cb.timeout_count(),
            last_write_ts: [cb.last_write_ts(0), cb.last_write_ts(1)],
            last_read_ts: [cb.last_read_ts(0), cb.last_read_ts(1)],
        }
    }
}
