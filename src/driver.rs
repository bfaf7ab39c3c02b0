//! Producer and consumer drivers.
//!
//! The producer runs a plain acquire / fill / commit cycle. The consumer
//! splits across two contexts: the doorbell ISR only raises a flag, and the
//! worker — running out of interrupt context — drains every READY buffer it
//! can claim without blocking. A missed doorbell is self-healing: the
//! worker finds nothing and returns, and the next commit rings again.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::notify::Mailbox;
use crate::pingpong::{BufferManager, Clock, IpcError};
use crate::q15::sat16;
use crate::rfft::RfftInstance;

/// ISR-to-worker signal.
///
/// Lives in a `static` so the mailbox ISR callback (a plain `fn()`) can
/// reach it: the ISR calls [`raise`](Self::raise), the scheduled worker
/// consumes it with [`take`](Self::take).
pub struct DoorbellFlag(AtomicBool);

impl DoorbellFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// ISR context: mark work pending. Idempotent.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Worker context: consume the pending mark.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::Acquire)
    }
}

impl Default for DoorbellFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer main-loop driver.
pub struct Producer<C: Clock, M: Mailbox> {
    manager: BufferManager<C, M>,
}

impl<C: Clock, M: Mailbox> Producer<C, M> {
    /// Acquire window of the production cycle.
    pub const ACQUIRE_TIMEOUT_MS: u32 = 1000;

    pub fn new(manager: BufferManager<C, M>) -> Self {
        Self { manager }
    }

    /// One cycle: acquire (1 s window), fill, commit.
    ///
    /// `Timeout` is normal back-pressure — report and try again.
    /// `WrongState` from commit is a bug on this side and should halt the
    /// producer in debug builds.
    pub fn produce<F>(&mut self, fill: F) -> Result<(), IpcError>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut handle = self.manager.acquire_for_write(Self::ACQUIRE_TIMEOUT_MS)?;
        fill(handle.as_mut_slice());
        self.manager.commit(handle)
    }

    pub fn manager(&self) -> &BufferManager<C, M> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut BufferManager<C, M> {
        &mut self.manager
    }
}

/// Consumer worker driver.
pub struct ConsumerWorker<C: Clock, M: Mailbox> {
    manager: BufferManager<C, M>,
    pending: &'static DoorbellFlag,
}

impl<C: Clock, M: Mailbox> ConsumerWorker<C, M> {
    pub fn new(manager: BufferManager<C, M>, pending: &'static DoorbellFlag) -> Self {
        Self { manager, pending }
    }

    /// Scheduled entry point: if the doorbell flag is raised, drain every
    /// READY buffer. Returns the number of buffers processed.
    pub fn run<F>(&mut self, process: F) -> Result<u32, IpcError>
    where
        F: FnMut(&[u8]),
    {
        if !self.pending.take() {
            return Ok(0);
        }
        self.drain(process)
    }

    /// Drain regardless of the doorbell flag — the recovery path when a
    /// doorbell was lost and the consumer polls on its own schedule.
    pub fn drain<F>(&mut self, mut process: F) -> Result<u32, IpcError>
    where
        F: FnMut(&[u8]),
    {
        let mut drained = 0;
        loop {
            match self.manager.acquire_for_read(0) {
                Ok(handle) => {
                    process(handle.as_slice());
                    self.manager.release(handle)?;
                    drained += 1;
                }
                Err(IpcError::Timeout) => return Ok(drained),
                Err(e) => return Err(e),
            }
        }
    }

    pub fn manager(&self) -> &BufferManager<C, M> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut BufferManager<C, M> {
        &mut self.manager
    }
}

/// Serialize a transformed frame into a buffer body.
///
/// Runs the forward real FFT over `samples` (clobbering them) and writes
/// the interleaved spectrum as little-endian q15 pairs. Returns the number
/// of bytes written.
pub fn fill_with_spectrum(
    rfft: &RfftInstance,
    samples: &mut [i16],
    spectrum: &mut [i16],
    buf: &mut [u8],
) -> Result<usize, IpcError> {
    if samples.len() != rfft.len()
        || spectrum.len() != 2 * rfft.len()
        || buf.len() < 4 * rfft.len()
    {
        return Err(IpcError::Invalid);
    }
    rfft.process(samples, spectrum)
        .map_err(|_| IpcError::Invalid)?;
    for (chunk, v) in buf.chunks_exact_mut(2).zip(spectrum.iter()) {
        chunk.copy_from_slice(&v.to_le_bytes());
    }
    Ok(2 * spectrum.len())
}

/// Deserialize a spectrum frame written by [`fill_with_spectrum`].
pub fn read_spectrum_frame(buf: &[u8], spectrum: &mut [i16]) -> Result<(), IpcError> {
    if buf.len() < 2 * spectrum.len() {
        return Err(IpcError::Invalid);
    }
    for (v, chunk) in spectrum.iter_mut().zip(buf.chunks_exact(2)) {
        *v = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    Ok(())
}

/// Saturating q15 sum, handy for checksum-style validation of raw frames.
pub fn frame_checksum(buf: &[u8]) -> i16 {
    let mut acc: i32 = 0;
    for chunk in buf.chunks_exact(2) {
        acc = acc.saturating_add(i16::from_le_bytes([chunk[0], chunk[1]]) as i32);
    }
    sat16(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doorbell_flag_is_consumed_once() {
        static FLAG: DoorbellFlag = DoorbellFlag::new();
        assert!(!FLAG.take());
        FLAG.raise();
        FLAG.raise();
        assert!(FLAG.take());
        assert!(!FLAG.take());
    }

    #[test]
    fn spectrum_frame_roundtrip() {
        let rfft = crate::rfft::rfft_init(4096).unwrap();
        let mut samples = alloc::vec![1000i16; 4096];
        let mut spectrum = alloc::vec![0i16; 8192];
        let mut buf = alloc::vec![0u8; 4 * 4096];
        let written = fill_with_spectrum(&rfft, &mut samples, &mut spectrum, &mut buf).unwrap();
        assert_eq!(written, 16384);

        let mut back = alloc::vec![0i16; 8192];
        read_spectrum_frame(&buf, &mut back).unwrap();
        assert_eq!(back, spectrum);
    }

    #[test]
    fn spectrum_frame_validates_lengths() {
        let rfft = crate::rfft::rfft_init(4096).unwrap();
        let mut samples = alloc::vec![0i16; 100];
        let mut spectrum = alloc::vec![0i16; 8192];
        let mut buf = alloc::vec![0u8; 4 * 4096];
        assert_eq!(
            fill_with_spectrum(&rfft, &mut samples, &mut spectrum, &mut buf),
            Err(IpcError::Invalid)
        );
    }
}
