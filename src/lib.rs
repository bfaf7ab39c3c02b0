//! # duofft - dual-core ping-pong IPC with a Q15 real FFT pipeline
//!
//! Building blocks for an asymmetric dual-core sampler: a lightweight
//! producer core fills fixed buffers in shared SRAM (raw samples or their
//! Q15 spectrum) and hands them to the application core through a lock-free
//! two-buffer ring, coordinated by payload-free doorbell interrupts.
//!
//! ## The two halves
//!
//! - **Ping-pong IPC** — a four-state ownership protocol
//!   (IDLE/WRITING/READY/READING) over two buffers and a shared control
//!   block, driven entirely by sequentially consistent compare-and-swap and
//!   full fences. See [`pingpong::BufferManager`].
//! - **Q15 real FFT** — an in-place radix-4 based fixed-point pipeline for
//!   4096 (and optionally 8192) point real transforms, with build-time
//!   generated twiddle and bit-reversal tables and a top-N spectrum-bin
//!   extractor. See [`rfft::rfft_init`] and [`spectrum::TopBinAnalyzer`].
//!
//! Hardware specifics stay outside: the doorbell mailbox, the monotonic
//! clock and the shared window's base address are all injected
//! ([`notify::Mailbox`], [`pingpong::Clock`], [`region::SharedRegion`]).
//!
//! ## Cargo features
//!
//! - `std` (default): host clock, owned test regions.
//! - `fft-8k` (default): the 8192-point real FFT and its tables.
//!
//! ## Scaling
//!
//! Q15 transforms divide by the transform length to avoid overflow: each
//! radix-4 stage scales by 1/4, so the complex FFT attenuates by 1/M and
//! the real FFT by 1/N relative to a textbook DFT.

#![no_std]

#[cfg(feature = "std")]
extern crate std;
extern crate alloc;

pub mod q15;

/// Build-time generated twiddle, coefficient and bit-reversal tables.
pub mod tables;

/// Q15 complex FFT (radix-4 / radix-4-by-2, in place).
pub mod cfft;

/// Q15 real FFT built on the complex FFT.
pub mod rfft;

/// Top-N magnitude-bin extraction.
pub mod spectrum;

/// Shared control block layout and atomics.
pub mod control;

/// Shared-memory region views.
pub mod region;

/// Doorbell mailbox contract and fence-then-ring notifier.
pub mod notify;

/// Ping-pong buffer manager.
pub mod pingpong;

/// Producer loop and consumer worker glue.
pub mod driver;

pub use cfft::{CfftInstance, FftError};
pub use control::{BufferState, ControlBlock};
pub use notify::{DoorbellConfig, Mailbox, Notifier, NotifyError};
pub use pingpong::{BufferManager, Clock, IpcError, ReadHandle, Statistics, WriteHandle};
pub use q15::Q15;
pub use region::SharedRegion;
pub use rfft::{rfft_init, RfftInstance};
pub use spectrum::{find_top_bins, TopBin, TopBinAnalyzer};
