//! Top-N magnitude-bin extraction over the real FFT.
//!
//! Runs the forward real FFT on a copy of the input and keeps the K bins
//! with the largest squared magnitude, DC excluded. Magnitudes are computed
//! in 32-bit unsigned arithmetic; each squared term fits in 31 bits so the
//! sum cannot overflow.

use alloc::vec;
use alloc::vec::Vec;

use crate::cfft::FftError;
use crate::rfft::{rfft_init, RfftInstance};

/// One spectrum peak: bin index and its squared magnitude.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopBin {
    pub bin_index: u16,
    pub magnitude_squared: u32,
}

/// Reusable top-bin extractor for one FFT length.
///
/// Owns the transform instance and its working buffers, so repeated calls
/// do not allocate. The working buffers make the analyzer itself the unit
/// of exclusion; share one per transform size, not per call site.
pub struct TopBinAnalyzer {
    rfft: RfftInstance,
    work: Vec<i16>,
    spectrum: Vec<i16>,
}

impl TopBinAnalyzer {
    /// Build an analyzer for `fft_size` points (4096 or, with `fft-8k`,
    /// 8192).
    pub fn new(fft_size: usize) -> Result<Self, FftError> {
        let rfft = rfft_init(fft_size)?;
        Ok(Self {
            rfft,
            work: vec![0; fft_size],
            spectrum: vec![0; 2 * fft_size],
        })
    }

    /// FFT length of this analyzer.
    pub fn fft_size(&self) -> usize {
        self.rfft.len()
    }

    /// Find the `out.len()` strongest bins of `input`, strongest first.
    ///
    /// `input` must be exactly the FFT length and `out` must hold between
    /// 1 and N/2 records. Bin 0 (DC) is never reported.
    pub fn find_top_bins(&mut self, input: &[i16], out: &mut [TopBin]) -> Result<(), FftError> {
        let n = self.rfft.len();
        if input.len() != n {
            return Err(FftError::MismatchedLengths);
        }
        if out.is_empty() || out.len() > n / 2 {
            return Err(FftError::InvalidSize);
        }

        self.work.copy_from_slice(input);
        self.rfft.process(&mut self.work, &mut self.spectrum)?;

        for slot in out.iter_mut() {
            *slot = TopBin::default();
        }

        // Descending insertion sort over bins 1..=N/2; DC is skipped.
        for bin in 1..=(n / 2) as u16 {
            let re = self.spectrum[2 * bin as usize] as i32;
            let im = self.spectrum[2 * bin as usize + 1] as i32;
            let mag_sq = (re * re) as u32 + (im * im) as u32;

            for i in 0..out.len() {
                if mag_sq > out[i].magnitude_squared {
                    for j in (i + 1..out.len()).rev() {
                        out[j] = out[j - 1];
                    }
                    out[i] = TopBin {
                        bin_index: bin,
                        magnitude_squared: mag_sq,
                    };
                    break;
                }
            }
        }
        Ok(())
    }
}

/// One-shot convenience wrapper: allocates an analyzer, runs it, returns
/// the bin indices in descending magnitude order.
pub fn find_top_bins(input: &[i16], fft_size: usize, out: &mut [u16]) -> Result<(), FftError> {
    let mut analyzer = TopBinAnalyzer::new(fft_size)?;
    let mut bins = vec![TopBin::default(); out.len()];
    analyzer.find_top_bins(input, &mut bins)?;
    for (dst, src) in out.iter_mut().zip(bins.iter()) {
        *dst = src.bin_index;
    }
    Ok(())
}
