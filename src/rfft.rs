//! Q15 real-input FFT built on top of the complex FFT.
//!
//! A length-N real transform packs the input as N/2 complex samples, runs
//! the length-N/2 complex FFT, then recombines the bins with the A/B
//! coefficient tables into the N/2+1 spectrum bins of the real input (plus
//! their conjugate mirror, so `dst` holds a complete length-N complex
//! spectrum). Output is attenuated by 1/N relative to an unscaled DFT:
//! 1/(N/2) from the complex stages and 1/2 from the split products.

use crate::cfft::{CfftInstance, FftError, CFFT_2048};
#[cfg(feature = "fft-8k")]
use crate::cfft::CFFT_4096;
use crate::q15::sat16;
use crate::tables;

/// Resolution of the shared A/B coefficient tables.
pub const RFFT_MAX_LEN: usize = 8192;

/// Descriptor for a fixed-length Q15 real FFT.
///
/// Built once by [`rfft_init`] and immutable afterwards. Carries the real
/// length, the coefficient stride into the shared A/B tables, the transform
/// flags and the backing complex FFT instance of half the length.
pub struct RfftInstance {
    len_real: usize,
    modifier: usize,
    inverse: bool,
    bit_reverse: bool,
    coef_a: &'static [i16],
    coef_b: &'static [i16],
    cfft: &'static CfftInstance,
}

/// Build the forward real-FFT instance for `len` points.
///
/// Supported lengths are 4096 and, with the `fft-8k` feature, 8192.
pub fn rfft_init(len: usize) -> Result<RfftInstance, FftError> {
    let cfft: &'static CfftInstance = match len {
        4096 => &CFFT_2048,
        #[cfg(feature = "fft-8k")]
        8192 => &CFFT_4096,
        _ => return Err(FftError::InvalidSize),
    };
    Ok(RfftInstance {
        len_real: len,
        modifier: RFFT_MAX_LEN / len,
        inverse: false,
        bit_reverse: true,
        coef_a: &tables::REAL_COEF_A_Q15,
        coef_b: &tables::REAL_COEF_B_Q15,
        cfft,
    })
}

impl RfftInstance {
    /// Real length N of this instance.
    pub const fn len(&self) -> usize {
        self.len_real
    }

    /// Forward transform: `src` holds N real q15 samples and is clobbered
    /// (it doubles as the complex FFT workspace); `dst` receives 2N q15
    /// values laid out `[r0, i0, r1, i1, ...]`.
    ///
    /// Bins 0 (DC) and N/2 (Nyquist) have zero imaginary parts by
    /// construction; bins above N/2 are the conjugate mirror.
    pub fn process(&self, src: &mut [i16], dst: &mut [i16]) -> Result<(), FftError> {
        if src.len() != self.len_real || dst.len() != 2 * self.len_real {
            return Err(FftError::MismatchedLengths);
        }
        // N real samples viewed as N/2 interleaved complex samples.
        self.cfft.process(src, self.inverse, self.bit_reverse)?;
        split_real(
            src,
            self.len_real / 2,
            self.coef_a,
            self.coef_b,
            self.modifier,
            dst,
        );
        Ok(())
    }
}

/// Recombine the packed complex spectrum G into the real-input spectrum.
///
/// X[k] = G[k] * A[k] + conj(G[M-k]) * B[k], with A = (1 - j*W)/2 and
/// B = (1 + j*W)/2 baked into the tables; the `>> 16` products contribute
/// the final halving of the 1/N discipline. DC and Nyquist reduce to
/// (G0.re +/- G0.im)/2 and are real by construction.
fn split_real(
    src: &[i16],
    m: usize,
    coef_a: &[i16],
    coef_b: &[i16],
    modifier: usize,
    dst: &mut [i16],
) {
    for k in 1..m {
        let g_r = src[2 * k] as i32;
        let g_i = src[2 * k + 1] as i32;
        let h_r = src[2 * (m - k)] as i32;
        let h_i = src[2 * (m - k) + 1] as i32;

        let c = 2 * k * modifier;
        let a_r = coef_a[c] as i32;
        let a_i = coef_a[c + 1] as i32;
        let b_r = coef_b[c] as i32;
        let b_i = coef_b[c + 1] as i32;

        let out_r = (g_r * a_r - g_i * a_i + h_r * b_r + h_i * b_i) >> 16;
        let out_i = (g_i * a_r + g_r * a_i + h_r * b_i - h_i * b_r) >> 16;

        dst[2 * k] = sat16(out_r);
        dst[2 * k + 1] = sat16(out_i);
        dst[2 * (2 * m - k)] = sat16(out_r);
        dst[2 * (2 * m - k) + 1] = sat16(-out_i);
    }

    let g0_r = src[0] as i32;
    let g0_i = src[1] as i32;
    dst[0] = sat16((g0_r + g0_i) >> 1);
    dst[1] = 0;
    dst[2 * m] = sat16((g0_r - g0_i) >> 1);
    dst[2 * m + 1] = 0;
}
