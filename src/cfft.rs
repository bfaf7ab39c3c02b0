//! Q15 complex FFT.
//!
//! In-place decimation-in-frequency transform over interleaved
//! `[re, im, re, im, ...]` q15 data. Power-of-four lengths run a pure
//! radix-4 butterfly; other powers of two run a radix-4-by-2 pass that
//! folds one twiddle stage and hands the two halves to radix-4.
//!
//! Every radix-4 stage scales by exactly 1/4 (inputs shifted right by 2)
//! so a length-M transform attenuates by 1/M relative to an unscaled DFT.
//! Outputs land in binary bit-reversed order; the precomputed swap table
//! restores natural order when requested.

use crate::q15::sat16;
use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftError {
    /// FFT length is not supported by the built tables.
    InvalidSize,
    /// Buffer length does not match the instance.
    MismatchedLengths,
}

impl core::fmt::Display for FftError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FftError::InvalidSize => f.write_str("unsupported FFT size"),
            FftError::MismatchedLengths => f.write_str("buffer length mismatch"),
        }
    }
}

/// Descriptor for a fixed-length Q15 complex FFT.
///
/// Instances are immutable: a length, its twiddle table (interleaved
/// (cos, sin) pairs over one table period) and its bit-reversal swap table.
pub struct CfftInstance {
    len: usize,
    twiddle: &'static [i16],
    bit_rev: &'static [u16],
}

/// 2048-point complex FFT (backs the 4096-point real FFT).
pub static CFFT_2048: CfftInstance = CfftInstance {
    len: 2048,
    twiddle: &tables::TWIDDLE_2048_Q15,
    bit_rev: &tables::BIT_REV_2048,
};

/// 4096-point complex FFT (backs the 8192-point real FFT).
#[cfg(feature = "fft-8k")]
pub static CFFT_4096: CfftInstance = CfftInstance {
    len: 4096,
    twiddle: &tables::TWIDDLE_4096_Q15,
    bit_rev: &tables::BIT_REV_4096,
};

impl CfftInstance {
    /// Complex length M of this instance.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Look up the prebuilt instance for a complex length.
    pub fn for_len(len: usize) -> Result<&'static CfftInstance, FftError> {
        match len {
            2048 => Ok(&CFFT_2048),
            #[cfg(feature = "fft-8k")]
            4096 => Ok(&CFFT_4096),
            _ => Err(FftError::InvalidSize),
        }
    }

    /// Transform `data` (2M q15 values, interleaved) in place.
    ///
    /// `inverse` conjugates the twiddles; scaling is 1/M either way.
    /// With `bit_reverse` unset the output stays in bit-reversed order.
    pub fn process(
        &self,
        data: &mut [i16],
        inverse: bool,
        bit_reverse: bool,
    ) -> Result<(), FftError> {
        if data.len() != 2 * self.len {
            return Err(FftError::MismatchedLengths);
        }
        if self.len.trailing_zeros() % 2 == 0 {
            radix4_butterfly(data, self.len, self.twiddle, 1, inverse);
        } else {
            radix4by2(data, self.len, self.twiddle, inverse);
        }
        if bit_reverse {
            bit_reverse_pairs(data, self.bit_rev);
        }
        Ok(())
    }
}

/// Complex multiply by a table twiddle W = cos - j*sin (conjugated for the
/// inverse transform). Inputs are 32-bit accumulators, output saturates.
#[inline(always)]
fn tw_mul(re: i32, im: i32, c: i32, s: i32, inverse: bool) -> (i16, i16) {
    if inverse {
        (sat16((re * c - im * s) >> 15), sat16((im * c + re * s) >> 15))
    } else {
        (sat16((re * c + im * s) >> 15), sat16((im * c - re * s) >> 15))
    }
}

/// Radix-4 DIF butterfly over `len` complex points.
///
/// `modifier` is the twiddle stride of the first stage: the table spans one
/// period of `modifier * len`, so smaller transforms reuse a larger table.
///
/// The W^2j branch is stored in the quarter-1 slot (and W^j in quarter 2),
/// which makes the output order plain binary bit reversal instead of base-4
/// digit reversal; the same holds composed under `radix4by2`.
fn radix4_butterfly(data: &mut [i16], len: usize, twiddle: &[i16], modifier: usize, inverse: bool) {
    let mut n1 = len;
    let mut ic = modifier;
    while n1 > 4 {
        let n2 = n1 >> 2;
        let mut base = 0;
        while base < len {
            for j in 0..n2 {
                let i0 = 2 * (base + j);
                let i1 = i0 + 2 * n2;
                let i2 = i1 + 2 * n2;
                let i3 = i2 + 2 * n2;

                // Down-scale by 4 up front; sums of four stay in range.
                let ar = (data[i0] as i32) >> 2;
                let ai = (data[i0 + 1] as i32) >> 2;
                let br = (data[i1] as i32) >> 2;
                let bi = (data[i1 + 1] as i32) >> 2;
                let cr = (data[i2] as i32) >> 2;
                let ci = (data[i2 + 1] as i32) >> 2;
                let dr = (data[i3] as i32) >> 2;
                let di = (data[i3 + 1] as i32) >> 2;

                let s0r = ar + cr;
                let s0i = ai + ci;
                let s1r = ar - cr;
                let s1i = ai - ci;
                let s2r = br + dr;
                let s2i = bi + di;
                // -j*(b - d) forward, +j*(b - d) inverse.
                let (s3r, s3i) = if inverse {
                    (di - bi, br - dr)
                } else {
                    (bi - di, dr - br)
                };

                let t1 = 2 * (j * ic);
                let t2 = 2 * (2 * j * ic);
                let t3 = 2 * (3 * j * ic);
                let (c1, s1) = (twiddle[t1] as i32, twiddle[t1 + 1] as i32);
                let (c2, s2) = (twiddle[t2] as i32, twiddle[t2 + 1] as i32);
                let (c3, s3) = (twiddle[t3] as i32, twiddle[t3 + 1] as i32);

                data[i0] = sat16(s0r + s2r);
                data[i0 + 1] = sat16(s0i + s2i);

                let (r, i) = tw_mul(s0r - s2r, s0i - s2i, c2, s2, inverse);
                data[i1] = r;
                data[i1 + 1] = i;

                let (r, i) = tw_mul(s1r + s3r, s1i + s3i, c1, s1, inverse);
                data[i2] = r;
                data[i2 + 1] = i;

                let (r, i) = tw_mul(s1r - s3r, s1i - s3i, c3, s3, inverse);
                data[i3] = r;
                data[i3 + 1] = i;
            }
            base += n1;
        }
        n1 = n2;
        ic <<= 2;
    }

    // Last stage: length-4 butterflies, all twiddles are W^0.
    let mut base = 0;
    while base < len {
        let i0 = 2 * base;
        let (i1, i2, i3) = (i0 + 2, i0 + 4, i0 + 6);

        let ar = (data[i0] as i32) >> 2;
        let ai = (data[i0 + 1] as i32) >> 2;
        let br = (data[i1] as i32) >> 2;
        let bi = (data[i1 + 1] as i32) >> 2;
        let cr = (data[i2] as i32) >> 2;
        let ci = (data[i2 + 1] as i32) >> 2;
        let dr = (data[i3] as i32) >> 2;
        let di = (data[i3 + 1] as i32) >> 2;

        let s0r = ar + cr;
        let s0i = ai + ci;
        let s1r = ar - cr;
        let s1i = ai - ci;
        let s2r = br + dr;
        let s2i = bi + di;
        let (s3r, s3i) = if inverse {
            (di - bi, br - dr)
        } else {
            (bi - di, dr - br)
        };

        data[i0] = sat16(s0r + s2r);
        data[i0 + 1] = sat16(s0i + s2i);
        data[i1] = sat16(s0r - s2r);
        data[i1 + 1] = sat16(s0i - s2i);
        data[i2] = sat16(s1r + s3r);
        data[i2 + 1] = sat16(s1i + s3i);
        data[i3] = sat16(s1r - s3r);
        data[i3 + 1] = sat16(s1i - s3i);

        base += 4;
    }
}

/// Radix-4-by-2 pass for lengths of the form 2 * 4^k.
///
/// One folded twiddle stage splits even and odd output frequencies into the
/// two halves (each scaled by 1/4), radix-4 handles the halves through the
/// shared table at stride 2, and a final doubling restores the overall 1/M.
fn radix4by2(data: &mut [i16], len: usize, twiddle: &[i16], inverse: bool) {
    let n2 = len >> 1;
    for i in 0..n2 {
        let l = i + n2;
        let ar = data[2 * i] as i32;
        let ai = data[2 * i + 1] as i32;
        let br = data[2 * l] as i32;
        let bi = data[2 * l + 1] as i32;

        let xt = (ar >> 1) - (br >> 1);
        let yt = (ai >> 1) - (bi >> 1);
        data[2 * i] = sat16(((ar >> 1) + (br >> 1)) >> 1);
        data[2 * i + 1] = sat16(((ai >> 1) + (bi >> 1)) >> 1);

        let c = twiddle[2 * i] as i32;
        let s = twiddle[2 * i + 1] as i32;
        if inverse {
            data[2 * l] = sat16((xt * c - yt * s) >> 16);
            data[2 * l + 1] = sat16((yt * c + xt * s) >> 16);
        } else {
            data[2 * l] = sat16((xt * c + yt * s) >> 16);
            data[2 * l + 1] = sat16((yt * c - xt * s) >> 16);
        }
    }

    radix4_butterfly(&mut data[..2 * n2], n2, twiddle, 2, inverse);
    radix4_butterfly(&mut data[2 * n2..], n2, twiddle, 2, inverse);

    for v in data.iter_mut() {
        *v = sat16((*v as i32) << 1);
    }
}

/// Apply a precomputed swap-pair permutation.
///
/// Table entries are complex indices shifted left by 3; shifting right by 2
/// yields the 16-bit lane index of each pair's real part. Each entry swaps
/// one (re, im) pair with another, so the table applied twice is a no-op.
pub(crate) fn bit_reverse_pairs(data: &mut [i16], table: &[u16]) {
    let mut i = 0;
    while i < table.len() {
        let a = (table[i] >> 2) as usize;
        let b = (table[i + 1] >> 2) as usize;
        data.swap(a, b);
        data.swap(a + 1, b + 1);
        i += 2;
    }
}
