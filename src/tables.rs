//! Constant FFT tables generated by `build.rs`.
//!
//! Twiddle tables hold interleaved (cos, sin) q15 pairs for one period of
//! the table length; smaller transforms share a table through an index
//! stride. Bit-reversal tables are disjoint swap pairs, pre-shifted by 3 so
//! the permutation kernel can shift right by 2 and swap 16-bit lanes.

include!(concat!(env!("OUT_DIR"), "/fft_tables.rs"));
