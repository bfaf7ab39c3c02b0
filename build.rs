use std::env;
use std::f64::consts::PI;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

fn q15(x: f64) -> i16 {
    let v = (x * 32768.0).round();
    if v >= 32767.0 {
        32767
    } else if v <= -32768.0 {
        -32768
    } else {
        v as i16
    }
}

fn write_i16_table(f: &mut File, name: &str, values: &[i16]) {
    writeln!(f, "pub static {}: [i16; {}] = [", name, values.len()).unwrap();
    for chunk in values.chunks(8) {
        let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
        writeln!(f, "    {},", line.join(", ")).unwrap();
    }
    writeln!(f, "];\n").unwrap();
}

fn write_u16_table(f: &mut File, name: &str, values: &[u16]) {
    writeln!(f, "pub static {}: [u16; {}] = [", name, values.len()).unwrap();
    for chunk in values.chunks(8) {
        let line: Vec<String> = chunk.iter().map(|v| v.to_string()).collect();
        writeln!(f, "    {},", line.join(", ")).unwrap();
    }
    writeln!(f, "];\n").unwrap();
}

/// Interleaved (cos, sin) twiddle pairs for a length-`m` complex FFT.
///
/// The radix-4 butterflies index up to W^(3j) with j < m/4, so 3m/4 pairs
/// (3m/2 q15 values) cover every stage through the shared-table stride.
fn cfft_twiddles(m: usize) -> Vec<i16> {
    let mut t = Vec::with_capacity(3 * m / 2);
    for k in 0..(3 * m / 4) {
        let angle = 2.0 * PI * k as f64 / m as f64;
        t.push(q15(angle.cos()));
        t.push(q15(angle.sin()));
    }
    t
}

/// Real-FFT split coefficients at length-`n` resolution.
///
/// A[k] = (1 - j*e^{-j2pik/n}) / 2, B[k] = (1 + j*e^{-j2pik/n}) / 2,
/// stored as interleaved (re, im) q15 pairs for k in 0..n/2.
fn real_coefs(n: usize) -> (Vec<i16>, Vec<i16>) {
    let mut a = Vec::with_capacity(n);
    let mut b = Vec::with_capacity(n);
    for k in 0..n / 2 {
        let angle = 2.0 * PI * k as f64 / n as f64;
        let (s, c) = (angle.sin(), angle.cos());
        a.push(q15(0.5 * (1.0 - s)));
        a.push(q15(-0.5 * c));
        b.push(q15(0.5 * (1.0 + s)));
        b.push(q15(0.5 * c));
    }
    (a, b)
}

/// Binary bit-reversal swap pairs for a length-`m` complex buffer.
///
/// Each pair (8*i, 8*j) with j = bitrev(i) and i < j; the kernel shifts the
/// entries right by 2 and swaps the two 16-bit lanes at the resulting
/// indices. Listing only i < j makes the table a disjoint swap list, so
/// applying it twice is the identity.
fn bitrev_pairs(m: usize) -> Vec<u16> {
    let bits = m.trailing_zeros();
    let mut t = Vec::new();
    for i in 0..m {
        let j = (i as u32).reverse_bits() >> (32 - bits);
        let j = j as usize;
        if i < j {
            t.push((i * 8) as u16);
            t.push((j * 8) as u16);
        }
    }
    t
}

fn main() {
    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = PathBuf::from(out_dir).join("fft_tables.rs");
    let mut f = File::create(&dest_path).unwrap();

    write_i16_table(&mut f, "TWIDDLE_2048_Q15", &cfft_twiddles(2048));
    write_u16_table(&mut f, "BIT_REV_2048", &bitrev_pairs(2048));

    if env::var("CARGO_FEATURE_FFT_8K").is_ok() {
        write_i16_table(&mut f, "TWIDDLE_4096_Q15", &cfft_twiddles(4096));
        write_u16_table(&mut f, "BIT_REV_4096", &bitrev_pairs(4096));
    }

    let (a, b) = real_coefs(8192);
    write_i16_table(&mut f, "REAL_COEF_A_Q15", &a);
    write_i16_table(&mut f, "REAL_COEF_B_Q15", &b);

    println!("cargo:rerun-if-changed=build.rs");
}
