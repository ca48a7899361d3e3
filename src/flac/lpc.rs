//! Linear-prediction analysis for the LPC subframe: Tukey windowing,
//! autocorrelation, Levinson-Durbin recursion, and coefficient
//! quantization. Pure numeric code, no I/O.

pub const MAX_LPC_ORDER: usize = 32;

/// Tukey window with the given taper fraction, matching the shape the
/// encoder applies to a block before autocorrelation.
pub fn tukey_window(block_size: usize, alpha: f64) -> Vec<f64> {
    let mut window = vec![1.0; block_size];
    if block_size == 0 {
        return window;
    }
    let np = ((alpha / 2.0) * block_size as f64 - 1.0) as i64;
    let np = np.max(0) as usize;
    for i in 0..block_size {
        if i <= np {
            window[i] = (1.0 - (std::f64::consts::PI * i as f64 / np.max(1) as f64).cos()) / 2.0;
        } else if i >= block_size.saturating_sub(np + 1) {
            window[i] = (1.0
                - (std::f64::consts::PI * (block_size - i - 1) as f64 / np.max(1) as f64).cos())
                / 2.0;
        }
    }
    window
}

/// Computes `max_order + 1` autocorrelation lags of the windowed signal.
pub fn autocorrelate(windowed: &[f64], max_order: usize) -> Vec<f64> {
    let mut autoc = vec![0.0; max_order + 1];
    for (lag, slot) in autoc.iter_mut().enumerate() {
        let mut sum = 0.0;
        for j in 0..windowed.len().saturating_sub(lag) {
            sum += windowed[j] * windowed[j + lag];
        }
        *slot = sum;
    }
    autoc
}

/// Levinson-Durbin recursion. Returns, for each order `1..=max_order`,
/// the LP coefficients (index 0 = coefficient of `s[i-1]`) and the
/// prediction error after that order.
pub fn levinson_durbin(autoc: &[f64], max_order: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut lp_coeff: Vec<Vec<f64>> = vec![Vec::new(); max_order];
    let mut error = vec![0.0; max_order];

    if max_order == 0 || autoc[0] == 0.0 {
        return (lp_coeff, error);
    }

    let mut k = autoc[1] / autoc[0];
    lp_coeff[0] = vec![k];
    error[0] = autoc[0] * (1.0 - k * k);

    for i in 1..max_order {
        let mut sum = 0.0;
        for j in 0..i {
            sum += lp_coeff[i - 1][j] * autoc[i - j];
        }
        let q = autoc[i + 1] - sum;
        k = if error[i - 1] != 0.0 { q / error[i - 1] } else { 0.0 };

        let mut next = vec![0.0; i + 1];
        for j in 0..i {
            next[j] = lp_coeff[i - 1][j] - k * lp_coeff[i - 1][i - j - 1];
        }
        next[i] = k;
        lp_coeff[i] = next;
        error[i] = error[i - 1] * (1.0 - k * k);
    }

    (lp_coeff, error)
}

/// Estimates the order minimising the header-bits + residual-bits
/// model (spec's order-estimate formula), without running a full
/// limited-recorder trial encode of every order.
pub fn estimate_best_order(
    bits_per_sample: u32,
    precision: u32,
    sample_count: usize,
    max_order: usize,
    error: &[f64],
) -> usize {
    let error_scale = (2.0f64.ln()).powi(2) / (2.0 * sample_count as f64);
    let mut best_bits = f64::MAX;
    let mut best_order = 1;

    for order in 1..=max_order {
        let header_bits = order as f64 * (bits_per_sample + precision) as f64;
        let e = error[order - 1].max(1e-9);
        let bits_per_residual = (e * error_scale).log2() / 2.0;
        let subframe_bits = header_bits + bits_per_residual * (sample_count - order) as f64;
        if subframe_bits < best_bits {
            best_bits = subframe_bits;
            best_order = order;
        }
    }

    best_order
}

/// Picks the coefficient precision used for a given block size, per
/// the encoder's block-size-indexed precision table.
pub fn precision_for_block_size(block_size: u32) -> u32 {
    match block_size {
        0..=192 => 7,
        193..=384 => 8,
        385..=576 => 9,
        577..=1152 => 10,
        1153..=2304 => 11,
        2305..=4608 => 12,
        _ => 13,
    }
}

/// Quantizes floating-point LP coefficients to `precision`-bit signed
/// integers plus a clamped right-shift amount.
pub fn quantize_coefficients(coeffs: &[f64], precision: u32) -> (Vec<i32>, u32) {
    let max_coeff = (1i32 << (precision - 1)) - 1;
    let min_coeff = -(1i32 << (precision - 1));

    let max_lp_coeff = coeffs.iter().fold(0.0f64, |acc, &c| acc.max(c.abs()));
    let max_lp_coeff = if max_lp_coeff > 0.0 { max_lp_coeff } else { 1.0 };

    let shift = (precision as i32 - 1) - max_lp_coeff.log2().floor() as i32 - 1;
    let shift = shift.clamp(0, 15) as u32;

    let mut error = 0.0;
    let mut qlp = Vec::with_capacity(coeffs.len());
    for &c in coeffs {
        let sum = error + c * (1i64 << shift) as f64;
        let rounded = sum.round();
        let clamped = (rounded as i64).clamp(min_coeff as i64, max_coeff as i64) as i32;
        qlp.push(clamped);
        error = sum - clamped as f64;
    }

    (qlp, shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tukey_window_endpoints_taper_to_zero() {
        let window = tukey_window(16, 0.5);
        assert_eq!(window.len(), 16);
        assert!(window[0].abs() < 1e-9);
        assert!(window[15].abs() < 1e-9);
        assert!((window[8] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn autocorrelate_constant_signal() {
        let samples = vec![1.0; 8];
        let autoc = autocorrelate(&samples, 2);
        assert_eq!(autoc.len(), 3);
        assert!((autoc[0] - 8.0).abs() < 1e-9);
    }

    #[test]
    fn levinson_durbin_order_one_matches_reflection_coefficient() {
        let autoc = vec![10.0, 5.0, 2.0];
        let (coeffs, error) = levinson_durbin(&autoc, 2);
        assert!((coeffs[0][0] - 0.5).abs() < 1e-9);
        assert!(error[0] > 0.0);
        assert!(error[1] <= error[0]);
    }

    #[test]
    fn quantize_coefficients_respects_precision_bounds() {
        let coeffs = vec![1.9, -1.9, 0.5];
        let (qlp, shift) = quantize_coefficients(&coeffs, 7);
        let max = (1i32 << 6) - 1;
        for c in qlp {
            assert!(c <= max && c >= -max - 1);
        }
        assert!((0..=15).contains(&shift));
    }

    #[test]
    fn precision_table_matches_block_size_bands() {
        assert_eq!(precision_for_block_size(192), 7);
        assert_eq!(precision_for_block_size(1152), 10);
        assert_eq!(precision_for_block_size(4608), 12);
        assert_eq!(precision_for_block_size(8192), 13);
    }
}
