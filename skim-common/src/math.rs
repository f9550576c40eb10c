//! Numeric utilities shared by the player and analysis tooling.
//!
//! These are small, allocation-light helpers: boolean run extraction (used to
//! turn per-sample detection masks into time ranges), integer interval
//! partitioning (used to slice long analysis windows into bounded work
//! units), and separable 2-D window kernels for spectral smoothing.

/// Returns the half-open index ranges over which `values` is `true`.
///
/// An input of `[true, true, false, false, true, true]` produces
/// `[(0, 2), (4, 6)]`. Runs touching either end of the slice are closed at
/// the slice boundary, so all-true input yields a single full-length range
/// and all-false (or empty) input yields no ranges.
pub fn ranges_of_truth(values: &[bool]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut run_start: Option<usize> = None;

    for (i, &v) in values.iter().enumerate() {
        match (run_start, v) {
            (None, true) => run_start = Some(i),
            (Some(start), false) => {
                ranges.push((start, i));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        ranges.push((start, values.len()));
    }
    ranges
}

/// Splits the interval `[start, stop)` into `num` parts of near-equal size
/// and returns the part sizes.
///
/// Sizes sum exactly to `stop - start` and differ from each other by at
/// most 1.
///
/// # Panics
/// Panics if `num == 0` or `stop < start`.
pub fn int_linspace_steps_by_no(start: usize, stop: usize, num: usize) -> Vec<usize> {
    assert!(num > 0, "interval must be split into at least one part");
    assert!(stop >= start, "interval end precedes its start");

    let span = stop - start;
    let mut sizes = Vec::with_capacity(num);
    let mut prev = 0usize;
    for k in 1..=num {
        let point = span * k / num;
        sizes.push(point - prev);
        prev = point;
    }
    sizes
}

/// Splits the interval `[start, stop)` into the minimal number of
/// near-equal parts such that no part exceeds `part_limit`, and returns the
/// part sizes.
///
/// # Panics
/// Panics if `part_limit == 0` or `stop < start`.
pub fn int_linspace_steps_by_limit(start: usize, stop: usize, part_limit: usize) -> Vec<usize> {
    let sizes = int_linspace_steps_by_no(start, stop, int_number_of_parts(stop - start, part_limit));
    debug_assert!(sizes.iter().all(|&s| s <= part_limit));
    sizes
}

/// Number of parts needed to divide `number` into parts no larger than
/// `part_limit`. Always at least 1.
///
/// # Panics
/// Panics if `part_limit == 0`.
pub fn int_number_of_parts(number: usize, part_limit: usize) -> usize {
    assert!(part_limit > 0, "part limit must be positive");
    number.div_ceil(part_limit).max(1)
}

/// Hann window of length `n`.
///
/// Endpoints are zero for `n >= 2`; `hann_window(1)` is `[1.0]`.
pub fn hann_window(n: usize) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|k| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * k as f64 / (n - 1) as f64).cos()))
        .collect()
}

/// Builds a normalized 2-D separable kernel from a 1-D window function.
///
/// The window is evaluated at `rows + 2` and `cols + 2` points and the
/// zero-valued endpoints are trimmed, so the returned kernel has no dead
/// border. The kernel is normalized to sum to 1 and returned in row-major
/// order.
///
/// # Panics
/// Panics if either dimension is zero or the window sums to zero after
/// trimming.
pub fn kernel_2d_from_window<F>(shape: (usize, usize), window_fn: F) -> Vec<Vec<f64>>
where
    F: Fn(usize) -> Vec<f64>,
{
    let (rows, cols) = shape;
    assert!(rows > 0 && cols > 0, "kernel dimensions must be positive");

    let row_curve = window_fn(rows + 2);
    let col_curve = window_fn(cols + 2);
    assert_eq!(row_curve.len(), rows + 2);
    assert_eq!(col_curve.len(), cols + 2);

    let mut kernel: Vec<Vec<f64>> = (1..=rows)
        .map(|r| (1..=cols).map(|c| row_curve[r] * col_curve[c]).collect())
        .collect();

    let total: f64 = kernel.iter().flatten().sum();
    assert!(total > 0.0, "window function produced an all-zero kernel");
    for row in &mut kernel {
        for v in row {
            *v /= total;
        }
    }
    kernel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(len: usize, ranges: &[(usize, usize)]) -> Vec<bool> {
        let mut out = vec![false; len];
        for &(beg, end) in ranges {
            for v in &mut out[beg..end] {
                *v = true;
            }
        }
        out
    }

    #[test]
    fn test_ranges_of_truth_basic() {
        let input = [true, true, false, false, true, true];
        assert_eq!(ranges_of_truth(&input), vec![(0, 2), (4, 6)]);
    }

    #[test]
    fn test_ranges_of_truth_roundtrip() {
        let cases: Vec<Vec<bool>> = vec![
            vec![],
            vec![true],
            vec![false],
            vec![true; 5],
            vec![false; 5],
            vec![false, true, false, true, false],
            vec![true, false, true, true, false, true],
        ];
        for input in cases {
            let ranges = ranges_of_truth(&input);
            assert_eq!(reconstruct(input.len(), &ranges), input, "input {:?}", input);
        }
    }

    #[test]
    fn test_ranges_of_truth_open_ends() {
        assert_eq!(ranges_of_truth(&[true, false]), vec![(0, 1)]);
        assert_eq!(ranges_of_truth(&[false, true]), vec![(1, 2)]);
        assert_eq!(ranges_of_truth(&[true, true, true]), vec![(0, 3)]);
    }

    #[test]
    fn test_int_linspace_by_no_sums_and_balance() {
        for &(start, stop, num) in &[(0usize, 10usize, 3usize), (5, 5, 2), (2, 103, 7), (0, 1, 1)] {
            let sizes = int_linspace_steps_by_no(start, stop, num);
            assert_eq!(sizes.len(), num);
            assert_eq!(sizes.iter().sum::<usize>(), stop - start);
            let min = *sizes.iter().min().unwrap();
            let max = *sizes.iter().max().unwrap();
            assert!(max - min <= 1, "unbalanced sizes {:?}", sizes);
        }
    }

    #[test]
    fn test_int_linspace_by_limit() {
        for &(number, limit) in &[(100usize, 7usize), (1, 1), (13, 100), (64, 8)] {
            let sizes = int_linspace_steps_by_limit(0, number, limit);
            assert_eq!(sizes.iter().sum::<usize>(), number);
            assert!(sizes.iter().all(|&s| s <= limit), "{:?} over limit {}", sizes, limit);
        }
    }

    #[test]
    fn test_int_number_of_parts() {
        assert_eq!(int_number_of_parts(10, 3), 4);
        assert_eq!(int_number_of_parts(9, 3), 3);
        assert_eq!(int_number_of_parts(0, 3), 1);
    }

    #[test]
    fn test_hann_window_endpoints() {
        let w = hann_window(8);
        assert_eq!(w.len(), 8);
        assert!(w[0].abs() < 1e-12);
        assert!(w[7].abs() < 1e-12);
        assert!(w[3] > 0.5);
    }

    #[test]
    fn test_kernel_normalized_without_zero_border() {
        let kernel = kernel_2d_from_window((3, 5), hann_window);
        assert_eq!(kernel.len(), 3);
        assert!(kernel.iter().all(|row| row.len() == 5));

        let total: f64 = kernel.iter().flatten().sum();
        assert!((total - 1.0).abs() < 1e-12);

        // Trimming removed the window's zero endpoints entirely.
        assert!(kernel.iter().flatten().all(|&v| v > 0.0));
    }

    #[test]
    #[should_panic]
    fn test_kernel_rejects_empty_shape() {
        let _ = kernel_2d_from_window((0, 4), hann_window);
    }
}
