//! Gamepad axis transforms: shape raw stick values before they reach a
//! drive helper.

/// Maps a raw axis value in `[-1, 1]` to a shaped value in `[-1, 1]`.
pub trait AxisTransform: Send + Sync {
    fn apply(&self, raw: f64) -> f64;
}

/// `sign(x) * sqrt(|x|)`: more sensitive near the centre.
#[derive(Debug, Clone, Copy, Default)]
pub struct SquareRootAxisTransform;

impl AxisTransform for SquareRootAxisTransform {
    fn apply(&self, raw: f64) -> f64 {
        raw.abs().sqrt().copysign(raw)
    }
}

/// A cubic curve fitted through `(0, min_power)`, a flat region around
/// `(0.5, mid_power)` and `(1, 1)`.
///
/// `min_power` is the smallest output that actually moves the robot, so
/// small stick deflections are not wasted in the motor dead zone.
#[derive(Debug, Clone, Copy)]
pub struct CubicAxisTransform {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl CubicAxisTransform {
    pub fn new(min_power: f64, mid_power: f64) -> Self {
        let min_power = min_power.abs();
        let mid_power = mid_power.abs();
        let x = [0.0, 0.45, 0.5, 0.55, 1.0];
        let y = [min_power, mid_power, mid_power, mid_power, 1.0];
        let coeffs = polyfit(&x, &y, 3);
        Self {
            a: coeffs[3],
            b: coeffs[2],
            c: coeffs[1],
            d: coeffs[0],
        }
    }
}

impl AxisTransform for CubicAxisTransform {
    fn apply(&self, raw: f64) -> f64 {
        let x = raw.abs();
        let y = self.a * x.powi(3) + self.b * x.powi(2) + self.c * x + self.d;
        y.copysign(raw)
    }
}

/// Least-squares polynomial fit of the given `order`.  Returns the
/// coefficients lowest power first.  `x` and `y` must have the same,
/// non-zero length.
fn polyfit(x: &[f64], y: &[f64], order: usize) -> Vec<f64> {
    let n = order + 1;
    // Augmented normal-equation matrix [XᵀX | Xᵀy].
    let mut m = vec![vec![0.0; n + 1]; n];
    for (row, m_row) in m.iter_mut().enumerate() {
        for col in 0..n {
            m_row[col] = x.iter().map(|xi| xi.powi((row + col) as i32)).sum();
        }
        m_row[n] = x
            .iter()
            .zip(y)
            .map(|(xi, yi)| xi.powi(row as i32) * yi)
            .sum();
    }

    // Gaussian elimination with partial pivoting.
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        m.swap(col, pivot);
        for row in col + 1..n {
            let factor = m[row][col] / m[col][col];
            for k in col..=n {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut coeffs = vec![0.0; n];
    for i in (0..n).rev() {
        let tail: f64 = (i + 1..n).map(|j| m[i][j] * coeffs[j]).sum();
        coeffs[i] = (m[i][n] - tail) / m[i][i];
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_root_preserves_sign() {
        let t = SquareRootAxisTransform;
        assert!((t.apply(0.25) - 0.5).abs() < 1e-9);
        assert!((t.apply(-0.25) + 0.5).abs() < 1e-9);
        assert_eq!(t.apply(0.0), 0.0);
        assert!((t.apply(1.0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cubic_passes_through_anchor_points() {
        let t = CubicAxisTransform::new(0.2, 0.5);
        assert!((t.apply(0.0) - 0.2).abs() < 1e-3);
        assert!((t.apply(0.5) - 0.5).abs() < 1e-2);
        assert!((t.apply(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn cubic_is_odd_symmetric() {
        let t = CubicAxisTransform::new(0.3, 0.6);
        for x in [0.1, 0.4, 0.75, 1.0] {
            assert!((t.apply(-x) + t.apply(x)).abs() < 1e-12);
        }
    }

    #[test]
    fn cubic_ignores_sign_of_parameters() {
        let a = CubicAxisTransform::new(-0.2, -0.5);
        let b = CubicAxisTransform::new(0.2, 0.5);
        assert!((a.apply(0.3) - b.apply(0.3)).abs() < 1e-12);
    }

    #[test]
    fn polyfit_recovers_exact_line() {
        let coeffs = polyfit(&[0.0, 1.0, 2.0], &[1.0, 3.0, 5.0], 1);
        assert!((coeffs[0] - 1.0).abs() < 1e-9);
        assert!((coeffs[1] - 2.0).abs() < 1e-9);
    }
}
