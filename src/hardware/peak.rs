//! Peak shapes used to synthesize detector data.
//!
//! Both shapes have unit height at their center, so callers scale them by an
//! amplitude and add noise on top.

use std::f64::consts::LN_2;

/// One-dimensional Gaussian with peak value 1 at `x0`.
///
/// The value falls to 1/2 at `|x - x0| = dx / sqrt(2)` and to 1/4 at `|x - x0| = dx`.
/// Returns 0 for a non-positive width rather than NaN.
pub fn gauss1d(x: f64, x0: f64, dx: f64) -> f64 {
    if dx <= 0.0 {
        return 0.0;
    }
    let u = (x - x0) / dx;
    (-2.0 * LN_2 * u * u).exp()
}

/// Two-dimensional Gaussian sampled on a grid, indexed `[y][x]`.
///
/// The grid coordinates are rotated by `angle_deg` about the origin before the
/// separable product is taken, and the center `(x0, y0)` is rotated with them.
pub fn gauss2d(
    x: &[f64],
    x0: f64,
    dx: f64,
    y: &[f64],
    y0: f64,
    dy: f64,
    angle_deg: f64,
) -> Vec<Vec<f64>> {
    if angle_deg == 0.0 {
        let gx: Vec<f64> = x.iter().map(|&xi| gauss1d(xi, x0, dx)).collect();
        return y
            .iter()
            .map(|&yi| {
                let gy = gauss1d(yi, y0, dy);
                gx.iter().map(|g| g * gy).collect()
            })
            .collect();
    }

    let (s, c) = angle_deg.to_radians().sin_cos();
    let rotate = |u: f64, v: f64| (c * u - s * v, s * u + c * v);
    let (x0r, y0r) = rotate(x0, y0);

    y.iter()
        .map(|&yi| {
            x.iter()
                .map(|&xi| {
                    let (xr, yr) = rotate(xi, yi);
                    gauss1d(xr, x0r, dx) * gauss1d(yr, y0r, dy)
                })
                .collect()
        })
        .collect()
}
