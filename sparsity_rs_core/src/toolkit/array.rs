use std::{
    fmt::{Debug, Display},
    ops::{AddAssign, MulAssign},
};

use num_traits::{Float, FromPrimitive};

/// The element type of a sparse frame.
pub trait AFloat:
    Float
    + FromPrimitive
    + AddAssign
    + MulAssign
    + Default
    + Debug
    + Display
    + Send
    + Sync
    + 'static
{
}
impl AFloat for f32 {}
impl AFloat for f64 {}

/// `num` evenly spaced values over `[start, stop]`, both ends included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num)
                .map(|i| {
                    if i == num - 1 {
                        stop
                    } else {
                        start + step * i as f64
                    }
                })
                .collect()
        }
    }
}

/// One-dimensional piecewise linear interpolation of `(xp, fp)` at `x`.
///
/// `xp` must be increasing. Points outside of `xp` are clamped to the end values of `fp`.
pub fn interp(x: &[f64], xp: &[f64], fp: &[f64]) -> Vec<f64> {
    x.iter()
        .map(|&xi| {
            if xp.is_empty() {
                return f64::NAN;
            }
            if xi <= xp[0] {
                return fp[0];
            }
            let last = xp.len() - 1;
            if xi >= xp[last] {
                return fp[last];
            }
            // first position whose xp is strictly greater than xi
            let hi = xp.partition_point(|&v| v <= xi);
            let lo = hi - 1;
            let (x0, x1) = (xp[lo], xp[hi]);
            let (y0, y1) = (fp[lo], fp[hi]);
            if x1 == x0 {
                y0
            } else {
                y0 + (xi - x0) * (y1 - y0) / (x1 - x0)
            }
        })
        .collect()
}

/// Sizes of `k` nearly equal chunks of `len` items, the first `len % k` chunks being one larger.
pub fn split_sizes(len: usize, k: usize) -> Vec<usize> {
    if k == 0 {
        return Vec::new();
    }
    let base = len / k;
    let extra = len % k;
    (0..k).map(|i| base + usize::from(i < extra)).collect()
}
