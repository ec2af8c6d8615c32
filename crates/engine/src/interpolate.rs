//! Piecewise-linear lookup over calibration curves.

/// Index of the first breakpoint strictly greater than `value`.
///
/// Returns `breakpoints.len()` when no breakpoint exceeds `value`.
/// `breakpoints` must be sorted ascending.
pub fn upper_bound(value: f64, breakpoints: &[f64]) -> usize {
    let mut lo = 0;
    let mut hi = breakpoints.len();

    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if breakpoints[mid] <= value {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    lo
}

/// Linearly interpolates the ratio at `query` over a breakpoint table.
///
/// Queries outside the table are clamped to its first or last breakpoint, so
/// the result never extrapolates. A single-entry table always yields its one
/// ratio and an empty table yields zero.
pub fn interpolate(query: f64, breakpoints: &[f64], ratios: &[f64]) -> f64 {
    let len = breakpoints.len().min(ratios.len());
    match len {
        0 => return 0.0,
        1 => return ratios[0],
        _ => {}
    }

    let breakpoints = &breakpoints[..len];
    let query = query.clamp(breakpoints[0], breakpoints[len - 1]);

    let i = upper_bound(query, breakpoints).clamp(1, len - 1);
    let (x0, x1) = (breakpoints[i - 1], breakpoints[i]);
    let (y0, y1) = (ratios[i - 1], ratios[i]);

    if query >= x1 {
        return y1;
    }
    if x1 == x0 {
        return y0;
    }

    y0 + (y1 - y0) / (x1 - x0) * (query - x0)
}

/// A breakpoint table paired with its ratios.
#[derive(Debug, Clone, Copy)]
pub struct Curve<'a> {
    breakpoints: &'a [f64],
    ratios: &'a [f64],
}

impl<'a> Curve<'a> {
    pub fn new(breakpoints: &'a [f64], ratios: &'a [f64]) -> Self {
        Self {
            breakpoints,
            ratios,
        }
    }

    pub fn ratio_at(&self, query: f64) -> f64 {
        interpolate(query, self.breakpoints, self.ratios)
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn lengths_match(&self) -> bool {
        self.breakpoints.len() == self.ratios.len()
    }

    /// Breakpoints strictly increase.
    pub fn is_ascending(&self) -> bool {
        self.breakpoints.windows(2).all(|w| w[0] < w[1])
    }

    pub fn breakpoints(&self) -> &'a [f64] {
        self.breakpoints
    }

    pub fn ratios(&self) -> &'a [f64] {
        self.ratios
    }
}
