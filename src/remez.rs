//! Equiripple design of linear-phase FIR filters with the Parks–McClellan (Remez exchange) algorithm.
//!
//! Only odd-length, symmetric filters are supported. Their amplitude response is a cosine
//! polynomial `A(f) = a0 + a1 cos(2πf) + ... + ar cos(2πrf)`, which the exchange algorithm fits to
//! the desired gain of each band such that the largest weighted error is as small as possible.
//!
//! # Examples
//! A half-band low-pass filter for a sampling frequency of `2.0` (so that Nyquist is `1.0`):
//! ```
//! # use blockify::remez::{Band, Remez};
//! # fn main() -> Result<(), blockify::Error> {
//! let taps = Remez::new(25).design(&[Band::new(0.0, 0.5, 1.0), Band::new(0.6, 1.0, 0.0)], 2.0)?;
//! assert_eq!(taps.len(), 25);
//! assert_eq!(taps[0], taps[24]);
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};
use log::{debug, warn};
use ordered_float::OrderedFloat;
use std::f64::consts::TAU;

/// A frequency band with the gain the filter should have inside of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    /// The lower edge of the band.
    pub start: f64,
    /// The upper edge of the band.
    pub end: f64,
    /// The desired gain inside the band.
    pub gain: f64,
    /// The relative importance of the error inside the band.
    pub weight: f64,
}

impl Band {
    /// Creates a new [`Band`] with a weight of `1.0`.
    #[must_use]
    pub const fn new(start: f64, end: f64, gain: f64) -> Self {
        Self {
            start,
            end,
            gain,
            weight: 1.0,
        }
    }

    /// Sets the weight of the band.
    #[must_use]
    pub const fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// A builder struct to specify the parameters of the Remez exchange.
#[derive(Debug, Clone, Copy)]
pub struct Remez {
    /// The number of filter taps.
    taps: usize,
    /// The number of grid points per extremal frequency.
    grid_density: usize,
    /// The maximum number of exchange iterations.
    max_iterations: usize,
}

impl Remez {
    /// The default grid density.
    pub const DEFAULT_GRID_DENSITY: usize = 16;

    /// The default maximum number of exchange iterations.
    pub const DEFAULT_MAX_ITERATIONS: usize = 25;

    /// Creates a new [`Remez`] for a filter with the given number of taps and default options.
    #[must_use]
    pub const fn new(taps: usize) -> Self {
        Self {
            taps,
            grid_density: Self::DEFAULT_GRID_DENSITY,
            max_iterations: Self::DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the density of the frequency grid the error is evaluated on.
    ///
    /// The default is [`Remez::DEFAULT_GRID_DENSITY`].
    #[must_use]
    pub const fn grid_density(mut self, grid_density: usize) -> Self {
        self.grid_density = grid_density;
        self
    }

    /// Sets the maximum number of exchange iterations.
    ///
    /// If the extremal frequencies have not settled by then,
    /// a warning is logged and the last iterate is used.
    ///
    /// The default is [`Remez::DEFAULT_MAX_ITERATIONS`].
    #[must_use]
    pub const fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Designs the filter and returns its taps.
    ///
    /// Band edges are in the same unit as the sampling frequency `fs`
    /// and must lie within `0.0..=fs / 2.0`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if the number of taps is even or below `3`,
    /// if there are no bands, if the band edges are not strictly increasing within
    /// `0.0..=fs / 2.0`, if a weight is not positive, or if the exchange breaks down.
    pub fn design(&self, bands: &[Band], fs: f64) -> Result<Vec<f64>> {
        self.validate(bands, fs)?;

        let r = (self.taps + 1) / 2;
        let grid = Grid::new(bands, fs, self.grid_density * r);
        if grid.len() <= r {
            return Err(invalid("the bands are too narrow for the number of taps"));
        }

        let last = grid.len() - 1;
        let mut extremal = (0..=r).map(|j| j * last / r).collect::<Vec<_>>();
        let mut interpolant = Interpolant::new(&grid, &extremal)?;
        let mut error = vec![0.0; grid.len()];

        let mut converged = false;
        for iteration in 0..self.max_iterations {
            for (e, i) in error.iter_mut().zip(0..grid.len()) {
                *e = grid.weight[i] * (grid.gain[i] - interpolant.eval(grid.x[i]));
            }

            let Some(next) = select_extremal(&error, &grid.band, r + 1) else {
                // an exact fit leaves nothing to alternate
                converged = error.iter().all(|e| e.abs() < 1e-12);
                if !converged {
                    warn!("remez exchange lost alternation at iteration {iteration}");
                }
                break;
            };

            if next == extremal {
                debug!(
                    "remez exchange converged after {iteration} iterations, ripple {:.6}",
                    interpolant.delta.abs()
                );
                converged = true;
                break;
            }

            extremal = next;
            interpolant = Interpolant::new(&grid, &extremal)?;
        }

        if !converged {
            warn!(
                "remez exchange did not converge in {} iterations, using the last iterate",
                self.max_iterations
            );
        }

        Ok(self.impulse_response(&interpolant))
    }

    /// Checks the taps and bands for a well defined design problem.
    fn validate(&self, bands: &[Band], fs: f64) -> Result<()> {
        if self.taps < 3 || self.taps % 2 == 0 {
            return Err(invalid(format!(
                "the number of taps must be odd and at least 3, got {}",
                self.taps
            )));
        }

        if self.grid_density == 0 {
            return Err(invalid("the grid density must be positive"));
        }

        if !(fs.is_finite() && fs > 0.0) {
            return Err(invalid(format!("invalid sampling frequency {fs}")));
        }

        if bands.is_empty() {
            return Err(invalid("at least one band is needed"));
        }

        let nyquist = fs / 2.0;
        let mut previous_end = None;
        for band in bands {
            let Band { start, end, gain, weight } = *band;

            let increasing = start < end && previous_end.map_or(0.0 <= start, |prev| prev < start);
            if !(increasing && end <= nyquist) {
                return Err(invalid(format!(
                    "band edges must strictly increase within 0..={nyquist}, got {start}..{end}"
                )));
            }

            if !gain.is_finite() || !(weight.is_finite() && weight > 0.0) {
                return Err(invalid(format!(
                    "invalid gain {gain} or weight {weight} for band {start}..{end}"
                )));
            }

            previous_end = Some(end);
        }

        Ok(())
    }

    /// Samples the amplitude response at `taps` equally spaced frequencies
    /// and inverts the resulting cosine series into the symmetric impulse response.
    #[allow(clippy::cast_precision_loss)]
    fn impulse_response(&self, interpolant: &Interpolant) -> Vec<f64> {
        let n = self.taps;
        let center = (n - 1) / 2;

        let amplitudes = (0..=center)
            .map(|m| interpolant.eval((TAU * m as f64 / n as f64).cos()))
            .collect::<Vec<_>>();

        let half = (0..=center)
            .map(|t| {
                let sum = amplitudes[1..]
                    .iter()
                    .zip(1..)
                    .map(|(&a, m)| a * (TAU * (m * t) as f64 / n as f64).cos())
                    .sum::<f64>();

                (amplitudes[0] + 2.0 * sum) / n as f64
            })
            .collect::<Vec<_>>();

        // half[t] is the tap t positions away from the center
        (0..n).map(|i| half[i.abs_diff(center)]).collect()
    }
}

/// Returns the amplitude response of a symmetric, odd-length filter at `frequency`,
/// where frequencies are in the same unit as the sampling frequency `fs`.
///
/// An empty filter has an amplitude of `0.0` everywhere.
#[must_use]
pub fn amplitude(taps: &[f64], frequency: f64, fs: f64) -> f64 {
    if taps.is_empty() {
        return 0.0;
    }

    let center = taps.len() / 2;
    let w = TAU * frequency / fs;
    let sides = taps[(center + 1)..]
        .iter()
        .zip(1..)
        .map(|(&h, t)| h * (w * f64::from(t)).cos())
        .sum::<f64>();

    taps[center] + 2.0 * sides
}

/// Shorthand for an [`Error::InvalidConfiguration`].
fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidConfiguration(message.into())
}

/// The dense frequency grid the error is evaluated on, stored as `x = cos(2πf)`.
struct Grid {
    /// The position of each grid point.
    x: Vec<f64>,
    /// The desired gain at each grid point.
    gain: Vec<f64>,
    /// The error weight at each grid point.
    weight: Vec<f64>,
    /// The band each grid point belongs to.
    band: Vec<usize>,
}

impl Grid {
    /// Creates a grid with a spacing of `0.5 / points` cycles per sample.
    /// The last point of each band is moved onto its upper edge.
    fn new(bands: &[Band], fs: f64, points: usize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let step = 0.5 / points as f64;

        let mut frequencies = Vec::new();
        let mut gain = Vec::new();
        let mut weight = Vec::new();
        let mut band = Vec::new();

        for (i, b) in bands.iter().enumerate() {
            let (start, end) = (b.start / fs, b.end / fs);
            let mut f = start;
            loop {
                frequencies.push(f);
                gain.push(b.gain);
                weight.push(b.weight);
                band.push(i);
                f += step;
                if f > end {
                    break;
                }
            }
            if let Some(last) = frequencies.last_mut() {
                *last = end;
            }
        }

        let x = frequencies.into_iter().map(|f| (TAU * f).cos()).collect();
        Self {
            x,
            gain,
            weight,
            band,
        }
    }

    /// Returns the number of grid points.
    fn len(&self) -> usize {
        self.x.len()
    }
}

/// Returns `1 / prod(x[i] - x[j])` over all `j != i` for each `i`.
fn barycentric_weights(x: &[f64]) -> Vec<f64> {
    x.iter()
        .enumerate()
        .map(|(i, &xi)| {
            let product = x
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(_, &xj)| xi - xj)
                .product::<f64>();
            product.recip()
        })
        .collect()
}

/// The polynomial that alternates the weighted error `±delta` over the extremal set.
struct Interpolant {
    /// The signed deviation at the extremal frequencies.
    delta: f64,
    /// Interpolation nodes (all extremal points but the last).
    nodes: Vec<f64>,
    /// The amplitude at each node.
    values: Vec<f64>,
    /// Barycentric weights of the nodes.
    weights: Vec<f64>,
}

impl Interpolant {
    /// Solves for the polynomial through the extremal grid points.
    fn new(grid: &Grid, extremal: &[usize]) -> Result<Self> {
        let x = extremal.iter().map(|&i| grid.x[i]).collect::<Vec<_>>();
        let a = barycentric_weights(&x);

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut sign = 1.0;
        for (&ai, &k) in a.iter().zip(extremal) {
            numerator += ai * grid.gain[k];
            denominator += sign * ai / grid.weight[k];
            sign = -sign;
        }

        let delta = numerator / denominator;
        if !delta.is_finite() {
            return Err(invalid("the design broke down, check the band edges"));
        }

        let r = extremal.len() - 1;
        let mut sign = 1.0;
        let values = extremal[..r]
            .iter()
            .map(|&k| {
                let value = grid.gain[k] - sign * delta / grid.weight[k];
                sign = -sign;
                value
            })
            .collect();

        let nodes = x[..r].to_vec();
        let weights = barycentric_weights(&nodes);
        Ok(Self {
            delta,
            nodes,
            values,
            weights,
        })
    }

    /// Evaluates the amplitude at `x = cos(2πf)`.
    fn eval(&self, x: f64) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for ((&node, &value), &weight) in self.nodes.iter().zip(&self.values).zip(&self.weights) {
            let diff = x - node;
            #[allow(clippy::float_cmp)]
            if diff == 0.0 {
                return value;
            }
            let t = weight / diff;
            numerator += t * value;
            denominator += t;
        }
        numerator / denominator
    }
}

/// Picks `count` grid points where the error has alternating local extrema,
/// preferring the largest magnitudes. Returns `None` if there are too few alternations.
fn select_extremal(error: &[f64], band: &[usize], count: usize) -> Option<Vec<usize>> {
    let n = error.len();
    let magnitude = |k: usize| OrderedFloat(error[k].abs());
    let positive = |k: usize| error[k] > 0.0;

    let mut extremal = Vec::<usize>::new();
    for k in 0..n {
        let e = error[k];
        #[allow(clippy::float_cmp)]
        if e == 0.0 {
            continue;
        }

        // neighbors in other bands are not compared against
        let not_exceeded_by = |j: usize| {
            band[j] != band[k] || (error[j] > 0.0) != (e > 0.0) || e.abs() >= error[j].abs()
        };
        let is_extremum =
            (k == 0 || not_exceeded_by(k - 1)) && (k + 1 == n || not_exceeded_by(k + 1));
        if !is_extremum {
            continue;
        }

        match extremal.last_mut() {
            Some(last) if positive(*last) == positive(k) => {
                if magnitude(k) > magnitude(*last) {
                    *last = k;
                }
            }
            _ => extremal.push(k),
        }
    }

    if extremal.len() < count {
        return None;
    }

    while extremal.len() > count {
        if extremal.len() - count == 1 {
            let last = extremal.len() - 1;
            if magnitude(extremal[0]) < magnitude(extremal[last]) {
                extremal.remove(0);
            } else {
                extremal.pop();
            }
        } else {
            let (smallest, _) = extremal
                .iter()
                .enumerate()
                .min_by_key(|&(_, &k)| magnitude(k))?;
            extremal.remove(smallest);

            // the neighbors of an interior point now have the same sign
            if smallest > 0 && smallest < extremal.len() {
                let (left, right) = (smallest - 1, smallest);
                let drop = if magnitude(extremal[left]) < magnitude(extremal[right]) {
                    left
                } else {
                    right
                };
                extremal.remove(drop);
            }
        }
    }

    Some(extremal)
}
