//! Anti-alias low-pass filtering and decimation of images.

use crate::{
    remez::{Band, Remez},
    Error, Raster, Result,
};
use log::debug;
use palette::{cast::AsArrays, Srgb};

#[cfg(feature = "threads")]
use rayon::prelude::*;

/// The number of taps of the anti-alias filter.
pub const FILTER_TAPS: usize = 25;

/// Designs the anti-alias filter used before decimating by a factor of `decimation`.
///
/// With frequencies relative to Nyquist, the passband is `0..=1/M`
/// and the stopband starts a fifth of the passband width later and runs up to `1`.
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] if `decimation` is below `2`
/// or the filter design fails.
pub fn lowpass_filter(decimation: u32) -> Result<Vec<f64>> {
    if decimation < 2 {
        return Err(Error::InvalidConfiguration(format!(
            "a low-pass filter needs a decimation factor of at least 2, got {decimation}"
        )));
    }

    let passband = 1.0 / f64::from(decimation);
    let stopband = passband + passband / 5.0;
    let bands = [
        Band::new(0.0, passband, 1.0),
        Band::new(stopband, 1.0, 0.0),
    ];
    Remez::new(FILTER_TAPS).design(&bands, 2.0)
}

/// Returns the pairs `(k, j)` such that output `i` of a centered convolution is
/// the sum of `taps[k] * signal[j]`. Signal indices outside `0..len` are skipped.
fn support(len: usize, taps: usize, i: usize) -> impl Iterator<Item = (usize, usize)> {
    let shifted = i + (taps - 1) / 2;
    let first = (shifted + 1).saturating_sub(len);
    let last = shifted.min(taps - 1);
    (first..=last).map(move |k| (k, shifted - k))
}

/// Convolves `signal` with `taps`, keeping the central part of the full convolution
/// that has the same length as `signal`. Samples outside of `signal` are treated as zero.
///
/// # Examples
/// ```
/// # use blockify::convolve_same;
/// assert_eq!(convolve_same(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]), [4.0, 10.0, 16.0, 17.0]);
/// ```
#[must_use]
pub fn convolve_same(signal: &[f64], taps: &[f64]) -> Vec<f64> {
    if taps.is_empty() {
        return vec![0.0; signal.len()];
    }

    (0..signal.len())
        .map(|i| {
            support(signal.len(), taps.len(), i)
                .map(|(k, j)| taps[k] * signal[j])
                .sum()
        })
        .collect()
}

/// Filters all channels of `line` at index `i`.
#[inline]
fn filter_pixel(line: &[[f64; 3]], taps: &[f64], i: usize) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for (k, j) in support(line.len(), taps.len(), i) {
        for (s, &x) in sum.iter_mut().zip(&line[j]) {
            *s += taps[k] * x;
        }
    }
    sum
}

/// Filters `line` at every `step`-th index, starting from `0`, and writes the results to `out`.
#[inline]
fn filter_line(line: &[[f64; 3]], taps: &[f64], step: usize, out: &mut [[f64; 3]]) {
    for (n, out) in out.iter_mut().enumerate() {
        *out = filter_pixel(line, taps, n * step);
    }
}

/// Returns a copy of the row-major `data` in column-major order.
fn transpose<T: Copy>(data: &[T], width: usize, height: usize) -> Vec<T> {
    (0..width)
        .flat_map(|x| (0..height).map(move |y| data[y * width + x]))
        .collect()
}

/// Truncates toward zero and clips to `0..=255`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_srgb(color: [f64; 3]) -> Srgb<u8> {
    let [r, g, b] = color.map(|c| c.trunc().clamp(0.0, 255.0) as u8);
    Srgb::new(r, g, b)
}

/// The state shared by the sequential and parallel decimation.
struct Decimation {
    /// The taps of the anti-alias filter.
    taps: Vec<f64>,
    /// The decimation factor.
    step: usize,
    /// The width of the input image.
    width: usize,
    /// The height of the input image.
    height: usize,
    /// The width of the decimated image.
    out_width: u32,
    /// The height of the decimated image.
    out_height: u32,
}

impl Decimation {
    /// Validates the decimation factor and designs the filter.
    /// Returns `None` when the image should be returned as is.
    fn new(image: &Raster<Srgb<u8>>, decimation: u32) -> Result<Option<Self>> {
        match decimation {
            0 => Err(Error::InvalidConfiguration(
                "the decimation factor must be at least 1".to_owned(),
            )),
            1 => Ok(None),
            _ => {
                let taps = lowpass_filter(decimation)?;
                debug!(
                    "designed a {}-tap anti-alias filter for decimation by {decimation}",
                    taps.len()
                );

                let (width, height) = image.dimensions();
                Ok(Some(Self {
                    taps,
                    step: decimation as usize,
                    width: width as usize,
                    height: height as usize,
                    out_width: width / decimation,
                    out_height: height / decimation,
                }))
            }
        }
    }

    /// Returns whether the decimated image has no pixels.
    fn is_empty(&self) -> bool {
        self.out_width == 0 || self.out_height == 0
    }

    /// Collects the column-major filter output into a raster.
    fn finish(&self, columns: &[[f64; 3]]) -> Raster<Srgb<u8>> {
        let out_height = self.out_height as usize;
        Raster::from_fn(self.out_width, self.out_height, |x, y| {
            to_srgb(columns[x as usize * out_height + y as usize])
        })
    }
}

/// Converts the pixels to floating point arrays.
fn to_float(image: &Raster<Srgb<u8>>) -> Vec<[f64; 3]> {
    image
        .pixels()
        .as_arrays()
        .iter()
        .map(|c| c.map(f64::from))
        .collect()
}

/// Low-pass filters `image` along its rows and then its columns,
/// and keeps every `decimation`-th row and column starting from the first.
///
/// The result has `floor(width / M)` columns and `floor(height / M)` rows,
/// so it is empty if the image is smaller than the decimation factor.
/// A decimation factor of `1` returns a copy of `image`.
///
/// Only the samples that survive decimation are computed.
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] if `decimation` is `0`.
pub fn filter_and_decimate(
    image: &Raster<Srgb<u8>>,
    decimation: u32,
) -> Result<Raster<Srgb<u8>>> {
    let Some(d) = Decimation::new(image, decimation)? else {
        return Ok(image.clone());
    };

    if d.is_empty() {
        return Ok(d.finish(&[]));
    }

    let out_width = d.out_width as usize;
    let out_height = d.out_height as usize;

    let pixels = to_float(image);
    let mut rows = vec![[0.0; 3]; d.height * out_width];
    for (line, out) in pixels
        .chunks_exact(d.width)
        .zip(rows.chunks_exact_mut(out_width))
    {
        filter_line(line, &d.taps, d.step, out);
    }

    let columns = transpose(&rows, out_width, d.height);
    let mut kept = vec![[0.0; 3]; out_width * out_height];
    for (line, out) in columns
        .chunks_exact(d.height)
        .zip(kept.chunks_exact_mut(out_height))
    {
        filter_line(line, &d.taps, d.step, out);
    }

    Ok(d.finish(&kept))
}

/// Low-pass filters and decimates `image` in parallel.
///
/// The output is identical to [`filter_and_decimate`].
///
/// # Errors
/// Returns [`Error::InvalidConfiguration`] if `decimation` is `0`.
#[cfg(feature = "threads")]
pub fn filter_and_decimate_par(
    image: &Raster<Srgb<u8>>,
    decimation: u32,
) -> Result<Raster<Srgb<u8>>> {
    let Some(d) = Decimation::new(image, decimation)? else {
        return Ok(image.clone());
    };

    if d.is_empty() {
        return Ok(d.finish(&[]));
    }

    let out_width = d.out_width as usize;
    let out_height = d.out_height as usize;

    let pixels = to_float(image);
    let mut rows = vec![[0.0; 3]; d.height * out_width];
    pixels
        .par_chunks_exact(d.width)
        .zip(rows.par_chunks_exact_mut(out_width))
        .for_each(|(line, out)| filter_line(line, &d.taps, d.step, out));

    let columns = transpose(&rows, out_width, d.height);
    let mut kept = vec![[0.0; 3]; out_width * out_height];
    columns
        .par_chunks_exact(d.height)
        .zip(kept.par_chunks_exact_mut(out_height))
        .for_each(|(line, out)| filter_line(line, &d.taps, d.step, out));

    Ok(d.finish(&kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn convolve_same_is_centered() {
        assert_eq!(
            convolve_same(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0]),
            [4.0, 10.0, 16.0, 17.0]
        );

        // even length filters are centered to the left
        assert_eq!(
            convolve_same(&[1.0, 2.0, 3.0], &[1.0, 1.0]),
            [1.0, 3.0, 5.0]
        );

        // a filter longer than the signal
        assert_eq!(convolve_same(&[1.0, 1.0], &[1.0; 5]), [2.0, 2.0]);

        assert_eq!(convolve_same(&[], &[1.0]), Vec::<f64>::new());
        assert_eq!(convolve_same(&[1.0, 2.0], &[]), [0.0, 0.0]);
    }

    #[test]
    fn filter_line_keeps_every_step() {
        let line = (0..7).map(|i| [f64::from(i); 3]).collect::<Vec<_>>();
        let mut out = [[0.0; 3]; 4];
        filter_line(&line, &[0.0, 1.0, 0.0], 2, &mut out);
        assert_eq!(out, [[0.0; 3], [2.0; 3], [4.0; 3], [6.0; 3]]);
    }

    #[test]
    fn lowpass_filter_is_symmetric() {
        assert!(matches!(
            lowpass_filter(1),
            Err(Error::InvalidConfiguration(_))
        ));

        for decimation in [2, 3, 4, 8] {
            let taps = lowpass_filter(decimation).unwrap();
            assert_eq!(taps.len(), FILTER_TAPS);
            for i in 0..FILTER_TAPS {
                assert!((taps[i] - taps[FILTER_TAPS - 1 - i]).abs() < 1e-12);
            }
            let dc = taps.iter().sum::<f64>();
            assert!(
                (dc - 1.0).abs() < 0.3,
                "DC gain {dc} for decimation by {decimation}"
            );
        }
    }

    #[test]
    fn decimation_by_one_is_identity() {
        let image = random_image(17, 9, 0);
        assert_eq!(filter_and_decimate(&image, 1).unwrap(), image);
    }

    #[test]
    fn decimation_by_zero_fails() {
        let image = random_image(4, 4, 0);
        assert!(matches!(
            filter_and_decimate(&image, 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn output_dimensions_are_floored() {
        let image = random_image(50, 33, 1);
        let by_four = filter_and_decimate(&image, 4).unwrap();
        assert_eq!(by_four.dimensions(), (12, 8));
        let by_three = filter_and_decimate(&image, 3).unwrap();
        assert_eq!(by_three.dimensions(), (16, 11));

        let small = random_image(3, 3, 2);
        let decimated = filter_and_decimate(&small, 4).unwrap();
        assert_eq!(decimated.dimensions(), (0, 0));
        assert!(decimated.is_empty());
    }

    #[test]
    fn solid_interior_stays_solid() {
        let color = Srgb::new(200, 100, 30);
        let decimated = filter_and_decimate(&solid(64, 64, color), 2).unwrap();

        // away from the zero padded borders
        for y in 8..24 {
            for x in 8..24 {
                let c = decimated[(x, y)];
                let pairs = [
                    (c.red, color.red),
                    (c.green, color.green),
                    (c.blue, color.blue),
                ];
                for (actual, expected) in pairs {
                    assert!(actual.abs_diff(expected) <= 25, "{c:?} at ({x}, {y})");
                }
            }
        }
    }

    #[test]
    fn stripes_are_not_aliased() {
        // alternating black and white columns would decimate to solid black without filtering
        let stripes = Raster::from_fn(64, 64, |x, _| {
            if x % 2 == 0 {
                Srgb::new(0, 0, 0)
            } else {
                Srgb::new(255, 255, 255)
            }
        });

        let decimated = filter_and_decimate(&stripes, 2).unwrap();
        for y in 8..24 {
            for x in 8..24 {
                let c = decimated[(x, y)];
                assert!(c.red.abs_diff(127) <= 35, "{c:?} at ({x}, {y})");
            }
        }
    }

    #[test]
    #[cfg(feature = "threads")]
    fn parallel_matches_sequential() {
        let image = random_image(97, 61, 3);
        for decimation in [0, 1, 2, 5] {
            let expected = filter_and_decimate(&image, decimation).ok();
            let actual = filter_and_decimate_par(&image, decimation).ok();
            assert_eq!(expected, actual);
        }
    }
}
