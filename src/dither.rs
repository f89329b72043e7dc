//! Contains the serpentine Atkinson ditherer.

use crate::{LookupTable, QuantizeOutput, Raster};
use palette::{cast::AsArrays, Srgb};

/// Atkinson dithering with a serpentine scan.
///
/// Even rows are scanned left to right and odd rows right to left.
/// Each pixel passes an eighth of its quantization error to six neighbors,
/// so only three quarters of the error is kept. Neighbors outside the image are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct Atkinson;

/// The `(row, column)` offsets that receive error when scanning left to right.
/// Scanning right to left negates the column offsets.
const NEIGHBORS: [(usize, isize); 6] = [(0, 1), (0, 2), (1, -1), (1, 0), (1, 1), (2, 0)];

impl Atkinson {
    /// The fraction of the error passed to each neighbor.
    pub const ERROR_FRACTION: f64 = 1.0 / 8.0;

    /// Creates a new [`Atkinson`] ditherer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Quantizes `image` to the palette of `table`.
    ///
    /// Before each lookup, the accumulated color is clipped to `0.0..=255.0`
    /// and rounded to the nearest integer with ties to even.
    /// The error is measured from the clipped, unrounded color.
    #[must_use]
    pub fn quantize(&self, image: &Raster<Srgb<u8>>, table: &LookupTable) -> QuantizeOutput {
        let (width, height) = image.dimensions();
        let palette = table.palette();

        let mut error = ErrorBuf::new(image);
        let mut indices = vec![0; image.pixels().len()];
        let mut colors = vec![Srgb::new(0, 0, 0); image.pixels().len()];

        for (row, col, direction) in serpentine(width as usize, height as usize) {
            let i = row * width as usize + col;

            let point = error.get(i).map(|c| c.clamp(0.0, 255.0));
            let index = table.index(round(point));
            let color = palette.color(index);
            indices[i] = index;
            colors[i] = color;

            let color = [color.red, color.green, color.blue].map(f64::from);
            let diff = [0, 1, 2].map(|c| point[c] - color[c]);
            error.diffuse(row, col, direction, diff);
        }

        #[allow(clippy::unwrap_used)]
        {
            // both have exactly width * height pixels
            QuantizeOutput {
                indices: Raster::new(width, height, indices).unwrap(),
                colors: Raster::new(width, height, colors).unwrap(),
            }
        }
    }
}

/// Rounds each channel to the nearest integer, ties to even.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round(point: [f64; 3]) -> Srgb<u8> {
    // the point is already clipped to the u8 range
    let [r, g, b] = point.map(|c| c.round_ties_even() as u8);
    Srgb::new(r, g, b)
}

/// Returns the pixel coordinates `(row, column, direction)` in serpentine order,
/// where `direction` is `1` for left to right and `-1` for right to left.
fn serpentine(width: usize, height: usize) -> impl Iterator<Item = (usize, usize, isize)> {
    (0..height).flat_map(move |row| {
        let ltr = row % 2 == 0;
        (0..width).map(move |step| {
            if ltr {
                (row, step, 1)
            } else {
                (row, width - 1 - step, -1)
            }
        })
    })
}

/// Accumulates the diffused error on top of the original pixels.
struct ErrorBuf {
    /// The width of a row of pixels.
    width: usize,
    /// The number of rows.
    height: usize,
    /// The original colors plus any error diffused to them so far.
    values: Vec<[f64; 3]>,
}

impl ErrorBuf {
    /// Creates a new `ErrorBuf` holding the colors of `image`.
    fn new(image: &Raster<Srgb<u8>>) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width: width as usize,
            height: height as usize,
            values: image
                .pixels()
                .as_arrays()
                .iter()
                .map(|c| c.map(f64::from))
                .collect(),
        }
    }

    /// Returns the accumulated color of pixel `i`.
    #[inline]
    fn get(&self, i: usize) -> [f64; 3] {
        self.values[i]
    }

    /// Passes an eighth of `error` to each neighbor of `(row, col)` that lies inside the image.
    #[inline]
    fn diffuse(&mut self, row: usize, col: usize, direction: isize, error: [f64; 3]) {
        let error = error.map(|e| e * Atkinson::ERROR_FRACTION);

        for (dr, dc) in NEIGHBORS {
            let r = row + dr;
            let Some(c) = col.checked_add_signed(dc * direction) else {
                continue;
            };

            if r < self.height && c < self.width {
                let value = &mut self.values[r * self.width + c];
                for (v, e) in value.iter_mut().zip(error) {
                    *v += e;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    fn buf(width: usize, height: usize) -> ErrorBuf {
        ErrorBuf {
            width,
            height,
            values: vec![[0.0; 3]; width * height],
        }
    }

    fn total(buf: &ErrorBuf) -> f64 {
        buf.values.iter().map(|v| v[0]).sum()
    }

    #[test]
    fn serpentine_order() {
        let order = serpentine(3, 3).collect::<Vec<_>>();
        assert_eq!(
            order,
            [
                (0, 0, 1),
                (0, 1, 1),
                (0, 2, 1),
                (1, 2, -1),
                (1, 1, -1),
                (1, 0, -1),
                (2, 0, 1),
                (2, 1, 1),
                (2, 2, 1),
            ]
        );

        assert_eq!(serpentine(0, 5).count(), 0);
        assert_eq!(serpentine(5, 0).count(), 0);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn diffuses_three_quarters_of_the_error() {
        for direction in [1, -1] {
            let mut error = buf(5, 3);
            error.diffuse(0, 2, direction, [8.0; 3]);
            assert_eq!(total(&error), 6.0);

            let expected = if direction == 1 {
                [(0, 3), (0, 4), (1, 1), (1, 2), (1, 3), (2, 2)]
            } else {
                [(0, 1), (0, 0), (1, 3), (1, 2), (1, 1), (2, 2)]
            };
            for (r, c) in expected {
                assert_eq!(error.values[r * 5 + c], [1.0; 3]);
            }
        }
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn diffusion_skips_neighbors_outside_the_image() {
        // the last pixel of an even row has no neighbors to its right or below
        let mut error = buf(3, 1);
        error.diffuse(0, 2, 1, [8.0; 3]);
        assert_eq!(total(&error), 0.0);

        // the first pixel of an odd row in a 2 row image
        let mut error = buf(3, 2);
        error.diffuse(1, 0, -1, [8.0; 3]);
        assert_eq!(total(&error), 0.0);

        let mut error = buf(2, 2);
        error.diffuse(0, 0, 1, [8.0; 3]);
        assert_eq!(total(&error), 3.0);
        assert_eq!(error.values, [[0.0; 3], [1.0; 3], [1.0; 3], [1.0; 3]]);
    }

    #[test]
    fn mid_gray_square() {
        let table = black_and_white_table();
        let output = Atkinson::new().quantize(&solid(2, 2, Srgb::new(127, 127, 127)), table);

        // (0, 0) is black, (0, 1) is pushed to white, then the odd row is scanned
        // right to left so (1, 1) turns white first and pulls (1, 0) back to black
        assert_eq!(output.indices.pixels(), [0, 1, 0, 1]);
        assert_eq!(
            output.colors.pixels(),
            [
                Srgb::new(0, 0, 0),
                Srgb::new(255, 255, 255),
                Srgb::new(0, 0, 0),
                Srgb::new(255, 255, 255),
            ]
        );
    }

    #[test]
    fn single_pixel() {
        let table = primaries_table();
        let color = Srgb::new(200, 30, 20);
        let output = Atkinson::new().quantize(&solid(1, 1, color), table);
        assert_eq!(output.indices.pixels(), [2]);
        assert_eq!(output.colors.pixels(), [Srgb::new(255, 0, 0)]);
    }

    #[test]
    fn empty_image() {
        let output = Atkinson::new().quantize(&Raster::default(), primaries_table());
        assert!(output.indices.is_empty());
        assert!(output.colors.is_empty());
    }

    #[test]
    fn exact_match_image_unaffected() {
        let table = primaries_table();
        let palette = table.palette();
        #[allow(clippy::cast_possible_truncation)]
        let image = Raster::from_fn(13, 7, |x, y| ((x * 3 + y * 5) % 5) as u8);
        let colors = Raster::from_fn(13, 7, |x, y| palette.color(image[(x, y)]));

        let output = Atkinson::new().quantize(&colors, table);
        assert_eq!(output.indices, image);
        assert_eq!(output.colors, colors);
    }

    #[test]
    fn colors_match_indices() {
        let table = primaries_table();
        let output = Atkinson::new().quantize(&random_image(31, 17, 4), table);
        assert_eq!(output.indices.dimensions(), (31, 17));
        for (&index, &color) in output.indices.pixels().iter().zip(output.colors.pixels()) {
            assert_eq!(table.palette().color(index), color);
        }
    }

    #[test]
    fn quarter_gray_dithers_to_sparse_white() {
        // a quarter of the error is dropped, so there are somewhat fewer than 1024 white pixels
        let table = black_and_white_table();
        let output = Atkinson::new().quantize(&solid(64, 64, Srgb::new(64, 64, 64)), table);
        let white = output.indices.pixels().iter().filter(|&&i| i == 1).count();
        assert!((600..=900).contains(&white), "{white} white pixels");
    }
}
