//! Contains various types needed across the crate.

use palette::Srgb;
use std::ops::Index;
use thiserror::Error;

#[cfg(feature = "image")]
use {
    image::RgbImage,
    palette::cast::{ComponentsAs, IntoComponents},
};

/// The error type for everything that can go wrong while building a lookup table
/// or turning an image into a mosaic.
#[derive(Debug, Error)]
pub enum Error {
    /// A parameter or input is outside of its supported range,
    /// e.g., a shard count that does not divide `256` or a decimation factor of `0`.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// No texture could be found for a palette entry.
    #[error("no texture found for palette entry `{name}`")]
    MissingTexture {
        /// The name of the palette entry.
        name: String,
    },
    /// A texture was found, but it is not a [`TILE_SIZE`](crate::TILE_SIZE) square.
    #[error("texture `{name}` is {width}x{height}, expected a square tile of 16x16")]
    InvalidTexture {
        /// The name of the palette entry.
        name: String,
        /// The width of the texture that was found.
        width: u32,
        /// The height of the texture that was found.
        height: u32,
    },
    /// A worker computing one shard of a lookup table terminated abnormally.
    #[error("worker for shard {shard} failed: {message}")]
    WorkerFailure {
        /// The index of the shard that failed.
        shard: u32,
        /// The panic message of the worker, if any.
        message: String,
    },
    /// A persisted lookup table could not be decoded.
    #[error("invalid lookup table: {0}")]
    InvalidTable(String),
    /// An I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An error from decoding or encoding an image.
    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// A specialized [`Result`](std::result::Result) type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A two dimensional grid of pixels stored in row-major order.
///
/// # Examples
/// ```
/// # use blockify::Raster;
/// # use palette::Srgb;
/// let raster = Raster::from_fn(4, 2, |x, y| Srgb::new(x as u8, y as u8, 0));
/// assert_eq!(raster[(3, 1)], Srgb::new(3, 1, 0));
/// assert!(Raster::new(4, 2, vec![0u8; 7]).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Raster<T> {
    /// The number of pixels in each row.
    width: u32,
    /// The number of rows.
    height: u32,
    /// The pixels, `width * height` of them.
    pixels: Vec<T>,
}

impl<T> Raster<T> {
    /// Creates a new [`Raster`] from a row-major `Vec` of pixels.
    /// Returns `None` if the length of `pixels` is not equal to `width * height`.
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<T>) -> Option<Self> {
        if pixels.len() == width as usize * height as usize {
            Some(Self {
                width,
                height,
                pixels,
            })
        } else {
            None
        }
    }

    /// Creates a new [`Raster`] by calling `f(x, y)` for each pixel in row-major order.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
        let pixels = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();

        Self {
            width,
            height,
            pixels,
        }
    }

    /// Returns the number of pixels in each row.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Returns the number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Returns `(width, height)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns whether the raster has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Returns the pixels in row-major order.
    #[must_use]
    pub fn pixels(&self) -> &[T] {
        &self.pixels
    }

    /// Returns the pixels in row-major order as a mutable slice.
    pub fn pixels_mut(&mut self) -> &mut [T] {
        &mut self.pixels
    }

    /// Returns the pixel at column `x` and row `y`, or `None` if it is out of bounds.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<&T> {
        if x < self.width && y < self.height {
            self.pixels.get(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Returns an iterator over the rows of the raster.
    pub fn rows(&self) -> impl Iterator<Item = &[T]> + '_ {
        // chunks_exact panics on a zero chunk size
        self.pixels.chunks_exact(self.width.max(1) as usize)
    }

    /// Consumes the raster, returning its pixels in row-major order.
    #[must_use]
    pub fn into_pixels(self) -> Vec<T> {
        self.pixels
    }
}

impl<T> Index<(u32, u32)> for Raster<T> {
    type Output = T;

    fn index(&self, (x, y): (u32, u32)) -> &Self::Output {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds"
        );
        &self.pixels[y as usize * self.width as usize + x as usize]
    }
}

#[cfg(feature = "image")]
impl From<&RgbImage> for Raster<Srgb<u8>> {
    fn from(image: &RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let len = width as usize * height as usize * 3;
        let colors: &[Srgb<u8>] = image.as_raw()[..len].components_as();
        Self {
            width,
            height,
            pixels: colors.to_vec(),
        }
    }
}

#[cfg(feature = "image")]
impl From<Raster<Srgb<u8>>> for RgbImage {
    fn from(raster: Raster<Srgb<u8>>) -> Self {
        let Raster { width, height, pixels } = raster;
        let buf: Vec<u8> = pixels.into_components();

        #[allow(clippy::unwrap_used)]
        {
            // a raster always holds exactly width * height pixels
            RgbImage::from_raw(width, height, buf).unwrap()
        }
    }
}

/// The output of [`Atkinson::quantize`](crate::Atkinson::quantize).
///
/// Both rasters have the dimensions of the quantized image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuantizeOutput {
    /// The palette index chosen for each pixel.
    ///
    /// Names are resolved through the palette of the lookup table used for quantization.
    pub indices: Raster<u8>,
    /// The representative palette color chosen for each pixel.
    pub colors: Raster<Srgb<u8>>,
}
