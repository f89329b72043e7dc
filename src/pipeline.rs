//! Contains the [`MosaicPipeline`] builder struct for the high level API.

use crate::{
    compose, filter_and_decimate, Atkinson, Error, LookupTable, QuantizeOutput, Raster, Result,
    TextureSource,
};
use log::debug;
use palette::Srgb;
use std::{borrow::Cow, time::Instant};

#[cfg(feature = "threads")]
use crate::{compose_par, filter_and_decimate_par};
#[cfg(feature = "image")]
use image::RgbImage;

/// A builder struct to turn an image into a mosaic of textures.
///
/// # Examples
/// To start, create a [`MosaicPipeline`] from an image and a [`LookupTable`]:
/// ```
/// # use blockify::{LookupTable, MosaicPipeline, Palette, Raster};
/// # use palette::Srgb;
/// # fn main() -> Result<(), blockify::Error> {
/// let palette = Palette::new([("black", Srgb::new(0, 0, 0)), ("white", Srgb::new(255, 255, 255))])?;
/// let table = LookupTable::build(&palette, 4)?;
/// let image = Raster::from_fn(64, 48, |x, y| Srgb::new(x as u8 * 4, y as u8 * 5, 0));
/// let pipeline = MosaicPipeline::new(&image, &table);
/// # Ok(())
/// # }
/// ```
///
/// Then, set the decimation factor and run the pipeline.
/// [`MosaicPipeline::quantize`] stops after dithering:
/// ```
/// # use blockify::{LookupTable, MosaicPipeline, Palette, Raster};
/// # use palette::Srgb;
/// # fn main() -> Result<(), blockify::Error> {
/// # let palette = Palette::new([("black", Srgb::new(0, 0, 0)), ("white", Srgb::new(255, 255, 255))])?;
/// # let table = LookupTable::build(&palette, 4)?;
/// # let image = Raster::from_fn(64, 48, |x, y| Srgb::new(x as u8 * 4, y as u8 * 5, 0));
/// let output = MosaicPipeline::new(&image, &table).decimation(4).quantize()?;
/// assert_eq!(output.indices.dimensions(), (16, 12));
/// # Ok(())
/// # }
/// ```
///
/// while [`MosaicPipeline::mosaic`] also replaces each pixel with a texture:
/// ```no_run
/// # use blockify::{LookupTable, MosaicPipeline, Palette, Raster, TextureDir};
/// # use palette::Srgb;
/// # fn main() -> Result<(), blockify::Error> {
/// # let palette = Palette::new([("black", Srgb::new(0, 0, 0)), ("white", Srgb::new(255, 255, 255))])?;
/// # let table = LookupTable::build(&palette, 4)?;
/// # let image = Raster::from_fn(64, 48, |x, y| Srgb::new(x as u8 * 4, y as u8 * 5, 0));
/// let mosaic = MosaicPipeline::new(&image, &table)
///     .decimation(4)
///     .mosaic(&TextureDir::new("textures"))?;
/// assert_eq!(mosaic.dimensions(), (256, 192));
/// # Ok(())
/// # }
/// ```
#[must_use]
#[derive(Debug, Clone)]
pub struct MosaicPipeline<'a> {
    /// The input image.
    image: Cow<'a, Raster<Srgb<u8>>>,
    /// The lookup table, which also provides the palette.
    table: &'a LookupTable,
    /// The factor to shrink the image by before quantization.
    decimation: u32,
}

impl<'a> MosaicPipeline<'a> {
    /// Creates a new [`MosaicPipeline`] with a decimation factor of `1`.
    pub fn new(image: &'a Raster<Srgb<u8>>, table: &'a LookupTable) -> Self {
        Self {
            image: Cow::Borrowed(image),
            table,
            decimation: 1,
        }
    }

    /// Creates a new [`MosaicPipeline`] from a copy of an [`RgbImage`].
    #[cfg(feature = "image")]
    pub fn from_rgbimage(image: &RgbImage, table: &'a LookupTable) -> Self {
        Self {
            image: Cow::Owned(Raster::from(image)),
            table,
            decimation: 1,
        }
    }

    /// Sets the factor to shrink both dimensions of the image by.
    ///
    /// The image is low-pass filtered before every `decimation`-th row and column are kept,
    /// see [`filter_and_decimate`].
    ///
    /// The default decimation factor is `1`, which leaves the image as is.
    pub fn decimation(&mut self, decimation: u32) -> &mut Self {
        self.decimation = decimation;
        self
    }

    /// Returns the input image.
    #[must_use]
    pub fn image(&self) -> &Raster<Srgb<u8>> {
        &self.image
    }

    /// Returns the lookup table.
    #[must_use]
    pub fn table(&self) -> &'a LookupTable {
        self.table
    }

    /// Checks that decimation left something to quantize.
    fn check_decimated(&self, decimated: &Raster<Srgb<u8>>) -> Result<()> {
        if decimated.is_empty() && !self.image.is_empty() {
            let (width, height) = self.image.dimensions();
            Err(Error::InvalidConfiguration(format!(
                "a decimation factor of {} is too large for a {width}x{height} image",
                self.decimation
            )))
        } else {
            Ok(())
        }
    }

    /// Dithers the decimated image.
    fn dither(&self, decimated: &Raster<Srgb<u8>>) -> QuantizeOutput {
        let start = Instant::now();
        let output = Atkinson::new().quantize(decimated, self.table);
        debug!("dithered in {}ms", start.elapsed().as_millis());
        output
    }
}

impl<'a> MosaicPipeline<'a> {
    /// Runs the pipeline up to and including dithering.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if the decimation factor is `0`
    /// or larger than a dimension of the image.
    pub fn quantize(&self) -> Result<QuantizeOutput> {
        let start = Instant::now();
        let decimated = filter_and_decimate(&self.image, self.decimation)?;
        debug!("decimated in {}ms", start.elapsed().as_millis());
        self.check_decimated(&decimated)?;
        Ok(self.dither(&decimated))
    }

    /// Runs the full pipeline and returns the mosaic.
    ///
    /// # Errors
    /// Returns any error of [`MosaicPipeline::quantize`] and [`compose`].
    pub fn mosaic(&self, textures: &impl TextureSource) -> Result<Raster<Srgb<u8>>> {
        let output = self.quantize()?;
        let start = Instant::now();
        let mosaic = compose(&output.indices, self.table.palette(), textures)?;
        debug!("composed in {}ms", start.elapsed().as_millis());
        Ok(mosaic)
    }
}

#[cfg(feature = "image")]
impl<'a> MosaicPipeline<'a> {
    /// Runs the full pipeline and returns the mosaic as an [`RgbImage`].
    ///
    /// # Errors
    /// See [`MosaicPipeline::mosaic`].
    pub fn mosaic_rgbimage(&self, textures: &impl TextureSource) -> Result<RgbImage> {
        self.mosaic(textures).map(Into::into)
    }
}

#[cfg(feature = "threads")]
impl<'a> MosaicPipeline<'a> {
    /// Runs the pipeline up to and including dithering,
    /// filtering the image in parallel.
    ///
    /// Dithering itself is sequential, so the output is identical to [`MosaicPipeline::quantize`].
    ///
    /// # Errors
    /// See [`MosaicPipeline::quantize`].
    pub fn quantize_par(&self) -> Result<QuantizeOutput> {
        let start = Instant::now();
        let decimated = filter_and_decimate_par(&self.image, self.decimation)?;
        debug!("decimated in {}ms", start.elapsed().as_millis());
        self.check_decimated(&decimated)?;
        Ok(self.dither(&decimated))
    }

    /// Runs the full pipeline in parallel where possible and returns the mosaic.
    ///
    /// # Errors
    /// See [`MosaicPipeline::mosaic`].
    pub fn mosaic_par(&self, textures: &impl TextureSource) -> Result<Raster<Srgb<u8>>> {
        let output = self.quantize_par()?;
        let start = Instant::now();
        let mosaic = compose_par(&output.indices, self.table.palette(), textures)?;
        debug!("composed in {}ms", start.elapsed().as_millis());
        Ok(mosaic)
    }
}

#[cfg(all(feature = "threads", feature = "image"))]
impl<'a> MosaicPipeline<'a> {
    /// Runs the full pipeline in parallel where possible and returns the mosaic as an [`RgbImage`].
    ///
    /// # Errors
    /// See [`MosaicPipeline::mosaic`].
    pub fn mosaic_rgbimage_par(&self, textures: &impl TextureSource) -> Result<RgbImage> {
        self.mosaic_par(textures).map(Into::into)
    }
}
