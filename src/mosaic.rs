//! Replaces each quantized pixel with the texture of its palette entry.

use crate::{Error, Palette, Raster, Result, MAX_COLORS, TILE_SIZE};
use log::debug;
use palette::Srgb;
use std::{collections::HashMap, hash::BuildHasher};

#[cfg(feature = "threads")]
use rayon::prelude::*;
#[cfg(feature = "image")]
use std::path::{Path, PathBuf};

/// A source of [`TILE_SIZE`] square textures, addressed by palette entry name.
pub trait TextureSource {
    /// Returns the texture for the palette entry with the given name.
    ///
    /// # Errors
    /// Should return [`Error::MissingTexture`] if there is no texture for `name`.
    fn texture(&self, name: &str) -> Result<Raster<Srgb<u8>>>;
}

impl<T: TextureSource + ?Sized> TextureSource for &T {
    fn texture(&self, name: &str) -> Result<Raster<Srgb<u8>>> {
        (**self).texture(name)
    }
}

impl<S: BuildHasher> TextureSource for HashMap<String, Raster<Srgb<u8>>, S> {
    fn texture(&self, name: &str) -> Result<Raster<Srgb<u8>>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::MissingTexture {
                name: name.to_owned(),
            })
    }
}

/// Loads textures from `<dir>/<name>.png`, discarding any alpha channel.
/// Names containing a path separator are rejected.
#[cfg(feature = "image")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDir {
    /// The directory holding the textures.
    dir: PathBuf,
}

#[cfg(feature = "image")]
impl TextureDir {
    /// Creates a new [`TextureDir`] for the given directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory the textures are loaded from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(feature = "image")]
impl TextureSource for TextureDir {
    fn texture(&self, name: &str) -> Result<Raster<Srgb<u8>>> {
        if name.contains(['/', '\\']) {
            return Err(Error::InvalidConfiguration(format!(
                "texture name `{name}` contains a path separator"
            )));
        }

        let path = self.dir.join(format!("{name}.png"));
        if !path.is_file() {
            return Err(Error::MissingTexture {
                name: name.to_owned(),
            });
        }

        let image = image::open(&path)?.into_rgb8();
        Ok(Raster::from(&image))
    }
}

/// Fetches the texture of each palette entry used in `indices`, once per entry.
fn fetch_tiles(
    indices: &Raster<u8>,
    palette: &Palette,
    textures: &impl TextureSource,
) -> Result<Vec<Option<Raster<Srgb<u8>>>>> {
    let mut used = [false; MAX_COLORS as usize];
    for &i in indices.pixels() {
        used[usize::from(i)] = true;
    }

    let mut tiles = vec![None; MAX_COLORS as usize];
    for (index, tile) in (0..=u8::MAX).zip(&mut tiles) {
        if !used[usize::from(index)] {
            continue;
        }

        if usize::from(index) >= palette.len() {
            return Err(Error::InvalidConfiguration(format!(
                "palette index {index} is out of range for a palette of {} entries",
                palette.len()
            )));
        }

        let name = palette.name(index);
        let texture = textures.texture(name)?;
        let (width, height) = texture.dimensions();
        if (width, height) != (TILE_SIZE, TILE_SIZE) {
            return Err(Error::InvalidTexture {
                name: name.to_owned(),
                width,
                height,
            });
        }

        *tile = Some(texture);
    }

    debug!("fetched {} textures", tiles.iter().flatten().count());

    Ok(tiles)
}

/// Returns the canvas dimensions for `indices`.
fn canvas_dimensions(indices: &Raster<u8>) -> Result<(u32, u32)> {
    let (width, height) = indices.dimensions();
    width
        .checked_mul(TILE_SIZE)
        .zip(height.checked_mul(TILE_SIZE))
        .ok_or_else(|| {
            Error::InvalidConfiguration(format!("a {width}x{height} mosaic is too large"))
        })
}

/// Fills one row of the canvas.
#[inline]
fn fill_row(
    canvas_row: &mut [Srgb<u8>],
    y: usize,
    indices: &Raster<u8>,
    tiles: &[Option<Raster<Srgb<u8>>>],
) {
    let tile_size = TILE_SIZE as usize;
    let (tile_y, row_in_tile) = (y / tile_size, y % tile_size);

    let width = indices.width() as usize;
    let index_row = &indices.pixels()[(tile_y * width)..((tile_y + 1) * width)];

    for (dst, &index) in canvas_row.chunks_exact_mut(tile_size).zip(index_row) {
        if let Some(tile) = &tiles[usize::from(index)] {
            let start = row_in_tile * tile_size;
            dst.copy_from_slice(&tile.pixels()[start..(start + tile_size)]);
        }
    }
}

/// Turns a raster of palette indices into a mosaic of textures.
///
/// The canvas is [`TILE_SIZE`] times larger than `indices` in both dimensions,
/// and the texture for the pixel at `(x, y)` is placed with its top left corner at
/// `(TILE_SIZE * x, TILE_SIZE * y)`. Each texture is fetched once, no matter how often it is used.
///
/// # Errors
/// Returns [`Error::MissingTexture`] if `textures` has no texture for a used palette entry,
/// [`Error::InvalidTexture`] if a texture is not [`TILE_SIZE`] square, and
/// [`Error::InvalidConfiguration`] if an index is out of range for `palette`.
pub fn compose(
    indices: &Raster<u8>,
    palette: &Palette,
    textures: &impl TextureSource,
) -> Result<Raster<Srgb<u8>>> {
    let (width, height) = canvas_dimensions(indices)?;
    let tiles = fetch_tiles(indices, palette, textures)?;

    let mut canvas = vec![Srgb::new(0, 0, 0); width as usize * height as usize];
    if !canvas.is_empty() {
        for (y, row) in canvas.chunks_exact_mut(width as usize).enumerate() {
            fill_row(row, y, indices, &tiles);
        }
    }

    #[allow(clippy::unwrap_used)]
    {
        // the canvas holds exactly width * height pixels
        Ok(Raster::new(width, height, canvas).unwrap())
    }
}

/// Turns a raster of palette indices into a mosaic of textures, filling the canvas in parallel.
///
/// Textures are still fetched sequentially, once per used palette entry.
/// The output is identical to [`compose`].
///
/// # Errors
/// See [`compose`].
#[cfg(feature = "threads")]
pub fn compose_par(
    indices: &Raster<u8>,
    palette: &Palette,
    textures: &impl TextureSource,
) -> Result<Raster<Srgb<u8>>> {
    let (width, height) = canvas_dimensions(indices)?;
    let tiles = fetch_tiles(indices, palette, textures)?;

    let mut canvas = vec![Srgb::new(0, 0, 0); width as usize * height as usize];
    if !canvas.is_empty() {
        canvas
            .par_chunks_exact_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| fill_row(row, y, indices, &tiles));
    }

    #[allow(clippy::unwrap_used)]
    {
        // the canvas holds exactly width * height pixels
        Ok(Raster::new(width, height, canvas).unwrap())
    }
}
