//! A library for turning images into mosaics of block textures.
//!
//! `blockify` works in two phases that share nothing but a lookup table:
//! 1. A [`LookupTable`] is built once from a [`Palette`] of named colors. It stores, for every
//!    color in the 256³ sRGB cube, the palette entry closest to it by squared Euclidean distance.
//!    Building it walks the whole cube, so it is split into shards of the red axis that are
//!    computed independently (in parallel with the `threads` feature) and merged by shard index.
//!    The table is then saved to disk alongside its palette.
//! 2. An image is low-pass filtered and decimated ([`filter_and_decimate`]),
//!    quantized with serpentine [`Atkinson`] dithering using the table,
//!    and every resulting pixel is replaced by the 16×16 texture named by its palette entry
//!    ([`compose`]).
//!
//! # Features
//! - `threads`: exposes parallel versions of most functions via [`rayon`].
//! - `image`: enables integration with the [`image`] crate and loading textures from a directory.
//! - `cli`: builds the `blockify` command line tool.
//!
//! # High-Level API
//! To get started, see [`MosaicPipeline`]:
//! ```no_run
//! # use blockify::{LookupTable, MosaicPipeline, Palette, TextureDir};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // computed once, then loaded from disk
//! let table = LookupTable::build_par(&Palette::blocks(), 4)?;
//! table.save("color_table.blut")?;
//!
//! let img = image::open("some image")?.into_rgb8();
//! let mosaic = MosaicPipeline::from_rgbimage(&img, &table)
//!     .decimation(4)
//!     .mosaic_rgbimage_par(&TextureDir::new("textures"))?;
//! mosaic.save("mosaic.png")?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::pedantic,
    clippy::cargo,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::unwrap_in_result,
    clippy::expect_used,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice,
    missing_docs,
    clippy::missing_docs_in_private_items,
    rustdoc::all,
    clippy::float_cmp_const,
    clippy::lossy_float_literal
)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::many_single_char_names,
    clippy::missing_panics_doc,
    clippy::unreadable_literal,
    clippy::wildcard_imports
)]

mod dither;
mod filter;
mod lookup;
mod mosaic;
mod named_palette;
mod pipeline;
mod types;

pub mod remez;

pub use dither::Atkinson;
pub use filter::*;
pub use lookup::*;
pub use mosaic::*;
pub use named_palette::Palette;
pub use pipeline::MosaicPipeline;
pub use types::*;

/// The number of values each color channel can take.
pub const CHANNEL_LEVELS: usize = 256;

/// The number of colors in the full sRGB cube, and so the number of cells in a [`LookupTable`].
pub const CUBE_SIZE: usize = CHANNEL_LEVELS * CHANNEL_LEVELS * CHANNEL_LEVELS;

/// The maximum supported number of palette entries is `256`,
/// since each lookup table cell stores a `u8` palette index.
pub const MAX_COLORS: u16 = u8::MAX as u16 + 1;

/// The width and height of every texture tile in pixels.
pub const TILE_SIZE: u32 = 16;

#[cfg(test)]
pub(crate) mod tests {
    use crate::{LookupTable, Palette, Raster};
    use ::palette::Srgb;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    use std::sync::OnceLock;

    pub fn black_and_white() -> Palette {
        Palette::new([
            ("black", Srgb::new(0, 0, 0)),
            ("white", Srgb::new(255, 255, 255)),
        ])
        .unwrap()
    }

    pub fn primaries() -> Palette {
        Palette::new([
            ("black", Srgb::new(0, 0, 0)),
            ("white", Srgb::new(255, 255, 255)),
            ("red", Srgb::new(255, 0, 0)),
            ("green", Srgb::new(0, 255, 0)),
            ("blue", Srgb::new(0, 0, 255)),
        ])
        .unwrap()
    }

    /// Built once and shared, since each build walks the full color cube.
    pub fn black_and_white_table() -> &'static LookupTable {
        static TABLE: OnceLock<LookupTable> = OnceLock::new();
        TABLE.get_or_init(|| LookupTable::build(&black_and_white(), 1).unwrap())
    }

    pub fn primaries_table() -> &'static LookupTable {
        static TABLE: OnceLock<LookupTable> = OnceLock::new();
        TABLE.get_or_init(|| LookupTable::build(&primaries(), 4).unwrap())
    }

    pub fn solid(width: u32, height: u32, color: Srgb<u8>) -> Raster<Srgb<u8>> {
        Raster::from_fn(width, height, |_, _| color)
    }

    pub fn random_image(width: u32, height: u32, seed: u64) -> Raster<Srgb<u8>> {
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
        Raster::from_fn(width, height, |_, _| {
            Srgb::new(rng.gen(), rng.gen(), rng.gen())
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    pub fn gradient(width: u32, height: u32) -> Raster<Srgb<u8>> {
        Raster::from_fn(width, height, |x, y| {
            let r = (x * 255 / (width - 1).max(1)) as u8;
            let g = (y * 255 / (height - 1).max(1)) as u8;
            Srgb::new(r, g, r / 2 + g / 2)
        })
    }
}
