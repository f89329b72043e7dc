#![allow(dead_code)]

use std::{collections::HashMap, sync::OnceLock};

use blockify::{LookupTable, Palette, Raster, TILE_SIZE};
use palette::Srgb;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoroshiro128PlusPlus;

/// Smooth gradients with some noise on top, so that dithering has work to do.
pub fn synthetic_image(width: u32, height: u32, seed: u64) -> Raster<Srgb<u8>> {
    let mut rng = Xoroshiro128PlusPlus::seed_from_u64(seed);
    Raster::from_fn(width, height, |x, y| {
        let r = x * 255 / width.max(1);
        let g = y * 255 / height.max(1);
        let b = (x + y) * 127 / (width + height).max(1);
        let noise = |c: u32, rng: &mut Xoroshiro128PlusPlus| {
            u8::try_from((c + rng.gen_range(0..32)).min(255)).unwrap()
        };
        Srgb::new(noise(r, &mut rng), noise(g, &mut rng), noise(b, &mut rng))
    })
}

static BENCHMARK_IMAGES: OnceLock<Vec<(String, Raster<Srgb<u8>>)>> = OnceLock::new();

pub fn benchmark_images() -> &'static [(String, Raster<Srgb<u8>>)] {
    BENCHMARK_IMAGES.get_or_init(|| {
        [(320, 240), (1280, 720), (1920, 1080)]
            .into_iter()
            .zip(0..)
            .map(|((width, height), seed)| {
                let image = synthetic_image(width, height, seed);
                (format!("{width}x{height}"), image)
            })
            .collect()
    })
}

static BLOCKS_TABLE: OnceLock<LookupTable> = OnceLock::new();

pub fn blocks_table() -> &'static LookupTable {
    BLOCKS_TABLE.get_or_init(|| LookupTable::build_par(&Palette::blocks(), 4).unwrap())
}

/// A flat texture per palette entry in its representative color.
pub fn flat_textures(palette: &Palette) -> HashMap<String, Raster<Srgb<u8>>> {
    palette
        .iter()
        .map(|(name, color)| {
            let texture = Raster::from_fn(TILE_SIZE, TILE_SIZE, |_, _| color);
            (name.to_owned(), texture)
        })
        .collect()
}
