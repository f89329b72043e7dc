//! Contains the [`LookupTable`] from every sRGB color to its nearest palette entry
//! and the sharded builder that computes it.

use crate::{Error, Palette, Result, CHANNEL_LEVELS, CUBE_SIZE};
use log::{debug, info};
use ordered_float::OrderedFloat;
use palette::Srgb;
use std::{
    any::Any,
    fmt::Debug,
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    ops::Range,
    panic::{self, AssertUnwindSafe},
    path::Path,
    time::Instant,
};
use wide::{f32x8, u32x8, CmpLt};

#[cfg(feature = "threads")]
use std::sync::mpsc;

/// The number of cells sharing a single red value.
const PLANE: usize = CHANNEL_LEVELS * CHANNEL_LEVELS;

/// Returns the position of `color` in the cells of a [`LookupTable`].
#[inline]
fn cell_index(color: Srgb<u8>) -> usize {
    (usize::from(color.red) * CHANNEL_LEVELS + usize::from(color.green)) * CHANNEL_LEVELS
        + usize::from(color.blue)
}

/// A contiguous block of the red axis of the color cube, with the full green and blue extent.
///
/// A shard is the unit of work of the table builder:
/// each shard is computed independently and owns its own output buffer.
///
/// # Examples
/// ```
/// # use blockify::Shard;
/// # fn main() -> Result<(), blockify::Error> {
/// let shards = Shard::partition(4)?.collect::<Vec<_>>();
/// assert_eq!(shards[1].red_range(), 64..128);
/// assert!(Shard::partition(3).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Shard {
    /// The position of this shard along the red axis.
    index: u32,
    /// The total number of shards the cube is split into.
    count: u32,
}

impl Shard {
    /// Splits the red axis into `count` shards of equal size.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `count` does not evenly divide `256`.
    pub fn partition(count: u32) -> Result<impl ExactSizeIterator<Item = Shard>> {
        let valid = count != 0
            && count as usize <= CHANNEL_LEVELS
            && CHANNEL_LEVELS % count as usize == 0;

        if valid {
            Ok((0..count).map(move |index| Shard { index, count }))
        } else {
            Err(Error::InvalidConfiguration(format!(
                "the shard count must evenly divide {CHANNEL_LEVELS}, got {count}"
            )))
        }
    }

    /// Returns the position of this shard along the red axis.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the total number of shards the cube was split into.
    #[must_use]
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Returns the number of red values covered by this shard.
    #[must_use]
    pub const fn len(&self) -> usize {
        CHANNEL_LEVELS / self.count as usize
    }

    /// Always `false`, every shard covers at least one red value.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the red values covered by this shard.
    #[must_use]
    pub const fn red_range(&self) -> Range<usize> {
        let len = self.len();
        let start = self.index as usize * len;
        start..(start + len)
    }

    /// Returns the slice of the table cells covered by this shard.
    fn cell_range(self) -> Range<usize> {
        let Range { start, end } = self.red_range();
        (start * PLANE)..(end * PLANE)
    }
}

/// The palette colors laid out in lanes of eight for the nearest color scan.
///
/// Each chunk holds the indices of eight palette entries and their components.
/// Unused lanes of the last chunk have infinite components so they are never the nearest.
struct PaletteLanes {
    /// The palette indices of each lane and the red, green and blue components of each lane.
    chunks: Vec<(u32x8, [f32x8; 3])>,
}

impl PaletteLanes {
    /// Lays out the colors of `palette` in lanes.
    fn new(palette: &Palette) -> Self {
        let chunks = palette
            .colors()
            .chunks(8)
            .enumerate()
            .map(|(chunk_index, chunk)| {
                let mut indices = [0; 8];
                let mut components = [[f32::INFINITY; 8]; 3];
                for (lane, color) in chunk.iter().enumerate() {
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        indices[lane] = (chunk_index * 8 + lane) as u32;
                    }
                    components[0][lane] = f32::from(color.red);
                    components[1][lane] = f32::from(color.green);
                    components[2][lane] = f32::from(color.blue);
                }
                (u32x8::new(indices), components.map(f32x8::new))
            })
            .collect();

        Self { chunks }
    }

    /// Computes the nearest palette index for every cell of the shard.
    ///
    /// The returned cells are ordered like the cells of a full table,
    /// starting at the first red value of the shard.
    fn compute_shard(&self, shard: Shard) -> Vec<u8> {
        let mut cells = vec![0; shard.len() * PLANE];
        let mut partial = vec![f32x8::splat(0.0); self.chunks.len()];

        for (red, red_cells) in shard.red_range().zip(cells.chunks_exact_mut(PLANE)) {
            #[allow(clippy::cast_precision_loss)]
            let r = f32x8::splat(red as f32);

            for (green, green_cells) in red_cells.chunks_exact_mut(CHANNEL_LEVELS).enumerate() {
                #[allow(clippy::cast_precision_loss)]
                let g = f32x8::splat(green as f32);

                // the red and green terms are shared by every blue value
                for (d, (_, [pr, pg, _])) in partial.iter_mut().zip(&self.chunks) {
                    let dr = r - *pr;
                    let dg = g - *pg;
                    *d = dr * dr + dg * dg;
                }

                for (blue, cell) in green_cells.iter_mut().enumerate() {
                    #[allow(clippy::cast_precision_loss)]
                    let b = f32x8::splat(blue as f32);
                    *cell = self.nearest(&partial, b);
                }
            }
        }

        cells
    }

    /// Returns the index of the first palette entry with the minimum distance.
    #[inline]
    fn nearest(&self, partial: &[f32x8], b: f32x8) -> u8 {
        let mut min_distance = f32x8::splat(f32::INFINITY);
        let mut min_index = u32x8::splat(0);

        // Distances are sums of squared integers below 2^24, so they are exact in f32.
        // A strict comparison keeps the earliest chunk for each lane.
        for (&(indices, [_, _, pb]), &base) in self.chunks.iter().zip(partial) {
            let db = b - pb;
            let distance = base + db * db;
            let mask = u32x8::new(distance.cmp_lt(min_distance).to_array().map(f32::to_bits));
            min_index = mask.blend(indices, min_index);
            min_distance = min_distance.fast_min(distance);
        }

        let distances = min_distance.as_array_ref();
        let indices = min_index.as_array_ref();

        let lane = (0..8)
            .min_by_key(|&lane| (OrderedFloat(distances[lane]), indices[lane]))
            .unwrap_or_default();

        // indices are below 256 since a palette has at most 256 entries
        u8::try_from(indices[lane]).unwrap_or_default()
    }
}

/// Runs the computation for one shard, turning a panic into a [`Error::WorkerFailure`].
fn run_worker(shard: Shard, compute: &impl Fn(Shard) -> Vec<u8>) -> Result<Vec<u8>> {
    let start = Instant::now();

    let result = panic::catch_unwind(AssertUnwindSafe(|| compute(shard)));
    let cells = result.map_err(|payload| Error::WorkerFailure {
        shard: shard.index,
        message: panic_message(payload.as_ref()),
    })?;

    let expected = shard.len() * PLANE;
    if cells.len() != expected {
        return Err(Error::WorkerFailure {
            shard: shard.index,
            message: format!("expected {expected} cells, got {}", cells.len()),
        });
    }

    debug!(
        "shard {}/{} (red {:?}) took {}ms",
        shard.index + 1,
        shard.count,
        shard.red_range(),
        start.elapsed().as_millis()
    );

    Ok(cells)
}

/// Extracts the message of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(&message) = payload.downcast_ref::<&str>() {
        message.to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_owned()
    }
}

/// Writes each shard's cells into the slice of the table addressed by its shard index.
///
/// Results may arrive in any order. The first failed shard fails the whole build,
/// and a shard without a result is reported as a failure.
fn merge(
    palette: &Palette,
    shard_count: u32,
    results: impl IntoIterator<Item = (Shard, Result<Vec<u8>>)>,
) -> Result<LookupTable> {
    let mut cells = vec![0; CUBE_SIZE].into_boxed_slice();
    let mut merged = vec![false; shard_count as usize];

    for (shard, result) in results {
        let shard_cells = result?;
        cells[shard.cell_range()].copy_from_slice(&shard_cells);
        merged[shard.index as usize] = true;
    }

    if let Some(missing) = (0..shard_count).find(|&i| !merged[i as usize]) {
        return Err(Error::WorkerFailure {
            shard: missing,
            message: "no result was reported".to_owned(),
        });
    }

    Ok(LookupTable {
        palette: palette.clone(),
        cells,
    })
}

/// Builds a table one shard at a time.
fn build_with(
    palette: &Palette,
    shard_count: u32,
    compute: impl Fn(Shard) -> Vec<u8>,
) -> Result<LookupTable> {
    let shards = Shard::partition(shard_count)?;
    let results = shards.map(|shard| (shard, run_worker(shard, &compute)));
    merge(palette, shard_count, results)
}

/// Builds a table with one worker per shard on the rayon thread pool.
///
/// Workers report their results through a channel in completion order.
#[cfg(feature = "threads")]
fn build_par_with(
    palette: &Palette,
    shard_count: u32,
    compute: impl Fn(Shard) -> Vec<u8> + Sync,
) -> Result<LookupTable> {
    let shards = Shard::partition(shard_count)?;
    let (sender, receiver) = mpsc::channel();

    rayon::scope(|scope| {
        for shard in shards {
            let sender = sender.clone();
            let compute = &compute;
            scope.spawn(move |_| {
                // the receiver outlives the scope
                let _ = sender.send((shard, run_worker(shard, compute)));
            });
        }
    });

    drop(sender);
    merge(palette, shard_count, receiver)
}

/// A precomputed table holding, for every color of the 256³ sRGB cube,
/// the index of the nearest palette entry.
///
/// "Nearest" is by squared Euclidean distance over the three channels.
/// If several entries are equally near, the one that comes first in the palette is chosen.
///
/// A table is always paired with the palette it was built from,
/// since its indices are meaningless without it.
///
/// # Examples
/// ```no_run
/// # use blockify::{LookupTable, Palette};
/// # use palette::Srgb;
/// # fn main() -> Result<(), blockify::Error> {
/// let table = LookupTable::build_par(&Palette::blocks(), 8)?;
/// assert_eq!(table.name(Srgb::new(0, 0, 0)), "black_concrete");
/// table.save("color_table.blut")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct LookupTable {
    /// The palette the table was built from.
    palette: Palette,
    /// One palette index per color, in `(red * 256 + green) * 256 + blue` order.
    cells: Box<[u8]>,
}

impl Debug for LookupTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupTable")
            .field("palette", &self.palette)
            .finish_non_exhaustive()
    }
}

impl LookupTable {
    /// Builds the table by computing the shards of the color cube one after another.
    ///
    /// The result is the same for every valid `shard_count`.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `shard_count` does not evenly divide `256`,
    /// or [`Error::WorkerFailure`] if the computation of a shard panics.
    pub fn build(palette: &Palette, shard_count: u32) -> Result<Self> {
        let start = Instant::now();
        info!(
            "building lookup table for {} palette entries in {shard_count} shards",
            palette.len()
        );

        let lanes = PaletteLanes::new(palette);
        let table = build_with(palette, shard_count, |shard| lanes.compute_shard(shard))?;

        info!("built lookup table in {}ms", start.elapsed().as_millis());
        Ok(table)
    }

    /// Builds the table by computing each shard of the color cube on its own worker in parallel.
    ///
    /// The result is identical to [`LookupTable::build`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if `shard_count` does not evenly divide `256`,
    /// or [`Error::WorkerFailure`] if any worker panics. No partial table is ever returned.
    #[cfg(feature = "threads")]
    pub fn build_par(palette: &Palette, shard_count: u32) -> Result<Self> {
        let start = Instant::now();
        info!(
            "building lookup table for {} palette entries with {shard_count} workers",
            palette.len()
        );

        let lanes = PaletteLanes::new(palette);
        let table = build_par_with(palette, shard_count, |shard| lanes.compute_shard(shard))?;

        info!("built lookup table in {}ms", start.elapsed().as_millis());
        Ok(table)
    }

    /// Creates a table from a palette and raw cells.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] if there are not exactly [`CUBE_SIZE`] cells
    /// or a cell is not a valid index into `palette`.
    pub fn from_cells(palette: Palette, cells: Vec<u8>) -> Result<Self> {
        if cells.len() != CUBE_SIZE {
            return Err(Error::InvalidTable(format!(
                "expected {CUBE_SIZE} cells, got {}",
                cells.len()
            )));
        }

        if let Some(&index) = cells.iter().find(|&&i| usize::from(i) >= palette.len()) {
            return Err(Error::InvalidTable(format!(
                "cell index {index} is out of range for a palette of {} entries",
                palette.len()
            )));
        }

        Ok(Self {
            palette,
            cells: cells.into_boxed_slice(),
        })
    }

    /// Returns the palette the table was built from.
    #[must_use]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Returns the palette index of every cell, in `(red * 256 + green) * 256 + blue` order.
    #[must_use]
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    /// Returns the index of the palette entry nearest to `color`.
    #[must_use]
    #[inline]
    pub fn index(&self, color: Srgb<u8>) -> u8 {
        self.cells[cell_index(color)]
    }

    /// Returns the name of the palette entry nearest to `color`.
    #[must_use]
    pub fn name(&self, color: Srgb<u8>) -> &str {
        self.palette.name(self.index(color))
    }

    /// Returns the representative color of the palette entry nearest to `color`.
    #[must_use]
    pub fn color(&self, color: Srgb<u8>) -> Srgb<u8> {
        self.palette.color(self.index(color))
    }
}

/// The first bytes of a persisted lookup table.
const MAGIC: &[u8; 6] = b"BLKLUT";

/// The version of the persisted format.
const VERSION: u16 = 1;

/// Reads exactly enough bytes to fill `buf`, reporting truncated input as an invalid table.
fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::InvalidTable("unexpected end of data".to_owned())
        } else {
            e.into()
        }
    })
}

/// Reads a little endian `u16`.
fn read_u16(reader: &mut impl Read) -> Result<u16> {
    let mut buf = [0; 2];
    read_exact(reader, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

impl LookupTable {
    /// Writes the table together with its palette.
    ///
    /// The format is the magic bytes `BLKLUT`, a `u16` version, a `u16` entry count,
    /// each palette entry as a `u16` name length, the UTF-8 name and three color bytes,
    /// and finally the 256³ cells. All integers are little endian.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_to(&self, mut writer: impl Write) -> Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;

        #[allow(clippy::cast_possible_truncation)]
        let count = self.palette.len() as u16; // at most 256 entries
        writer.write_all(&count.to_le_bytes())?;

        for (name, color) in self.palette.iter() {
            let len = u16::try_from(name.len()).map_err(|_| {
                Error::InvalidTable(format!("palette entry name `{name}` is too long"))
            })?;
            writer.write_all(&len.to_le_bytes())?;
            writer.write_all(name.as_bytes())?;
            writer.write_all(&[color.red, color.green, color.blue])?;
        }

        writer.write_all(&self.cells)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a table written by [`LookupTable::write_to`].
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] if the data is not a valid table,
    /// or [`Error::Io`] if reading fails.
    pub fn read_from(mut reader: impl Read) -> Result<Self> {
        let mut magic = [0; 6];
        read_exact(&mut reader, &mut magic)?;
        if &magic != MAGIC {
            return Err(Error::InvalidTable("not a lookup table".to_owned()));
        }

        let version = read_u16(&mut reader)?;
        if version != VERSION {
            return Err(Error::InvalidTable(format!(
                "unsupported version {version}"
            )));
        }

        let count = read_u16(&mut reader)?;
        let mut entries = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let len = read_u16(&mut reader)?;
            let mut name = vec![0; usize::from(len)];
            read_exact(&mut reader, &mut name)?;
            let name = String::from_utf8(name).map_err(|e| Error::InvalidTable(e.to_string()))?;

            let mut rgb = [0; 3];
            read_exact(&mut reader, &mut rgb)?;
            let [r, g, b] = rgb;
            entries.push((name, Srgb::new(r, g, b)));
        }

        let palette = Palette::new(entries).map_err(|e| Error::InvalidTable(e.to_string()))?;

        let mut cells = vec![0; CUBE_SIZE];
        read_exact(&mut reader, &mut cells)?;

        if reader.read(&mut [0])? != 0 {
            return Err(Error::InvalidTable(
                "trailing data after the cells".to_owned(),
            ));
        }

        Self::from_cells(palette, cells)
    }

    /// Saves the table to a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created or written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.write_to(BufWriter::new(File::create(path)?))
    }

    /// Loads a table saved with [`LookupTable::save`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not a valid table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_from(BufReader::new(File::open(path)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;

    #[test]
    fn partition_requires_divisor_of_256() {
        for count in [0, 3, 5, 100, 255, 512] {
            assert!(matches!(
                Shard::partition(count),
                Err(Error::InvalidConfiguration(_))
            ));
        }

        for count in [1, 2, 4, 8, 16, 32, 64, 128, 256] {
            let shards = Shard::partition(count).unwrap().collect::<Vec<_>>();
            assert_eq!(shards.len(), count as usize);

            let mut next = 0;
            for (i, shard) in shards.iter().enumerate() {
                assert_eq!(shard.index() as usize, i);
                assert_eq!(shard.red_range().start, next);
                next = shard.red_range().end;
            }
            assert_eq!(next, CHANNEL_LEVELS);
        }
    }

    #[test]
    fn build_rejects_bad_shard_count() {
        assert!(matches!(
            LookupTable::build(&black_and_white(), 3),
            Err(Error::InvalidConfiguration(_))
        ));

        #[cfg(feature = "threads")]
        assert!(matches!(
            LookupTable::build_par(&black_and_white(), 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn shard_count_does_not_change_table() {
        let palette = primaries();
        let expected = primaries_table(); // built with 4 shards

        let single = LookupTable::build(&palette, 1).unwrap();
        assert!(single == *expected);

        let many = LookupTable::build(&palette, 256).unwrap();
        assert!(many == *expected);

        #[cfg(feature = "threads")]
        {
            for count in [2, 16] {
                let parallel = LookupTable::build_par(&palette, count).unwrap();
                assert!(parallel == *expected, "{count} workers");
            }
        }
    }

    #[test]
    fn cells_hold_first_nearest_entry() {
        // 13 entries to exercise a partially filled chunk of lanes
        let mut rng = Xoroshiro128PlusPlus::seed_from_u64(7);
        let mut random_color = || Srgb::new(rng.gen(), rng.gen(), rng.gen());
        let palette = Palette::new((0..13).map(|i| (format!("c{i}"), random_color()))).unwrap();

        #[cfg(feature = "threads")]
        let table = LookupTable::build_par(&palette, 8).unwrap();
        #[cfg(not(feature = "threads"))]
        let table = LookupTable::build(&palette, 8).unwrap();

        #[allow(clippy::cast_possible_truncation)]
        for r in 0..=255 {
            for g in 0..=255 {
                for b in 0..=255 {
                    let color = Srgb::new(r, g, b);
                    let index = table.index(color);
                    let distance = palette.distance(color, index);
                    for other in 0..palette.len() {
                        let other_distance = palette.distance(color, other as u8);
                        assert!(distance <= other_distance);
                        if distance == other_distance {
                            assert!(index <= other as u8);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn equidistant_colors_go_to_first_entry() {
        let low = ("low", Srgb::new(0, 0, 0));
        let high = ("high", Srgb::new(2, 0, 0));
        let low_first = Palette::new([low, high]).unwrap();
        let high_first = Palette::new([high, low]).unwrap();

        // red = 1 is the second of 256 shards
        let shard = Shard::partition(256).unwrap().nth(1).unwrap();
        for palette in [low_first, high_first] {
            let cells = PaletteLanes::new(&palette).compute_shard(shard);
            assert_eq!(cells[0], 0); // (1, 0, 0)
            assert_eq!(palette.nearest(Srgb::new(1, 0, 0)), 0);
        }

        let gray = Srgb::new(128, 128, 128);
        let duplicates = Palette::new((0..20).map(|i| (format!("gray{i}"), gray))).unwrap();
        let shard = Shard::partition(4).unwrap().nth(3).unwrap();
        let cells = PaletteLanes::new(&duplicates).compute_shard(shard);
        assert!(cells.iter().all(|&i| i == 0));
    }

    #[test]
    fn mid_gray_goes_to_black() {
        let table = black_and_white_table();
        // 3 * 127^2 = 48387 < 3 * 128^2 = 49152
        assert_eq!(table.name(Srgb::new(127, 127, 127)), "black");
        assert_eq!(table.name(Srgb::new(128, 128, 128)), "white");
        let white = Srgb::new(255, 255, 255);
        assert_eq!(table.color(Srgb::new(200, 180, 190)), white);
        assert_eq!(table.color(Srgb::new(200, 10, 10)), Srgb::new(0, 0, 0));
    }

    #[test]
    fn merge_uses_shard_index() {
        let palette = primaries();
        let shards = Shard::partition(4).unwrap().collect::<Vec<_>>();

        #[allow(clippy::cast_possible_truncation)]
        let results = shards
            .iter()
            .rev()
            .map(|&shard| {
                let cells = vec![shard.index() as u8; shard.len() * PLANE];
                (shard, Ok(cells))
            })
            .collect::<Vec<_>>();

        let table = merge(&palette, 4, results).unwrap();
        for red in 0..=255u8 {
            assert_eq!(table.index(Srgb::new(red, 17, 201)), red / 64);
        }
    }

    #[test]
    fn merge_reports_missing_shard() {
        let palette = primaries();
        let results = Shard::partition(4)
            .unwrap()
            .filter(|shard| shard.index() != 2)
            .map(|shard| (shard, Ok(vec![0; shard.len() * PLANE])))
            .collect::<Vec<_>>();

        assert!(matches!(
            merge(&palette, 4, results),
            Err(Error::WorkerFailure { shard: 2, .. })
        ));
    }

    fn failing_worker(shard: Shard) -> Vec<u8> {
        assert!(shard.index() != 2, "shard two exploded");
        vec![0; shard.len() * PLANE]
    }

    #[test]
    fn worker_panic_fails_build() {
        let palette = primaries();

        match build_with(&palette, 4, failing_worker) {
            Err(Error::WorkerFailure { shard, message }) => {
                assert_eq!(shard, 2);
                assert!(message.contains("shard two exploded"));
            }
            other => panic!("expected a worker failure, got {other:?}"),
        }

        #[cfg(feature = "threads")]
        assert!(matches!(
            build_par_with(&palette, 4, failing_worker),
            Err(Error::WorkerFailure { shard: 2, .. })
        ));
    }

    #[test]
    fn worker_with_short_output_fails_build() {
        let result = build_with(&primaries(), 8, |shard| vec![0; shard.len()]);
        assert!(matches!(result, Err(Error::WorkerFailure { shard: 0, .. })));
    }

    #[test]
    fn persisted_table_round_trips() {
        let table = primaries_table();

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let read = LookupTable::read_from(buf.as_slice()).unwrap();
        assert!(read == *table);
        assert_eq!(read.palette().names(), table.palette().names());
    }

    #[test]
    fn saved_table_loads_back() {
        let table = black_and_white_table();
        let dir = std::env::temp_dir();
        let path = dir.join(format!("blockify-table-{}.blut", std::process::id()));

        table.save(&path).unwrap();
        let loaded = LookupTable::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(loaded.unwrap() == *table);

        let missing = dir.join("blockify-missing").join("table.blut");
        assert!(matches!(LookupTable::load(missing), Err(Error::Io(_))));
    }

    #[test]
    fn rejects_corrupt_tables() {
        let table = primaries_table();
        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();

        let mut bad_magic = buf.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            LookupTable::read_from(bad_magic.as_slice()),
            Err(Error::InvalidTable(_))
        ));

        let mut bad_version = buf.clone();
        bad_version[6] = 9;
        assert!(matches!(
            LookupTable::read_from(bad_version.as_slice()),
            Err(Error::InvalidTable(_))
        ));

        let truncated = &buf[..buf.len() - 1];
        assert!(matches!(
            LookupTable::read_from(truncated),
            Err(Error::InvalidTable(_))
        ));

        let mut out_of_range = buf.clone();
        let last = out_of_range.len() - 1;
        out_of_range[last] = 200;
        assert!(matches!(
            LookupTable::read_from(out_of_range.as_slice()),
            Err(Error::InvalidTable(_))
        ));

        let mut trailing = buf;
        trailing.push(0);
        assert!(matches!(
            LookupTable::read_from(trailing.as_slice()),
            Err(Error::InvalidTable(_))
        ));
    }
}
