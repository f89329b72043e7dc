//! Contains the [`Palette`] of named representative colors.

use crate::{Error, Result, MAX_COLORS};
use palette::Srgb;
use std::{collections::HashSet, str::FromStr};

/// A list of named colors to quantize images to.
///
/// Each name identifies a texture, so names must be unique
/// and may not contain `/` or `\`.
/// Entries keep the order they were given in, and that order is significant:
/// when two entries are equally close to a color, the earlier one wins.
///
/// # Examples
/// ```
/// # use blockify::Palette;
/// # use palette::Srgb;
/// # fn main() -> Result<(), blockify::Error> {
/// let palette = Palette::new([
///     ("black_wool", Srgb::new(20, 21, 25)),
///     ("white_wool", Srgb::new(233, 236, 236)),
/// ])?;
/// assert_eq!(palette.index_of("white_wool"), Some(1));
///
/// let palette: Palette = "black_wool 20 21 25\nwhite_wool 233 236 236".parse()?;
/// assert_eq!(palette.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    /// The name of each entry.
    names: Vec<String>,
    /// The representative color of each entry.
    colors: Vec<Srgb<u8>>,
}

impl Palette {
    /// Creates a new [`Palette`] from `(name, color)` pairs, keeping their order.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfiguration`] if there are no entries,
    /// more than [`MAX_COLORS`] entries, an empty name, a name containing a path separator,
    /// or a duplicate name.
    pub fn new<Name: Into<String>>(
        entries: impl IntoIterator<Item = (Name, Srgb<u8>)>,
    ) -> Result<Self> {
        let (names, colors): (Vec<String>, Vec<_>) = entries
            .into_iter()
            .map(|(name, color)| (name.into(), color))
            .unzip();

        if names.is_empty() {
            return Err(Error::InvalidConfiguration(
                "a palette needs at least one entry".to_owned(),
            ));
        }

        if names.len() > usize::from(MAX_COLORS) {
            return Err(Error::InvalidConfiguration(format!(
                "a palette can have at most {MAX_COLORS} entries, got {}",
                names.len()
            )));
        }

        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.is_empty() {
                return Err(Error::InvalidConfiguration(
                    "palette entry names must not be empty".to_owned(),
                ));
            }
            if name.contains(['/', '\\']) {
                return Err(Error::InvalidConfiguration(format!(
                    "palette entry `{name}` contains a path separator"
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidConfiguration(format!(
                    "duplicate palette entry `{name}`"
                )));
            }
        }

        Ok(Self { names, colors })
    }

    /// Returns the number of entries in the palette.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`, a palette has at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the entry names in palette order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the representative colors in palette order.
    #[must_use]
    pub fn colors(&self) -> &[Srgb<u8>] {
        &self.colors
    }

    /// Returns the name of the entry at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn name(&self, index: u8) -> &str {
        &self.names[usize::from(index)]
    }

    /// Returns the representative color of the entry at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn color(&self, index: u8) -> Srgb<u8> {
        self.colors[usize::from(index)]
    }

    /// Returns the index of the entry with the given name.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn index_of(&self, name: &str) -> Option<u8> {
        // palettes have at most 256 entries
        self.names.iter().position(|n| n == name).map(|i| i as u8)
    }

    /// Returns the representative color of the entry with the given name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Srgb<u8>> {
        self.index_of(name).map(|i| self.color(i))
    }

    /// Returns the squared Euclidean distance between `color` and the entry at `index`.
    ///
    /// # Panics
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn distance(&self, color: Srgb<u8>, index: u8) -> u32 {
        squared_distance(color, self.color(index))
    }

    /// Returns the index of the entry nearest to `color` by a linear scan over the palette.
    ///
    /// The first of several equally near entries wins.
    /// Use a [`LookupTable`](crate::LookupTable) when quantizing many colors.
    #[must_use]
    pub fn nearest(&self, color: Srgb<u8>) -> u8 {
        let mut nearest = 0;
        let mut min_distance = u32::MAX;
        for (i, &entry) in self.colors.iter().enumerate() {
            let distance = squared_distance(color, entry);
            if distance < min_distance {
                min_distance = distance;
                nearest = i;
            }
        }

        #[allow(clippy::cast_possible_truncation)]
        {
            nearest as u8
        }
    }

    /// Returns an iterator over the `(name, color)` entries in palette order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, Srgb<u8>)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.colors.iter().copied())
    }

    /// Returns the default palette of 52 block textures.
    ///
    /// Names match the file names of the textures (without the `.png` extension),
    /// and colors are representative of, but not necessarily the average of, each texture.
    #[must_use]
    pub fn blocks() -> Self {
        Self {
            names: BLOCKS.iter().map(|&(name, _)| name.to_owned()).collect(),
            colors: BLOCKS
                .iter()
                .map(|&(_, [r, g, b])| Srgb::new(r, g, b))
                .collect(),
        }
    }
}

impl FromStr for Palette {
    type Err = Error;

    /// Parses a palette with one `name red green blue` entry per line.
    ///
    /// Blank lines are skipped and `#` starts a comment that runs to the end of the line.
    fn from_str(s: &str) -> Result<Self> {
        let mut entries = Vec::new();

        for (number, line) in s.lines().enumerate() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let invalid = || {
                Error::InvalidConfiguration(format!(
                    "line {}: expected `name red green blue`, got `{line}`",
                    number + 1
                ))
            };

            let mut fields = line.split_whitespace();
            let name = fields.next().ok_or_else(invalid)?;
            let mut channel = || -> Result<u8> {
                fields
                    .next()
                    .and_then(|c| c.parse().ok())
                    .ok_or_else(invalid)
            };
            let color = Srgb::new(channel()?, channel()?, channel()?);

            if fields.next().is_some() {
                return Err(invalid());
            }

            entries.push((name, color));
        }

        Self::new(entries)
    }
}

/// Squared euclidean distance between two colors.
fn squared_distance(x: Srgb<u8>, y: Srgb<u8>) -> u32 {
    let d = |a: u8, b: u8| u32::from(a.abs_diff(b)).pow(2);
    d(x.red, y.red) + d(x.green, y.green) + d(x.blue, y.blue)
}

/// The block textures of [`Palette::blocks`] with their representative colors.
const BLOCKS: [(&str, [u8; 3]); 52] = [
    ("white_wool", [233, 236, 236]),
    ("orange_wool", [240, 118, 19]),
    ("magenta_wool", [189, 68, 179]),
    ("light_blue_wool", [58, 175, 217]),
    ("yellow_wool", [248, 198, 39]),
    ("lime_wool", [112, 185, 25]),
    ("pink_wool", [237, 141, 172]),
    ("gray_wool", [62, 68, 71]),
    ("light_gray_wool", [142, 142, 134]),
    ("cyan_wool", [21, 137, 145]),
    ("purple_wool", [121, 42, 172]),
    ("blue_wool", [53, 57, 157]),
    ("brown_wool", [114, 71, 40]),
    ("green_wool", [84, 109, 27]),
    ("red_wool", [161, 39, 34]),
    ("black_wool", [20, 21, 25]),
    ("bricks", [151, 98, 83]),
    ("light_blue_concrete", [36, 137, 199]),
    ("blue_concrete", [45, 47, 143]),
    ("lapis_block", [37, 67, 140]),
    ("pink_concrete", [214, 101, 143]),
    ("gray_concrete", [55, 58, 62]),
    ("black_concrete", [8, 10, 15]),
    ("cyan_concrete", [21, 119, 136]),
    ("white_concrete", [207, 213, 214]),
    ("orange_concrete", [224, 97, 1]),
    ("red_concrete", [142, 33, 33]),
    ("yellow_concrete", [241, 174, 21]),
    ("red_terracotta", [143, 61, 47]),
    ("red_sand", [191, 103, 33]),
    ("warped_planks", [43, 105, 99]),
    ("green_concrete", [73, 91, 36]),
    ("end_stone", [220, 223, 158]),
    ("oak_planks", [162, 131, 79]),
    ("spruce_planks", [115, 85, 49]),
    ("birch_planks", [192, 175, 121]),
    ("acacia_planks", [168, 90, 50]),
    ("jungle_planks", [160, 151, 81]),
    ("redstone_block", [176, 25, 5]),
    ("sand", [219, 207, 163]),
    ("iron_block", [220, 220, 220]),
    ("bedrock", [85, 85, 85]),
    ("diamond_block", [98, 237, 228]),
    ("black_terracotta", [37, 23, 16]),
    ("chiseled_stone_bricks", [120, 119, 120]),
    ("magenta_concrete", [169, 48, 159]),
    ("sponge", [196, 192, 75]),
    ("sandstone", [216, 203, 156]),
    ("dirt", [134, 96, 67]),
    ("gold_block", [246, 208, 61]),
    ("orange_terracotta", [162, 84, 38]),
    ("blue_terracotta", [74, 60, 91]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order() {
        let palette = Palette::new([
            ("z", Srgb::new(1, 2, 3)),
            ("a", Srgb::new(4, 5, 6)),
            ("m", Srgb::new(7, 8, 9)),
        ])
        .unwrap();

        assert_eq!(palette.names(), ["z", "a", "m"]);
        assert_eq!(palette.index_of("m"), Some(2));
        assert_eq!(palette.get("a"), Some(Srgb::new(4, 5, 6)));
        assert_eq!(palette.get("b"), None);
        assert_eq!(
            palette.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            ["z", "a", "m"]
        );
    }

    #[test]
    fn rejects_invalid_entries() {
        let empty: [(&str, Srgb<u8>); 0] = [];
        assert!(matches!(
            Palette::new(empty),
            Err(Error::InvalidConfiguration(_))
        ));

        assert!(matches!(
            Palette::new([("a", Srgb::new(0, 0, 0)), ("a", Srgb::new(1, 1, 1))]),
            Err(Error::InvalidConfiguration(_))
        ));

        for name in ["", "../escape", "dir/stone", "dir\\stone"] {
            assert!(
                matches!(
                    Palette::new([(name, Srgb::new(0, 0, 0))]),
                    Err(Error::InvalidConfiguration(_))
                ),
                "{name}"
            );
        }

        let too_many = (0..=256).map(|i| (format!("entry{i}"), Srgb::new(0, 0, 0)));
        assert!(matches!(
            Palette::new(too_many),
            Err(Error::InvalidConfiguration(_))
        ));

        let max = (0..256).map(|i| (format!("entry{i}"), Srgb::new(0, 0, 0)));
        assert_eq!(Palette::new(max).unwrap().len(), 256);
    }

    #[test]
    fn parse_text() {
        let palette: Palette = "
            # name  r g b
            stone 125 125 125
            dirt 134 96 67 # trailing comment

            sand 219 207 163
        "
        .parse()
        .unwrap();

        assert_eq!(palette.names(), ["stone", "dirt", "sand"]);
        assert_eq!(palette.color(1), Srgb::new(134, 96, 67));

        for bad in [
            "stone 1 2",
            "stone 1 2 3 4",
            "stone 1 2 256",
            "stone a b c",
            "../stone 1 2 3",
            "",
        ] {
            assert!(
                matches!(bad.parse::<Palette>(), Err(Error::InvalidConfiguration(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn builtin_blocks_are_valid() {
        let blocks = Palette::blocks();
        assert_eq!(blocks.len(), BLOCKS.len());
        assert_eq!(Palette::new(blocks.iter()).unwrap(), blocks);
        assert_eq!(blocks.get("black_concrete"), Some(Srgb::new(8, 10, 15)));
    }
}
