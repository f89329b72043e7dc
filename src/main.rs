#![deny(unsafe_code, unsafe_op_in_unsafe_fn)]
#![warn(
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::todo,
    clippy::unimplemented,
    clippy::unneeded_field_pattern,
    clippy::rest_pat_in_fully_bound_structs,
    clippy::unnecessary_self_imports,
    clippy::str_to_string,
    clippy::string_to_string,
    clippy::string_slice
)]

//! Command line front end: precompute a lookup table, then convert images into block mosaics.

use std::{
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use blockify::{Error, LookupTable, MosaicPipeline, Palette, Result, TextureDir};
use clap::{Parser, Subcommand};
use log::{error, info};

#[derive(Subcommand)]
enum Command {
    /// Computes the nearest palette entry for every color and saves the table.
    Precompute {
        /// A palette file with one `name r g b` entry per line. Defaults to the built-in blocks.
        #[arg(short, long)]
        palette: Option<PathBuf>,

        /// The number of shards to split the color cube into. Must divide 256.
        #[arg(short, long, default_value_t = 4)]
        shards: u32,

        /// Where to save the table.
        #[arg(short, long, default_value = "./mc_textures/color_table.blut")]
        output: PathBuf,
    },
    /// Converts an image into a mosaic of block textures.
    Convert {
        /// The image to convert.
        input: PathBuf,

        /// The factor to shrink the image by before quantization.
        #[arg(short, long, default_value_t = 1)]
        decimate: u32,

        /// The output file name.
        #[arg(short, long, default_value = "mc.jpg")]
        output: PathBuf,

        /// Ask for the output name and decimation factor on standard input.
        #[arg(short, long)]
        interactive: bool,

        /// The precomputed lookup table.
        #[arg(short = 'a', long, default_value = "./mc_textures/color_table.blut")]
        table: PathBuf,

        /// The directory holding a `<name>.png` texture for each palette entry.
        #[arg(short, long, default_value = "./mc_textures/")]
        texture_dir: PathBuf,
    },
}

#[derive(Parser)]
#[command(about = "Turns images into mosaics of block textures.")]
struct Options {
    /// The number of worker threads, or 0 for one per core.
    #[arg(long, global = true, default_value_t = 0)]
    threads: usize,

    /// Enable debug logging, including the filter design and the time taken by each stage.
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

macro_rules! timed {
    ($name: literal, $val: expr) => {{
        let time = std::time::Instant::now();
        let value = $val;
        info!("{} took {}ms", $name, time.elapsed().as_millis());
        value
    }};
}

fn main() -> ExitCode {
    let Options { threads, verbose, command } = Options::parse();

    let level = if verbose { "debug" } else { "info" };
    let env = env_logger::Env::default().default_filter_or(level);
    env_logger::Builder::from_env(env).init();

    let result = match threads {
        0 => run(command),
        t => rayon::ThreadPoolBuilder::new()
            .num_threads(t)
            .build()
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))
            .and_then(|pool| pool.install(|| run(command))),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Precompute { palette, shards, output } => {
            precompute(palette.as_deref(), shards, &output)
        }
        Command::Convert {
            input,
            decimate,
            output,
            interactive,
            table,
            texture_dir,
        } => {
            let (output, decimate) = if interactive {
                prompt(io::stdin().lock(), io::stdout().lock())?
            } else {
                (output, decimate)
            };

            convert(&input, decimate, &output, &table, texture_dir)
        }
    }
}

fn precompute(palette: Option<&Path>, shards: u32, output: &Path) -> Result<()> {
    let palette = match palette {
        Some(path) => std::fs::read_to_string(path)?.parse::<Palette>()?,
        None => Palette::blocks(),
    };

    let table = timed!(
        "building the lookup table",
        LookupTable::build_par(&palette, shards)?
    );

    if let Some(dir) = output.parent() {
        std::fs::create_dir_all(dir)?;
    }
    timed!("saving the lookup table", table.save(output)?);

    info!(
        "saved a table for {} palette entries to {}",
        palette.len(),
        output.display()
    );
    Ok(())
}

fn convert(
    input: &Path,
    decimate: u32,
    output: &Path,
    table: &Path,
    texture_dir: PathBuf,
) -> Result<()> {
    let table = timed!("loading the lookup table", LookupTable::load(table)?);
    let image = timed!("reading the image", image::open(input)?.into_rgb8());

    let mosaic = timed!(
        "building the mosaic",
        MosaicPipeline::from_rgbimage(&image, &table)
            .decimation(decimate)
            .mosaic_rgbimage_par(&TextureDir::new(texture_dir))?
    );

    timed!("writing the mosaic", mosaic.save(output)?);

    info!(
        "wrote a {}x{} mosaic to {}",
        mosaic.width(),
        mosaic.height(),
        output.display()
    );
    Ok(())
}

/// Asks for the output file name and the decimation factor.
fn prompt(mut input: impl BufRead, mut output: impl Write) -> Result<(PathBuf, u32)> {
    let mut line = String::new();

    writeln!(
        output,
        "Please enter the name of the output image (e.g. test, cat_picture).\n\
         Without an extension, the output will be a .jpg"
    )?;
    output.flush()?;
    input.read_line(&mut line)?;

    let mut name = PathBuf::from(line.trim());
    if name.as_os_str().is_empty() {
        return Err(Error::InvalidConfiguration(
            "the output name is empty".to_owned(),
        ));
    }
    if name.extension().is_none() {
        name.set_extension("jpg");
    }

    writeln!(
        output,
        "Please enter the factor to shrink the image by.\n\
         It should be a positive integer, 1 keeps the original size"
    )?;
    output.flush()?;
    line.clear();
    input.read_line(&mut line)?;

    let trimmed = line.trim();
    let decimate = match trimmed.parse::<u32>() {
        Ok(decimate) => decimate,
        Err(e) => {
            let message = format!("invalid decimation factor `{trimmed}`: {e}");
            return Err(Error::InvalidConfiguration(message));
        }
    };

    Ok((name, decimate))
}
