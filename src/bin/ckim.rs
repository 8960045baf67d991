use clap::{Parser, ValueEnum};
use kim::compression::{
    BlockSize, CompressionError, Kim1BlockCompressor, Kim1Compressor, Kim2Compressor, PixelGrid,
};
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    /// A single palette for the whole image
    Kim1,
    /// A global palette, and a small palette for each block
    Kim1Blocks,
    /// A single color, and a quantized alpha value for each pixel
    Kim2,
}

#[derive(Parser, Debug)]
#[command(about = "Compresses an image file to a kim file", long_about = None)]
#[command(version)]
struct Args {
    /// The input file.
    #[arg(short, long)]
    input: PathBuf,

    /// The output kim file.
    #[arg(short, long)]
    output: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Format::Kim1)]
    format: Format,

    /// The width of a block, for kim1-blocks.
    #[arg(long, default_value_t = 8)]
    block_width: u32,

    /// The height of a block, for kim1-blocks.
    #[arg(long, default_value_t = 8)]
    block_height: u32,

    /// The number of bits per alpha value, for kim2.
    #[arg(long, default_value_t = 8)]
    bits_per_pixel: u32,
}

fn compress(grid: &PixelGrid, args: &Args) -> Result<Vec<u8>, CompressionError> {
    match args.format {
        Format::Kim1 => Kim1Compressor::new(grid)?.compress_to_vec(),
        Format::Kim1Blocks => {
            let block_size = BlockSize::new(args.block_width, args.block_height);
            let compressor = Kim1BlockCompressor::new(grid, block_size)?;
            compressor.compress_to_vec()
        }
        Format::Kim2 => {
            let compressor = Kim2Compressor::from_grid(grid, args.bits_per_pixel)?;
            compressor.compress_to_vec()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let image = match image::open(&args.input) {
        Ok(image) => image.to_rgba8(),
        Err(e) => {
            println!("Cannot open image: {}", e);
            process::exit(1)
        }
    };

    let grid = match PixelGrid::try_from(&image) {
        Ok(grid) => grid,
        Err(e) => {
            println!("Cannot read image: {}", e);
            process::exit(1)
        }
    };

    let compressed = match compress(&grid, &args) {
        Ok(compressed) => compressed,
        Err(e) => {
            println!("Cannot compress image: {}", e);
            process::exit(1)
        }
    };

    let result = File::create(&args.output).and_then(|file| {
        let mut writer = BufWriter::new(file);
        writer.write_all(&compressed)?;
        writer.flush()
    });

    if let Err(e) = result {
        println!("Cannot write {}: {}", args.output.display(), e);
        process::exit(1)
    }

    println!(
        "Compressed {}x{} pixels to {} bytes",
        grid.width(),
        grid.height(),
        compressed.len()
    );
}
