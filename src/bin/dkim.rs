use clap::{Parser, ValueEnum};
use image::RgbaImage;
use kim::compression::{
    decompress_image, DecompressionError, Kim1BlockDecompressor, Kim1Decompressor, Kim2Decompressor,
};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Kim1,
    Kim1Blocks,
    Kim2,
}

#[derive(Parser, Debug)]
#[command(about = "Decompresses a kim file to another image file", long_about = None)]
#[command(version)]
struct Args {
    /// The input kim file.
    #[arg(short, long)]
    input: PathBuf,

    /// The output file. The output format will be determined using
    /// the extension of the output file.
    #[arg(short, long)]
    output: PathBuf,

    /// The format of the input file, which is not stored in the file itself.
    #[arg(short, long, value_enum, default_value_t = Format::Kim1)]
    format: Format,
}

fn decompress(data: &[u8], format: Format) -> Result<RgbaImage, DecompressionError> {
    match format {
        Format::Kim1 => decompress_image(&Kim1Decompressor::new(data)?),
        Format::Kim1Blocks => decompress_image(&Kim1BlockDecompressor::new(data)?),
        Format::Kim2 => decompress_image(&Kim2Decompressor::new(data)?),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let args = Args::parse();

    let data = match fs::read(&args.input) {
        Err(e) => {
            println!("Cannot open input file: {}", e);
            process::exit(1);
        }
        Ok(data) => data,
    };

    let image = match decompress(&data, args.format) {
        Err(error) => {
            println!("Error while decompressing the image: {}", error);
            process::exit(1)
        }
        Ok(image) => image,
    };

    if let Err(e) = image.save(&args.output) {
        println!("Cannot save image: {}", e);
        process::exit(1)
    }
}
