#![warn(unused_extern_crates)]
use std::error::Error;
use std::time::Instant;

use clap::Parser as Clap_parser;
use image::ColorType;
use nrops::{config, estimate, NrFilter, NrParams, RgbaImage};

#[derive(Clap_parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// image to denoise
    #[arg(name = "input path", value_name = "input_path")]
    input_path: String,

    #[arg(
        short,
        name = "output path",
        default_value = "denoised.png",
        value_name = "output_path"
    )]
    output_path: String,

    /// TOML file with per-channel threshold/softness settings
    #[arg(short, name = "params path", value_name = "params_path")]
    params_path: Option<String>,

    /// derive the parameters from the image itself
    #[arg(short, long)]
    estimate: bool,

    /// same threshold on all channels, overrides defaults
    #[arg(short, long)]
    threshold: Option<f32>,

    /// softness used together with --threshold
    #[arg(short, long, default_value_t = 0.9)]
    softness: f32,
}

fn decode(path: &str) -> Result<RgbaImage, Box<dyn Error>> {
    let dynamic = image::open(path)?;
    let sixteen_bit = matches!(
        dynamic.color(),
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16
    );
    let width = dynamic.width() as usize;
    let height = dynamic.height() as usize;

    let data: Vec<[u16; 4]> = if sixteen_bit {
        dynamic
            .to_rgba16()
            .chunks_exact(4)
            .map(|px| [px[0], px[1], px[2], px[3]])
            .collect()
    } else {
        dynamic
            .to_rgba8()
            .chunks_exact(4)
            .map(|px| [px[0] as u16, px[1] as u16, px[2] as u16, px[3] as u16])
            .collect()
    };

    Ok(RgbaImage::from_pixels(width, height, sixteen_bit, data)?)
}

fn encode(image: &RgbaImage, path: &str) -> Result<(), Box<dyn Error>> {
    let width = image.width as u32;
    let height = image.height as u32;
    if image.sixteen_bit {
        let flat: Vec<u16> = image.data.iter().flatten().copied().collect();
        let buffer = image::ImageBuffer::<image::Rgba<u16>, _>::from_raw(width, height, flat)
            .ok_or("pixel buffer does not match image dimensions")?;
        buffer.save(path)?;
    } else {
        let flat: Vec<u8> = image.data.iter().flatten().map(|v| *v as u8).collect();
        let buffer = image::ImageBuffer::<image::Rgba<u8>, _>::from_raw(width, height, flat)
            .ok_or("pixel buffer does not match image dimensions")?;
        buffer.save(path)?;
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let source = decode(&args.input_path)?;
    println!(
        "loaded {}x{} ({} bit)",
        source.width,
        source.height,
        if source.sixteen_bit { 16 } else { 8 }
    );

    let params = if args.estimate {
        let now = Instant::now();
        let estimated = estimate(&source)?;
        println!("estimation time: {:.2?}", now.elapsed());
        println!("{}", toml::to_string(&estimated)?);
        estimated
    } else if let Some(path) = &args.params_path {
        config::parse_params(&std::fs::read_to_string(path)?)?
    } else if let Some(threshold) = args.threshold {
        NrParams::uniform(threshold, args.softness)
    } else {
        NrParams::default()
    };

    let filter = NrFilter::new(params).with_progress(|percent| eprint!("\r{percent:3}%"));
    let now = Instant::now();
    let denoised = filter.run(&source)?;
    eprintln!();
    println!("denoise time: {:.2?}", now.elapsed());

    encode(&denoised, &args.output_path)?;
    println!("saved {}", args.output_path);
    Ok(())
}
