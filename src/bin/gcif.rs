use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env};
use gcif_rust::{decode, encode, verify, GcifError, GcifKnobs};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Lossless RGBA codec for game art", long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    /// Enable console logging at debug level
    #[clap(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compress a PNG into a container file
    Encode {
        /// Input PNG path
        input: PathBuf,

        /// Output container path
        output: PathBuf,

        /// Tiles re-evaluated after the first filter-selection pass
        #[clap(long, default_value_t = 4096)]
        revisit_count: u32,

        /// Spatial-filter candidates kept per tile during entropy
        /// evaluation
        #[clap(long, default_value_t = 8)]
        filter_fuzz: u32,

        /// Skip the entropy-driven tile tournament
        #[clap(long)]
        fast_tiles: bool,

        /// Disable the 2D LZ match pass
        #[clap(long)]
        no_lz: bool,
    },

    /// Decompress a container file into a PNG
    Decode {
        /// Input container path
        input: PathBuf,

        /// Output PNG path
        output: PathBuf,

        /// Also check the strong verification hash
        #[clap(long)]
        strict: bool,
    },

    /// Check a container's strong verification hash
    Verify {
        /// Input container path
        input: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose || cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };
    Builder::from_env(Env::new().default_filter_or(default_level)).init();
}

/// Load a PNG and normalize it to 8-bit RGBA.
fn load_png(path: &Path) -> Result<(Vec<u8>, usize, usize)> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut decoder = png::Decoder::new(file);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().context("reading PNG header")?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let frame = reader.next_frame(&mut buf).context("reading PNG frame")?;

    let rgba = match frame.color_type {
        png::ColorType::Rgba => buf[..frame.buffer_size()].to_vec(),
        png::ColorType::Rgb => {
            let mut rgba = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);
            for px in buf[..frame.buffer_size()].chunks(3) {
                rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
            rgba
        }
        png::ColorType::Grayscale => {
            let mut rgba = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);
            for &g in &buf[..frame.buffer_size()] {
                rgba.extend_from_slice(&[g, g, g, 255]);
            }
            rgba
        }
        png::ColorType::GrayscaleAlpha => {
            let mut rgba = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);
            for px in buf[..frame.buffer_size()].chunks(2) {
                rgba.extend_from_slice(&[px[0], px[0], px[0], px[1]]);
            }
            rgba
        }
        other => return Err(anyhow!("unsupported PNG color type {:?}", other)),
    };

    Ok((rgba, frame.width as usize, frame.height as usize))
}

fn save_png(path: &Path, rgba: &[u8], xsize: usize, ysize: usize) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), xsize as u32, ysize as u32);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().context("writing PNG header")?;
    writer
        .write_image_data(rgba)
        .context("writing PNG image data")?;
    Ok(())
}

/// Exit codes follow the codec error taxonomy; anything else is 1.
fn error_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<GcifError>() {
        Some(GcifError::BadDims) => 2,
        Some(GcifError::BadParams) => 3,
        Some(GcifError::ReadFail) => 4,
        Some(GcifError::WriteFail) => 5,
        Some(GcifError::BadFormat) => 6,
        Some(GcifError::DataCorrupt) => 7,
        Some(GcifError::InternalState(_)) => 8,
        None => 1,
    }
}

fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Encode {
            input,
            output,
            revisit_count,
            filter_fuzz,
            fast_tiles,
            no_lz,
        } => {
            let knobs = GcifKnobs {
                cm_revisit_count: revisit_count,
                cm_filter_select_fuzz: filter_fuzz,
                cm_disable_entropy: fast_tiles,
                lz_enable: !no_lz,
                ..GcifKnobs::default()
            };
            let (rgba, xsize, ysize) = load_png(&input)?;
            let container = encode(&rgba, xsize, ysize, &knobs)?;
            std::fs::write(&output, &container)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                "{} -> {}: {} pixels in {} bytes",
                input.display(),
                output.display(),
                xsize * ysize,
                container.len()
            );
        }
        Command::Decode {
            input,
            output,
            strict,
        } => {
            let container = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            if strict && !verify(&container)? {
                return Err(GcifError::DataCorrupt.into());
            }
            let image = decode(&container)?;
            save_png(&output, &image.rgba, image.xsize, image.ysize)?;
            info!(
                "{} -> {}: {}x{}",
                input.display(),
                output.display(),
                image.xsize,
                image.ysize
            );
        }
        Command::Verify { input } => {
            let container = std::fs::read(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            if !verify(&container)? {
                return Err(GcifError::DataCorrupt.into());
            }
            println!("{}: OK", input.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(error_code(&err))
        }
    }
}
