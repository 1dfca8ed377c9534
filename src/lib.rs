//! Lossless RGBA image codec for game art.
//!
//! Sprite-style imagery compresses well when its structure is exploited
//! directly: fully-transparent regions go through a bitmask coder,
//! repeated pixel blocks become 2D LZ copies, low-color images switch to
//! an indexed palette, and everything else is coded as spatially and
//! color-filtered residuals under a local-entropy context model. The
//! container is a framed bitstream with integrity hashes in the header.
//!
//! The round-trip surface is two calls:
//!
//! ```no_run
//! use gcif_rust::{encode, decode, GcifKnobs};
//!
//! # fn main() -> Result<(), gcif_rust::GcifError> {
//! let rgba = vec![0u8; 16 * 16 * 4];
//! let container = encode(&rgba, 16, 16, &GcifKnobs::default())?;
//! let image = decode(&container)?;
//! assert_eq!(image.rgba, rgba);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

use log::info;
use thiserror::Error;

/// Errors reported by the codec.
///
/// Every failure surfaces as one of these kinds; nothing in the library
/// panics on malformed input.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcifError {
    /// Image dimensions are zero, exceed 65535, or disagree with the
    /// pixel buffer length.
    #[error("invalid image dimensions")]
    BadDims,

    /// Encoder knobs are inconsistent (e.g. entropy selection enabled
    /// with a zero candidate fuzz).
    #[error("invalid encoder parameters")]
    BadParams,

    /// The container buffer is truncated or not word-aligned.
    #[error("failed to read container")]
    ReadFail,

    /// The container could not be produced.
    #[error("failed to write container")]
    WriteFail,

    /// Magic or header hash mismatch; this is not a valid container.
    #[error("bad container format")]
    BadFormat,

    /// The body failed its integrity hash or decoded inconsistently.
    #[error("container data is corrupt")]
    DataCorrupt,

    /// An internal invariant was violated.
    #[error("internal state error: {0}")]
    InternalState(&'static str),
}

pub mod gcifbits;
pub mod gcifchaos;
pub mod gcifdec;
pub mod gcifentropy;
pub mod gciffilter;
pub mod gciflz;
pub mod gcifmask;
pub mod gcifmono;
pub mod gcifpalette;
pub mod gcifrgba;
pub mod gcifstructs;

pub use gcifdec::{decode, verify, DecodedImage};
pub use gcifstructs::GcifKnobs;

use gcifbits::BitWriter;
use gciflz::LzMatchFinder;
use gcifmask::MaskWriter;
use gcifpalette::PaletteWriter;
use gcifrgba::RgbaWriter;
use gcifstructs::{good_hash_of, head_hash_of, ImageHeader, HEAD_MAGIC, MAX_DIM};

/// Encode an RGBA raster (4 bytes per pixel, row-major) into a container.
pub fn encode(
    rgba: &[u8],
    xsize: usize,
    ysize: usize,
    knobs: &GcifKnobs,
) -> Result<Vec<u8>, GcifError> {
    if xsize == 0 || ysize == 0 || xsize > MAX_DIM || ysize > MAX_DIM {
        return Err(GcifError::BadDims);
    }
    if rgba.len() != xsize * ysize * 4 {
        return Err(GcifError::BadDims);
    }

    info!("encode: {}x{} raster", xsize, ysize);

    let mask = MaskWriter::init(rgba, xsize, ysize, knobs);
    let palette = PaletteWriter::init(rgba, xsize, ysize, knobs, &mask);

    // LZ only pays off on the filtered path; palette images skip the scan.
    let mut lz = LzMatchFinder::new(xsize, ysize);
    if !palette.enabled() && knobs.lz_enable {
        lz.scan(rgba);
    }

    let mut bw = BitWriter::new();
    mask.write(&mut bw)?;
    lz.write(&mut bw);
    palette.write(&mask, &mut bw)?;
    if !palette.enabled() {
        let mut writer = RgbaWriter::init(rgba, xsize, ysize, &mask, &lz, knobs)?;
        writer.write(&mut bw);
    }

    let (words, fast_hash) = bw.finalize();
    let dims = ((xsize as u32) << 16) | ysize as u32;
    let header = ImageHeader {
        xsize: xsize as u16,
        ysize: ysize as u16,
        head_hash: head_hash_of(HEAD_MAGIC, dims),
        fast_hash,
        good_hash: good_hash_of(&words),
    };

    let mut bytes = Vec::with_capacity((gcifstructs::HEAD_WORDS + words.len()) * 4);
    header.write_to(&mut bytes);
    for w in &words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }

    info!("encode: {} bytes for {} pixels", bytes.len(), xsize * ysize);
    Ok(bytes)
}

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
