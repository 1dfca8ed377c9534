//! Container reader: parses the framed header, drives the sub-stream
//! decoders in writer order and reconstructs the raster bit-exactly.
//!
//! The data-hash check always runs before the decoded image is handed
//! back; a mismatch reports corruption even when every sub-stream decoded
//! without tripping a guard.

use byteorder::{BigEndian, ByteOrder};
use log::info;

use crate::gcifbits::BitReader;
use crate::gcifchaos::RgbaChaos;
use crate::gcifentropy::{EntropyDecoder, ENCODER_ZRLE_SYMS};
use crate::gciffilter::{fetch_neighbors, CF_COUNT, CF_INVERSE, SF_COUNT, SF_FILTERS, SF_FIXED};
use crate::gciflz::LzReader;
use crate::gcifmask::MaskReader;
use crate::gcifmono::MonoReader;
use crate::gcifpalette::read_palette;
use crate::gcifstructs::{good_hash_of, ImageHeader, HEAD_WORDS};
use crate::GcifError;

/// A fully decoded raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub xsize: usize,
    pub ysize: usize,
    pub rgba: Vec<u8>,
}

fn body_words(bytes: &[u8]) -> Result<Vec<u32>, GcifError> {
    let body = &bytes[HEAD_WORDS * 4..];
    if body.len() % 4 != 0 {
        return Err(GcifError::ReadFail);
    }
    Ok(body
        .chunks_exact(4)
        .map(|c| BigEndian::read_u32(c))
        .collect())
}

/// Decode a container produced by [`crate::encode`].
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, GcifError> {
    let header = ImageHeader::parse(bytes)?;
    let xsize = header.xsize as usize;
    let ysize = header.ysize as usize;
    if xsize == 0 || ysize == 0 {
        return Err(GcifError::BadDims);
    }

    let words = body_words(bytes)?;
    let mut br = BitReader::new(&words);

    let mask = MaskReader::read(xsize, ysize, &mut br)?;
    let lz = LzReader::read(xsize, ysize, &mut br)?;

    let rgba = match read_palette(xsize, ysize, &mask, &mut br)? {
        Some(rgba) => {
            // The writer never combines palette mode with LZ matches.
            if lz.match_count() > 0 {
                return Err(GcifError::DataCorrupt);
            }
            info!("decode: palette path, {}x{}", xsize, ysize);
            rgba
        }
        None => {
            info!("decode: filtered path, {}x{}", xsize, ysize);
            decode_rgba_body(xsize, ysize, &mask, &lz, &mut br)?
        }
    };

    if !br.finalize_check_hash(header.fast_hash) {
        return Err(GcifError::DataCorrupt);
    }

    Ok(DecodedImage { xsize, ysize, rgba })
}

/// Check the stronger verification hash without decoding the image.
pub fn verify(bytes: &[u8]) -> Result<bool, GcifError> {
    let header = ImageHeader::parse(bytes)?;
    let words = body_words(bytes)?;
    Ok(good_hash_of(&words) == header.good_hash)
}

fn decode_rgba_body(
    xsize: usize,
    ysize: usize,
    mask: &MaskReader,
    lz: &LzReader,
    br: &mut BitReader,
) -> Result<Vec<u8>, GcifError> {
    let tile_bits = br.read_bits(3);
    let tile_size = 1usize << tile_bits;
    let tile_mask = tile_size - 1;
    let tiles_x = (xsize + tile_size - 1) >> tile_bits;

    let designed = br.read_bits(5) as usize;
    let sf_count = SF_FIXED + designed;
    let mut sf_indices: Vec<u8> = (0..SF_FIXED as u8).collect();
    for _ in 0..designed {
        let index = br.read_bits(7) as usize;
        if index >= SF_COUNT {
            return Err(GcifError::DataCorrupt);
        }
        sf_indices.push(index as u8);
    }

    let mut sf_reader = MonoReader::read_tables(sf_count, br)?;
    let mut cf_reader = MonoReader::read_tables(CF_COUNT, br)?;
    let mut a_reader = MonoReader::read_tables(256, br)?;

    let chaos_levels = br.read_bits(4) as usize + 1;
    let mut chaos = RgbaChaos::new(chaos_levels, xsize);

    let mut y_decoders = Vec::with_capacity(chaos_levels);
    let mut u_decoders = Vec::with_capacity(chaos_levels);
    let mut v_decoders = Vec::with_capacity(chaos_levels);
    for _ in 0..chaos_levels {
        y_decoders.push(EntropyDecoder::read_tables(256, ENCODER_ZRLE_SYMS, br));
        u_decoders.push(EntropyDecoder::read_tables(256, ENCODER_ZRLE_SYMS, br));
        v_decoders.push(EntropyDecoder::read_tables(256, ENCODER_ZRLE_SYMS, br));
    }

    let masked = |x: usize, y: usize| mask.masked(x, y) || lz.visited(x, y);

    // A tile is absent from the filter grids when every covered pixel is
    // masked; recompute that from the same predicates the writer used.
    let tile_row_masked = |tx: usize, ty: usize| -> bool {
        let x0 = tx * tile_size;
        let y0 = ty * tile_size;
        let x1 = (x0 + tile_size).min(xsize);
        let y1 = (y0 + tile_size).min(ysize);
        for y in y0..y1 {
            for x in x0..x1 {
                if !masked(x, y) {
                    return false;
                }
            }
        }
        true
    };

    let mut rgba = vec![0u8; xsize * ysize * 4];
    let mut sf_row = vec![0u8; tiles_x];
    let mut cf_row = vec![0u8; tiles_x];

    chaos.start();
    for y in 0..ysize {
        chaos.start_row();
        a_reader.read_row_header(y);

        if y & tile_mask == 0 {
            let ty = y >> tile_bits;
            sf_reader.read_row_header(ty);
            cf_reader.read_row_header(ty);
            for tx in 0..tiles_x {
                if tile_row_masked(tx, ty) {
                    sf_reader.zero(tx);
                    cf_reader.zero(tx);
                } else {
                    sf_row[tx] = sf_reader.read(tx, ty, br)?;
                    cf_row[tx] = cf_reader.read(tx, ty, br)?;
                }
            }
        }

        for x in 0..xsize {
            let off = (y * xsize + x) * 4;

            if mask.masked(x, y) {
                rgba[off..off + 4].copy_from_slice(&mask.color());
                chaos.zero();
                a_reader.zero(x);
                continue;
            }
            if lz.visited(x, y) {
                let (sx, sy) = lz.source_of(x, y);
                let src = (sy * xsize + sx) * 4;
                rgba.copy_within(src..src + 4, off);
                chaos.zero();
                a_reader.zero(x);
                continue;
            }

            let by = chaos.chaos(0) as usize;
            let bu = chaos.chaos(1) as usize;
            let bv = chaos.chaos(2) as usize;
            let ry = y_decoders[by].read(br)?;
            let ru = u_decoders[bu].read(br)?;
            let rv = v_decoders[bv].read(br)?;
            if ry > 255 || ru > 255 || rv > 255 {
                return Err(GcifError::DataCorrupt);
            }
            chaos.store(ry as u8, ru as u8, rv as u8, 0);

            let tx = x >> tile_bits;
            let n = fetch_neighbors(&rgba, x, y, xsize);
            let pred = SF_FILTERS[sf_indices[sf_row[tx] as usize] as usize](&n);
            let res = CF_INVERSE[cf_row[tx] as usize]([ry as u8, ru as u8, rv as u8]);

            rgba[off] = pred[0].wrapping_add(res[0]);
            rgba[off + 1] = pred[1].wrapping_add(res[1]);
            rgba[off + 2] = pred[2].wrapping_add(res[2]);
            rgba[off + 3] = a_reader.read(x, y, br)?;
        }
    }

    Ok(rgba)
}
