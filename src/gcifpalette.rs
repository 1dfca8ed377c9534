//! Palette mode: images with at most 256 distinct colors store a color
//! table plus a mono-coded index matrix instead of filtered residuals.
//!
//! Small palettes are written as literal color words; larger ones are
//! color-filtered to YUVA and entropy coded. Masked pixels always carry
//! the `masked_palette` index in the index matrix; their actual value is
//! recovered from the mask coder, so the index is context filler only.

use log::info;
use ndarray::Array2;
use rustc_hash::FxHashMap;

use crate::gcifbits::{BitReader, BitWriter};
use crate::gcifentropy::{EntropyDecoder, EntropyEncoder, EntropyEstimator, ENCODER_ZRLE_SYMS};
use crate::gciffilter::{CF_COUNT, CF_FORWARD, CF_INVERSE};
use crate::gcifmask::{MaskReader, MaskWriter};
use crate::gcifmono::{MonoParams, MonoReader, MonoWriter};
use crate::gcifstructs::GcifKnobs;
use crate::GcifError;

/// Hard cap on palette entries.
pub const PALETTE_MAX: usize = 256;

#[inline]
fn color_key(px: [u8; 4]) -> u32 {
    u32::from_le_bytes(px)
}

/// Writer-side palette coder.
pub struct PaletteWriter {
    xsize: usize,
    ysize: usize,
    enabled: bool,
    palette: Vec<[u8; 4]>,
    image: Array2<u8>,
    masked_palette: u8,
    pal_huff_thresh: u32,
}

impl PaletteWriter {
    /// Probe the raster; the palette engages only when every unmasked
    /// pixel fits in [`PALETTE_MAX`] colors.
    pub fn init(
        rgba: &[u8],
        xsize: usize,
        ysize: usize,
        knobs: &GcifKnobs,
        mask: &MaskWriter,
    ) -> Self {
        let mut out = Self {
            xsize,
            ysize,
            enabled: false,
            palette: Vec::new(),
            image: Array2::zeros((0, 0)),
            masked_palette: 0,
            pal_huff_thresh: knobs.pal_huff_thresh,
        };

        let mut map: FxHashMap<u32, u8> = FxHashMap::default();
        let mut palette: Vec<[u8; 4]> = Vec::new();
        let mut hist = [0u64; PALETTE_MAX];

        for y in 0..ysize {
            for x in 0..xsize {
                if mask.masked(x, y) {
                    continue;
                }
                let off = (y * xsize + x) * 4;
                let px = [rgba[off], rgba[off + 1], rgba[off + 2], rgba[off + 3]];
                let key = color_key(px);
                let index = match map.get(&key) {
                    Some(&i) => i,
                    None => {
                        if palette.len() >= PALETTE_MAX {
                            return out;
                        }
                        let i = palette.len() as u8;
                        map.insert(key, i);
                        palette.push(px);
                        i
                    }
                };
                hist[index as usize] += 1;
            }
        }

        if palette.is_empty() {
            return out;
        }

        let most_common = (0..palette.len())
            .max_by_key(|&i| hist[i])
            .unwrap_or(0) as u8;

        // When the mask color itself is in the palette, masked pixels
        // reuse its index; otherwise they borrow the most common one.
        let masked_palette = if mask.enabled() {
            map.get(&color_key(mask.color()))
                .copied()
                .unwrap_or(most_common)
        } else {
            most_common
        };

        let image = Array2::from_shape_fn((ysize, xsize), |(y, x)| {
            if mask.masked(x, y) {
                masked_palette
            } else {
                let off = (y * xsize + x) * 4;
                map[&color_key([rgba[off], rgba[off + 1], rgba[off + 2], rgba[off + 3]])]
            }
        });

        info!("palette: {} colors", palette.len());

        out.enabled = true;
        out.palette = palette;
        out.image = image;
        out.masked_palette = masked_palette;
        out
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn palette_size(&self) -> usize {
        self.palette.len()
    }

    pub fn masked_palette(&self) -> u8 {
        self.masked_palette
    }

    /// Emit the palette bit and, when enabled, the table and index matrix.
    pub fn write(&self, mask: &MaskWriter, bw: &mut BitWriter) -> Result<(), GcifError> {
        if !self.enabled {
            bw.write_bit(0);
            return Ok(());
        }
        bw.write_bit(1);
        self.write_table(bw);
        self.write_pixels(mask, bw)
    }

    fn write_table(&self, bw: &mut BitWriter) {
        let size = self.palette.len();
        bw.write_bits(size as u32 - 1, 8);
        bw.write_bits(self.masked_palette as u32, 8);

        if (size as u32) < self.pal_huff_thresh {
            bw.write_bit(0);
            for &px in &self.palette {
                bw.write_word(color_key(px));
            }
            return;
        }
        bw.write_bit(1);

        // Pick the color filter that concentrates the palette entries the
        // most, then entropy code the YUVA stream.
        let mut best_cf = 0;
        let mut best_score = u32::MAX;
        let ee = EntropyEstimator::new();
        let mut edata = Vec::with_capacity(size * 4);
        for cf in 0..CF_COUNT {
            edata.clear();
            for &px in &self.palette {
                let yuv = CF_FORWARD[cf]([px[0], px[1], px[2]]);
                edata.extend_from_slice(&yuv);
                edata.push(255 - px[3]);
            }
            let score = ee.entropy(&edata);
            if score < best_score {
                best_score = score;
                best_cf = cf;
            }
        }
        bw.write17(best_cf as u32);

        let mut encoder = EntropyEncoder::new(PALETTE_MAX, ENCODER_ZRLE_SYMS);
        for &px in &self.palette {
            let yuv = CF_FORWARD[best_cf]([px[0], px[1], px[2]]);
            encoder.add(yuv[0] as u16);
            encoder.add(yuv[1] as u16);
            encoder.add(yuv[2] as u16);
            encoder.add((255 - px[3]) as u16);
        }
        encoder.finalize();
        encoder.write_tables(bw);
        for &px in &self.palette {
            let yuv = CF_FORWARD[best_cf]([px[0], px[1], px[2]]);
            encoder.write(yuv[0] as u16, bw);
            encoder.write(yuv[1] as u16, bw);
            encoder.write(yuv[2] as u16, bw);
            encoder.write((255 - px[3]) as u16, bw);
        }
    }

    fn write_pixels(&self, mask: &MaskWriter, bw: &mut BitWriter) -> Result<(), GcifError> {
        let masked = |x: usize, y: usize| mask.masked(x, y);
        let mut params = MonoParams::standard(self.image.clone(), self.palette.len());
        params.mask = Some(&masked);
        let mut writer = MonoWriter::init(params)?;

        writer.write_tables(bw);
        for y in 0..self.ysize {
            writer.write_row_header(y, bw);
            for x in 0..self.xsize {
                if mask.masked(x, y) {
                    writer.zero(x);
                } else {
                    writer.write(x, y, bw);
                }
            }
        }
        Ok(())
    }
}

/// Reader-side palette decode. Consumes the palette bit; `None` means the
/// stream continues with the filtered RGBA body.
pub fn read_palette(
    xsize: usize,
    ysize: usize,
    mask: &MaskReader,
    br: &mut BitReader,
) -> Result<Option<Vec<u8>>, GcifError> {
    if br.read_bit() == 0 {
        return Ok(None);
    }

    let size = br.read_bits(8) as usize + 1;
    let _masked_palette = br.read_bits(8) as u8;

    let mut palette = Vec::with_capacity(size);
    if br.read_bit() == 0 {
        for _ in 0..size {
            palette.push(br.read_word().to_le_bytes());
        }
    } else {
        let cf = br.read17() as usize;
        if cf >= CF_COUNT {
            return Err(GcifError::DataCorrupt);
        }
        let decoder = EntropyDecoder::read_tables(PALETTE_MAX, ENCODER_ZRLE_SYMS, br);
        for _ in 0..size {
            let y = decoder.read(br)?;
            let u = decoder.read(br)?;
            let v = decoder.read(br)?;
            let a4 = decoder.read(br)?;
            if y > 255 || u > 255 || v > 255 || a4 > 255 {
                return Err(GcifError::DataCorrupt);
            }
            let rgb = CF_INVERSE[cf]([y as u8, u as u8, v as u8]);
            palette.push([rgb[0], rgb[1], rgb[2], 255 - a4 as u8]);
        }
    }

    let mut reader = MonoReader::read_tables(size, br)?;
    let mut rgba = vec![0u8; xsize * ysize * 4];
    for y in 0..ysize {
        reader.read_row_header(y);
        for x in 0..xsize {
            let px = if mask.masked(x, y) {
                reader.zero(x);
                mask.color()
            } else {
                palette[reader.read(x, y, br)? as usize]
            };
            let off = (y * xsize + x) * 4;
            rgba[off..off + 4].copy_from_slice(&px);
        }
    }

    Ok(Some(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcifbits::BitReader;

    fn encode_decode(rgba: &[u8], xsize: usize, ysize: usize, knobs: &GcifKnobs) -> Option<Vec<u8>> {
        let mask = MaskWriter::init(rgba, xsize, ysize, knobs);
        let writer = PaletteWriter::init(rgba, xsize, ysize, knobs, &mask);

        let mut bw = BitWriter::new();
        mask.write(&mut bw).unwrap();
        writer.write(&mask, &mut bw).unwrap();
        let (words, _) = bw.finalize();

        let mut br = BitReader::new(&words);
        let mask_r = MaskReader::read(xsize, ysize, &mut br).unwrap();
        read_palette(xsize, ysize, &mask_r, &mut br).unwrap()
    }

    #[test]
    fn single_red_pixel_uses_palette_mode() {
        let rgba = [0xFFu8, 0, 0, 0xFF];
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 1, 1, &knobs);
        let writer = PaletteWriter::init(&rgba, 1, 1, &knobs, &mask);
        assert!(writer.enabled());
        assert_eq!(writer.palette_size(), 1);
        assert_eq!(writer.masked_palette(), 0);

        let decoded = encode_decode(&rgba, 1, 1, &knobs).expect("palette path");
        assert_eq!(decoded, rgba);
    }

    #[test]
    fn checkerboard_roundtrips_with_two_colors() {
        let a = [10u8, 200, 30, 255];
        let b = [200u8, 10, 250, 255];
        let mut rgba = Vec::new();
        for y in 0..64 {
            for x in 0..64 {
                rgba.extend_from_slice(if (x + y) % 2 == 0 { &a } else { &b });
            }
        }
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 64, 64, &knobs);
        let writer = PaletteWriter::init(&rgba, 64, 64, &knobs, &mask);
        assert!(writer.enabled());
        assert_eq!(writer.palette_size(), 2);

        let decoded = encode_decode(&rgba, 64, 64, &knobs).expect("palette path");
        assert_eq!(decoded, rgba);
    }

    #[test]
    fn wide_palette_takes_the_entropy_format() {
        // 64 distinct colors, above the default literal threshold.
        let mut rgba = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                rgba.extend_from_slice(&[(x * 32) as u8, (y * 32) as u8, 77, 255]);
            }
        }
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 8, 8, &knobs);
        let writer = PaletteWriter::init(&rgba, 8, 8, &knobs, &mask);
        assert!(writer.enabled());
        assert_eq!(writer.palette_size(), 64);

        let decoded = encode_decode(&rgba, 8, 8, &knobs).expect("palette path");
        assert_eq!(decoded, rgba);
    }

    #[test]
    fn too_many_colors_disable_the_palette() {
        let mut rgba = Vec::new();
        for i in 0..512u32 {
            rgba.extend_from_slice(&[(i & 0xFF) as u8, (i >> 8) as u8, 3, 255]);
        }
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 32, 16, &knobs);
        let writer = PaletteWriter::init(&rgba, 32, 16, &knobs, &mask);
        assert!(!writer.enabled());
    }

    #[test]
    fn fully_masked_image_disables_the_palette() {
        let rgba = vec![0u8; 16 * 16 * 4];
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 16, 16, &knobs);
        assert!(mask.enabled());
        let writer = PaletteWriter::init(&rgba, 16, 16, &knobs, &mask);
        assert!(!writer.enabled());
    }
}
