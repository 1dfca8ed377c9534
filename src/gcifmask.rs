//! Transparency mask coder.
//!
//! Detects the dominant fully-transparent color and codes the pixels that
//! carry it as a bitmask, so the residual coder spends no bits on them.
//! Both sides expose the same `masked(x, y)` predicate and the mask color
//! used to reconstruct those pixels.

use bitvec::order::Msb0;
use bitvec::vec::BitVec;
use log::info;
use ndarray::Array2;
use rustc_hash::FxHashMap;

use crate::gcifbits::{BitReader, BitWriter};
use crate::gcifmono::{MonoParams, MonoReader, MonoWriter};
use crate::gcifstructs::GcifKnobs;
use crate::GcifError;

/// Writer-side transparency mask.
pub struct MaskWriter {
    xsize: usize,
    ysize: usize,
    enabled: bool,
    color: [u8; 4],
    plane: BitVec<u8, Msb0>,
}

impl MaskWriter {
    /// Scan the raster for the most common fully-transparent color and
    /// build the mask plane when it covers enough of the image.
    pub fn init(rgba: &[u8], xsize: usize, ysize: usize, knobs: &GcifKnobs) -> Self {
        let total = xsize * ysize;
        let mut counts: FxHashMap<[u8; 4], u64> = FxHashMap::default();
        for px in rgba.chunks_exact(4) {
            if px[3] == 0 {
                *counts.entry([px[0], px[1], px[2], px[3]]).or_insert(0) += 1;
            }
        }

        let mut color = [0u8; 4];
        let mut best = 0u64;
        for (&c, &n) in counts.iter() {
            if n > best || (n == best && best > 0 && c < color) {
                best = n;
                color = c;
            }
        }

        let enabled = best > 0 && best as f64 >= knobs.mask_min_ratio * total as f64;

        let mut plane = BitVec::<u8, Msb0>::repeat(false, total);
        if enabled {
            for (i, px) in rgba.chunks_exact(4).enumerate() {
                if px == color.as_slice() {
                    plane.set(i, true);
                }
            }
            info!(
                "mask: color {:02x}{:02x}{:02x}{:02x} covers {} of {} pixels",
                color[0], color[1], color[2], color[3], best, total
            );
        }

        Self {
            xsize,
            ysize,
            enabled,
            color,
            plane,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn color(&self) -> [u8; 4] {
        self.color
    }

    #[inline]
    pub fn masked(&self, x: usize, y: usize) -> bool {
        self.enabled && self.plane[y * self.xsize + x]
    }

    /// Emit the mask sub-stream: an enabled bit, then the color and the
    /// mono-coded plane.
    pub fn write(&self, bw: &mut BitWriter) -> Result<(), GcifError> {
        if !self.enabled {
            bw.write_bit(0);
            return Ok(());
        }
        bw.write_bit(1);
        bw.write_bits(
            ((self.color[0] as u32) << 8) | self.color[1] as u32,
            16,
        );
        bw.write_bits(
            ((self.color[2] as u32) << 8) | self.color[3] as u32,
            16,
        );

        let data = Array2::from_shape_fn((self.ysize, self.xsize), |(y, x)| {
            self.plane[y * self.xsize + x] as u8
        });
        let mut writer = MonoWriter::init(MonoParams::standard(data, 2))?;
        writer.write_tables(bw);
        for y in 0..self.ysize {
            writer.write_row_header(y, bw);
            for x in 0..self.xsize {
                writer.write(x, y, bw);
            }
        }
        Ok(())
    }
}

/// Reader-side transparency mask.
pub struct MaskReader {
    xsize: usize,
    enabled: bool,
    color: [u8; 4],
    plane: BitVec<u8, Msb0>,
}

impl MaskReader {
    pub fn read(xsize: usize, ysize: usize, br: &mut BitReader) -> Result<Self, GcifError> {
        let enabled = br.read_bit() == 1;
        let mut color = [0u8; 4];
        let mut plane = BitVec::<u8, Msb0>::repeat(false, xsize * ysize);

        if enabled {
            let hi = br.read_bits(16);
            let lo = br.read_bits(16);
            color = [(hi >> 8) as u8, hi as u8, (lo >> 8) as u8, lo as u8];

            let mut reader = MonoReader::read_tables(2, br)?;
            for y in 0..ysize {
                reader.read_row_header(y);
                for x in 0..xsize {
                    if reader.read(x, y, br)? != 0 {
                        plane.set(y * xsize + x, true);
                    }
                }
            }
        }

        Ok(Self {
            xsize,
            enabled,
            color,
            plane,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn color(&self) -> [u8; 4] {
        self.color
    }

    #[inline]
    pub fn masked(&self, x: usize, y: usize) -> bool {
        self.enabled && self.plane[y * self.xsize + x]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcifbits::BitReader;

    fn rgba_of(colors: &[[u8; 4]]) -> Vec<u8> {
        colors.iter().flatten().copied().collect()
    }

    #[test]
    fn dominant_transparent_color_roundtrips() {
        let clear = [0u8, 0, 0, 0];
        let red = [255u8, 0, 0, 255];
        let mut pixels = Vec::new();
        for i in 0..64 {
            pixels.push(if i % 2 == 0 { clear } else { red });
        }
        let rgba = rgba_of(&pixels);
        let writer = MaskWriter::init(&rgba, 8, 8, &GcifKnobs::default());
        assert!(writer.enabled());
        assert_eq!(writer.color(), clear);
        assert!(writer.masked(0, 0));
        assert!(!writer.masked(1, 0));

        let mut bw = BitWriter::new();
        writer.write(&mut bw).unwrap();
        let (words, _) = bw.finalize();

        let mut br = BitReader::new(&words);
        let reader = MaskReader::read(8, 8, &mut br).unwrap();
        assert!(reader.enabled());
        assert_eq!(reader.color(), clear);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(reader.masked(x, y), writer.masked(x, y));
            }
        }
    }

    #[test]
    fn opaque_image_disables_the_mask() {
        let rgba = rgba_of(&[[10, 20, 30, 255]; 16]);
        let writer = MaskWriter::init(&rgba, 4, 4, &GcifKnobs::default());
        assert!(!writer.enabled());

        let mut bw = BitWriter::new();
        writer.write(&mut bw).unwrap();
        let (words, _) = bw.finalize();
        let mut br = BitReader::new(&words);
        let reader = MaskReader::read(4, 4, &mut br).unwrap();
        assert!(!reader.enabled());
        assert!(!reader.masked(3, 3));
    }

    #[test]
    fn sparse_transparency_stays_below_the_ratio() {
        let mut pixels = vec![[9u8, 9, 9, 255]; 100];
        pixels[5] = [0, 0, 0, 0];
        let rgba = rgba_of(&pixels);
        let writer = MaskWriter::init(&rgba, 10, 10, &GcifKnobs::default());
        assert!(!writer.enabled());
    }
}
