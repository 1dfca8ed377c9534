//! Monochrome-matrix sub-coder.
//!
//! Compresses a small u8 matrix (filter-tile grids, the alpha plane, the
//! palette index image, the transparency bitmask) with left-delta
//! prediction and the shared entropy coder. The caller drives emission
//! cell by cell so masked cells can be skipped symmetrically on both
//! sides: every cell gets exactly one `write`/`read` or `zero` per row
//! pass, in row-major order.

use ndarray::Array2;

use crate::gcifbits::{BitReader, BitWriter};
use crate::gcifentropy::{EntropyDecoder, EntropyEncoder};
use crate::GcifError;

/// Configuration for one monochrome coder instance.
///
/// The award and threshold fields parameterize grid-filter selection in a
/// richer sub-coder; this implementation codes the plain delta stream and
/// carries them so call sites stay stable.
pub struct MonoParams<'a> {
    pub data: Array2<u8>,
    pub num_syms: usize,
    pub min_bits: u32,
    pub max_bits: u32,
    pub awards: [i64; 4],
    pub sympal_thresh: f64,
    pub filter_thresh: f64,
    pub lz_enable: bool,
    pub mask: Option<&'a dyn Fn(usize, usize) -> bool>,
}

impl<'a> MonoParams<'a> {
    /// The standard parameter block shared by the RGBA and palette
    /// writers.
    pub fn standard(data: Array2<u8>, num_syms: usize) -> Self {
        Self {
            data,
            num_syms,
            min_bits: 2,
            max_bits: 5,
            awards: [5, 3, 1, 1],
            sympal_thresh: 0.9,
            filter_thresh: 0.9,
            lz_enable: false,
            mask: None,
        }
    }

    #[inline]
    fn masked(&self, x: usize, y: usize) -> bool {
        match self.mask {
            Some(mask) => mask(x, y),
            None => false,
        }
    }
}

#[inline]
fn delta_sym(v: u8, left: u8, num_syms: usize) -> u16 {
    ((v as usize + num_syms - left as usize) % num_syms) as u16
}

/// Writer half of the monochrome coder. Owns its matrix so the callers
/// can hold several coders without tying lifetimes together.
pub struct MonoWriter {
    data: Array2<u8>,
    num_syms: usize,
    encoder: EntropyEncoder,
    left: u8,
}

impl MonoWriter {
    /// Train the entropy coder over the unmasked cells. The training walk
    /// replays exactly the call sequence the write pass will make.
    pub fn init(params: MonoParams<'_>) -> Result<Self, GcifError> {
        if params.num_syms == 0 || params.num_syms > 256 {
            return Err(GcifError::BadParams);
        }
        let (ysize, xsize) = params.data.dim();
        let mut encoder = EntropyEncoder::new(params.num_syms, 0);

        for y in 0..ysize {
            let mut left = 0u8;
            for x in 0..xsize {
                if params.masked(x, y) {
                    left = 0;
                } else {
                    let v = params.data[(y, x)];
                    debug_assert!((v as usize) < params.num_syms);
                    encoder.add(delta_sym(v, left, params.num_syms));
                    left = v;
                }
            }
        }
        encoder.finalize();

        let MonoParams { data, num_syms, .. } = params;
        Ok(Self {
            data,
            num_syms,
            encoder,
            left: 0,
        })
    }

    /// Emit the code tables. Returns bits written.
    pub fn write_tables(&self, bw: &mut BitWriter) -> usize {
        self.encoder.write_tables(bw)
    }

    /// Reset the row context. Returns bits written (none for this coder).
    pub fn write_row_header(&mut self, _y: usize, _bw: &mut BitWriter) -> usize {
        self.left = 0;
        0
    }

    /// Emit the cell at (x, y). Returns bits written.
    pub fn write(&mut self, x: usize, y: usize, bw: &mut BitWriter) -> usize {
        let v = self.data[(y, x)];
        let bits = self
            .encoder
            .write(delta_sym(v, self.left, self.num_syms), bw);
        self.left = v;
        bits
    }

    /// Advance the context past a masked cell without emitting.
    pub fn zero(&mut self, _x: usize) {
        self.left = 0;
    }
}

/// Reader half of the monochrome coder.
pub struct MonoReader {
    num_syms: usize,
    decoder: EntropyDecoder,
    left: u8,
}

impl MonoReader {
    pub fn read_tables(num_syms: usize, br: &mut BitReader) -> Result<Self, GcifError> {
        if num_syms == 0 || num_syms > 256 {
            return Err(GcifError::BadParams);
        }
        Ok(Self {
            num_syms,
            decoder: EntropyDecoder::read_tables(num_syms, 0, br),
            left: 0,
        })
    }

    pub fn read_row_header(&mut self, _y: usize) {
        self.left = 0;
    }

    pub fn read(&mut self, _x: usize, _y: usize, br: &mut BitReader) -> Result<u8, GcifError> {
        let sym = self.decoder.read(br)?;
        if sym as usize >= self.num_syms {
            return Err(GcifError::DataCorrupt);
        }
        let v = ((self.left as usize + sym as usize) % self.num_syms) as u8;
        self.left = v;
        Ok(v)
    }

    pub fn zero(&mut self, _x: usize) {
        self.left = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(xsize: usize, ysize: usize, f: impl Fn(usize, usize) -> u8) -> Array2<u8> {
        Array2::from_shape_fn((ysize, xsize), |(y, x)| f(x, y))
    }

    #[test]
    fn unmasked_grid_roundtrips() {
        let data = grid(13, 9, |x, y| ((x * 3 + y * 7) % 5) as u8);
        let writer_params = MonoParams::standard(data.clone(), 5);
        let mut writer = MonoWriter::init(writer_params).unwrap();

        let mut bw = BitWriter::new();
        writer.write_tables(&mut bw);
        for y in 0..9 {
            writer.write_row_header(y, &mut bw);
            for x in 0..13 {
                writer.write(x, y, &mut bw);
            }
        }
        let (words, _) = bw.finalize();

        let mut br = BitReader::new(&words);
        let mut reader = MonoReader::read_tables(5, &mut br).unwrap();
        for y in 0..9 {
            reader.read_row_header(y);
            for x in 0..13 {
                assert_eq!(reader.read(x, y, &mut br).unwrap(), data[(y, x)]);
            }
        }
    }

    #[test]
    fn masked_cells_are_skipped_symmetrically() {
        let data = grid(8, 8, |x, y| ((x ^ y) % 7) as u8);
        let mask = |x: usize, y: usize| (x + y) % 3 == 0;
        let mut params = MonoParams::standard(data.clone(), 7);
        params.mask = Some(&mask);
        let mut writer = MonoWriter::init(params).unwrap();

        let mut bw = BitWriter::new();
        writer.write_tables(&mut bw);
        for y in 0..8 {
            writer.write_row_header(y, &mut bw);
            for x in 0..8 {
                if mask(x, y) {
                    writer.zero(x);
                } else {
                    writer.write(x, y, &mut bw);
                }
            }
        }
        let (words, _) = bw.finalize();

        let mut br = BitReader::new(&words);
        let mut reader = MonoReader::read_tables(7, &mut br).unwrap();
        for y in 0..8 {
            reader.read_row_header(y);
            for x in 0..8 {
                if mask(x, y) {
                    reader.zero(x);
                } else {
                    assert_eq!(reader.read(x, y, &mut br).unwrap(), data[(y, x)]);
                }
            }
        }
    }

    #[test]
    fn single_symbol_grid_costs_one_bit_per_cell() {
        let data = grid(16, 4, |_, _| 0);
        let mut writer = MonoWriter::init(MonoParams::standard(data, 1)).unwrap();
        let mut bw = BitWriter::new();
        let table_bits = writer.write_tables(&mut bw);
        let mut cell_bits = 0;
        for y in 0..4 {
            writer.write_row_header(y, &mut bw);
            for x in 0..16 {
                cell_bits += writer.write(x, y, &mut bw);
            }
        }
        assert_eq!(table_bits, 5);
        assert_eq!(cell_bits, 64);
    }

    #[test]
    fn oversized_alphabet_is_rejected() {
        let data = grid(2, 2, |_, _| 0);
        assert!(matches!(
            MonoWriter::init(MonoParams::standard(data, 257)),
            Err(GcifError::BadParams)
        ));
    }
}
