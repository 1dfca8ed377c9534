//! Pixel-entropy ("chaos") context modeling.
//!
//! The context bin of a pixel is derived from the wrapped magnitudes of the
//! residuals directly left of and above it, so the decoder can recompute it
//! from data it has already produced. Bins are selected through a table
//! precomputed per chaos level.

use lazy_static::lazy_static;

/// Upper bound (exclusive on the design loop) for chaos levels.
pub const MAX_CHAOS_LEVELS: usize = 16;

const MAX_SUM: usize = 256;

#[inline]
fn chaos_score(r: u8) -> u16 {
    if r < 128 {
        r as u16
    } else {
        256 - r as u16
    }
}

#[inline]
fn bit_length(s: usize) -> usize {
    (usize::BITS - s.leading_zeros()) as usize
}

lazy_static! {
    /// `CHAOS_LUT[levels][sum]` maps a neighbor score sum to a bin in
    /// [0, levels). Row 0 is unused.
    static ref CHAOS_LUT: Vec<[u8; MAX_SUM + 1]> = {
        let mut luts = vec![[0u8; MAX_SUM + 1]; MAX_CHAOS_LEVELS + 1];
        for levels in 1..=MAX_CHAOS_LEVELS {
            for sum in 0..=MAX_SUM {
                let bin = bit_length(sum).min(levels - 1);
                luts[levels][sum] = bin as u8;
            }
        }
        luts
    };
}

/// Per-channel chaos state for a raster walked in row-major order.
///
/// Usage per pixel: read the bin with [`RgbaChaos::chaos`], then advance
/// with [`RgbaChaos::store`] (or [`RgbaChaos::zero`] for masked pixels).
pub struct RgbaChaos {
    levels: usize,
    row: Vec<[u16; 4]>,
    left: [u16; 4],
    x: usize,
}

impl RgbaChaos {
    pub fn new(levels: usize, xsize: usize) -> Self {
        debug_assert!(levels >= 1 && levels <= MAX_CHAOS_LEVELS);
        Self {
            levels,
            row: vec![[0; 4]; xsize],
            left: [0; 4],
            x: 0,
        }
    }

    /// Number of context bins.
    pub fn bin_count(&self) -> usize {
        self.levels
    }

    /// Clear all rows before walking an image.
    pub fn start(&mut self) {
        self.row.fill([0; 4]);
        self.left = [0; 4];
        self.x = 0;
    }

    /// Reset the left-neighbor state at the start of each row.
    pub fn start_row(&mut self) {
        self.left = [0; 4];
        self.x = 0;
    }

    /// Context bin for the current pixel on channel `ch`.
    #[inline]
    pub fn chaos(&self, ch: usize) -> u8 {
        let sum = (self.left[ch] + self.row[self.x][ch]) as usize;
        CHAOS_LUT[self.levels][sum]
    }

    /// Record the residuals of the current pixel and step right.
    #[inline]
    pub fn store(&mut self, y: u8, u: u8, v: u8, a: u8) {
        let scores = [
            chaos_score(y),
            chaos_score(u),
            chaos_score(v),
            chaos_score(a),
        ];
        self.left = scores;
        self.row[self.x] = scores;
        self.x += 1;
    }

    /// Record zeroes for a masked pixel and step right.
    #[inline]
    pub fn zero(&mut self) {
        self.left = [0; 4];
        self.row[self.x] = [0; 4];
        self.x += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_always_bins_to_zero() {
        let mut chaos = RgbaChaos::new(1, 8);
        chaos.start();
        chaos.start_row();
        for i in 0..8u8 {
            assert_eq!(chaos.chaos(0), 0);
            chaos.store(i.wrapping_mul(37), 0, 0, 0);
        }
    }

    #[test]
    fn bins_grow_with_neighbor_magnitude() {
        let mut chaos = RgbaChaos::new(8, 4);
        chaos.start();
        chaos.start_row();
        chaos.store(0, 0, 0, 0);
        let quiet = chaos.chaos(0);
        chaos.store(100, 0, 0, 0);
        let loud = chaos.chaos(0);
        assert!(loud > quiet);
        assert!((loud as usize) < 8);
    }

    #[test]
    fn two_walks_over_the_same_sequence_agree() {
        let residuals: Vec<(u8, u8, u8)> = (0..64u16)
            .map(|i| {
                let v = (i.wrapping_mul(2654) ^ (i << 3)) as u8;
                (v, v.wrapping_add(13), v.wrapping_mul(7))
            })
            .collect();

        let mut enc = RgbaChaos::new(6, 16);
        let mut dec = RgbaChaos::new(6, 16);
        enc.start();
        dec.start();
        for (row, chunk) in residuals.chunks(16).enumerate() {
            enc.start_row();
            dec.start_row();
            for (x, &(y, u, v)) in chunk.iter().enumerate() {
                let masked = (x + row) % 5 == 0;
                for ch in 0..3 {
                    assert_eq!(enc.chaos(ch), dec.chaos(ch));
                }
                if masked {
                    enc.zero();
                    dec.zero();
                } else {
                    enc.store(y, u, v, 0);
                    dec.store(y, u, v, 0);
                }
            }
        }
    }

    #[test]
    fn masked_pixels_zero_the_context() {
        let mut chaos = RgbaChaos::new(4, 2);
        chaos.start();
        chaos.start_row();
        chaos.store(200, 200, 200, 0);
        chaos.start_row();
        // The cell above carries the previous row's residual.
        assert_eq!(chaos.chaos(0), CHAOS_LUT[4][chaos_score(200) as usize]);
        chaos.zero();
        // A masked pixel wipes both its own cell and the left context.
        assert_eq!(chaos.chaos(0), 0);
    }
}
