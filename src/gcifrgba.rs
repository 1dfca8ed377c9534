//! Filtered-residual RGBA writer.
//!
//! The raster is cut into tiles; each tile gets one spatial filter and one
//! color filter. Filter selection runs in stages: a score tournament picks
//! which spatial filters are worth carrying, an entropy tournament assigns
//! the per-tile pair (with a bounded revisit loop, since the estimate
//! depends on the evolving histogram), and the final residual matrix is
//! entropy coded under chaos contexts.

use log::{debug, info};
use ndarray::Array2;

use crate::gcifbits::BitWriter;
use crate::gcifchaos::{RgbaChaos, MAX_CHAOS_LEVELS};
use crate::gcifentropy::{EntropyEncoder, EntropyEstimator, ENCODER_ZRLE_SYMS};
use crate::gciffilter::{
    fetch_neighbors, residual_score, FilterScorer, CF_COUNT, CF_FORWARD, MAX_FILTERS, SF_COUNT,
    SF_FILTERS, SF_FIXED,
};
use crate::gciflz::LzMatchFinder;
use crate::gcifmask::MaskWriter;
use crate::gcifmono::{MonoParams, MonoWriter};
use crate::gcifstructs::{GcifKnobs, MAX_DIM};
use crate::GcifError;

/// Tile edge is `1 << TILE_BITS` pixels.
pub const TILE_BITS: u32 = 2;

/// Tile marker: every covered pixel is masked.
pub const MASK_TILE: u8 = 255;

/// Tile marker: filter pair not assigned yet.
pub const TODO_TILE: u8 = 254;

/// Upper bound on tile-design passes; pass 0 visits everything, later
/// passes revisit up to the configured budget.
pub const MAX_PASSES: usize = 4;

/// Per-rank award weights for the spatial filter tournament.
const AWARDS: [i64; 4] = [5, 3, 1, 1];

/// Writer-side pipeline state for the filtered RGBA body.
pub struct RgbaWriter<'a> {
    knobs: &'a GcifKnobs,
    rgba: &'a [u8],
    xsize: usize,
    ysize: usize,
    mask: &'a MaskWriter,
    lz: &'a LzMatchFinder,

    tile_bits_x: u32,
    tile_size_x: usize,
    tile_size_y: usize,
    tiles_x: usize,
    tiles_y: usize,

    /// Per-tile spatial filter slot (index into `sf_indices`), or a marker.
    sf_tiles: Array2<u8>,
    /// Per-tile color filter index, or a marker.
    cf_tiles: Array2<u8>,
    /// Catalog index of each selected spatial filter slot.
    sf_indices: Vec<u8>,

    residuals: Vec<u8>,
    chaos: RgbaChaos,

    y_encoders: Vec<EntropyEncoder>,
    u_encoders: Vec<EntropyEncoder>,
    v_encoders: Vec<EntropyEncoder>,
    sf_encoder: Option<MonoWriter>,
    cf_encoder: Option<MonoWriter>,
    a_encoder: Option<MonoWriter>,
}

impl<'a> RgbaWriter<'a> {
    #[inline]
    fn is_masked(&self, x: usize, y: usize) -> bool {
        self.mask.masked(x, y) || self.lz.visited(x, y)
    }

    #[inline]
    fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let off = (y * self.xsize + x) * 4;
        [self.rgba[off], self.rgba[off + 1], self.rgba[off + 2]]
    }

    /// Run every unmasked pixel of tile (tx, ty) through `f` in raster
    /// order.
    fn for_tile_pixels(&self, tx: usize, ty: usize, mut f: impl FnMut(usize, usize)) {
        let x0 = tx * self.tile_size_x;
        let y0 = ty * self.tile_size_y;
        let x1 = (x0 + self.tile_size_x).min(self.xsize);
        let y1 = (y0 + self.tile_size_y).min(self.ysize);
        for y in y0..y1 {
            for x in x0..x1 {
                if !self.is_masked(x, y) {
                    f(x, y);
                }
            }
        }
    }

    fn mask_tiles(&mut self) {
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let mut live = false;
                self.for_tile_pixels(tx, ty, |_, _| live = true);
                let marker = if live { TODO_TILE } else { MASK_TILE };
                self.sf_tiles[(ty, tx)] = marker;
                self.cf_tiles[(ty, tx)] = marker;
            }
        }
    }

    /// Score the whole catalog per tile and keep the filters whose awards
    /// cover the tile grid, on top of the always-present fixed set.
    fn design_filters(&mut self) {
        info!("rgba: designing spatial filters");
        let mut scores = FilterScorer::new(SF_COUNT);
        let mut awards = FilterScorer::new(SF_COUNT);

        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                if self.sf_tiles[(ty, tx)] == MASK_TILE {
                    continue;
                }
                scores.reset();
                self.for_tile_pixels(tx, ty, |x, y| {
                    let n = fetch_neighbors(self.rgba, x, y, self.xsize);
                    let rgb = self.rgb_at(x, y);
                    for f in 0..SF_COUNT {
                        let pred = SF_FILTERS[f](&n);
                        let mut score = 0i64;
                        for c in 0..3 {
                            score += residual_score(rgb[c].wrapping_sub(pred[c])) as i64;
                        }
                        scores.add(f, score);
                    }
                });
                // Lowest penalty wins; rank awards 5/3/1/1.
                let best = scores.get_low(AWARDS.len());
                for (rank, entry) in best.iter().enumerate() {
                    awards.add(entry.index, AWARDS[rank]);
                }
            }
        }

        self.sf_indices.clear();
        for f in 0..SF_FIXED {
            self.sf_indices.push(f as u8);
        }

        let coverage_thresh = (self.tiles_x * self.tiles_y) as i64;
        let mut coverage = 0i64;
        for entry in awards.get_top(MAX_FILTERS - SF_FIXED) {
            if entry.score <= 0 || self.sf_indices.len() >= MAX_FILTERS {
                break;
            }
            coverage += entry.score / AWARDS[0];
            if entry.index >= SF_FIXED {
                self.sf_indices.push(entry.index as u8);
            }
            if coverage >= coverage_thresh {
                break;
            }
        }
        debug!(
            "rgba: {} spatial filters selected, coverage {}/{}",
            self.sf_indices.len(),
            coverage,
            coverage_thresh
        );
    }

    /// YUV code streams of one tile under a candidate filter pair.
    fn tile_codes(
        &self,
        tx: usize,
        ty: usize,
        sf_slot: usize,
        cf: usize,
        codes: &mut [Vec<u8>; 3],
    ) {
        for ch in codes.iter_mut() {
            ch.clear();
        }
        let filter = SF_FILTERS[self.sf_indices[sf_slot] as usize];
        self.for_tile_pixels(tx, ty, |x, y| {
            let n = fetch_neighbors(self.rgba, x, y, self.xsize);
            let pred = filter(&n);
            let rgb = self.rgb_at(x, y);
            let residual = [
                rgb[0].wrapping_sub(pred[0]),
                rgb[1].wrapping_sub(pred[1]),
                rgb[2].wrapping_sub(pred[2]),
            ];
            let yuv = CF_FORWARD[cf](residual);
            codes[0].push(yuv[0]);
            codes[1].push(yuv[1]);
            codes[2].push(yuv[2]);
        });
    }

    /// Spatial filter slots worth evaluating for one tile, cheapest
    /// residual score first, bounded by the selection fuzz.
    fn tile_candidates(&self, tx: usize, ty: usize) -> Vec<usize> {
        let slots = self.sf_indices.len();
        let fuzz = self.knobs.cm_filter_select_fuzz as usize;
        if fuzz >= slots {
            return (0..slots).collect();
        }
        let mut scorer = FilterScorer::new(slots);
        self.for_tile_pixels(tx, ty, |x, y| {
            let n = fetch_neighbors(self.rgba, x, y, self.xsize);
            let rgb = self.rgb_at(x, y);
            for (slot, &f) in self.sf_indices.iter().enumerate() {
                let pred = SF_FILTERS[f as usize](&n);
                let mut score = 0i64;
                for c in 0..3 {
                    score += residual_score(rgb[c].wrapping_sub(pred[c])) as i64;
                }
                scorer.add(slot, score);
            }
        });
        scorer.get_low(fuzz).into_iter().map(|s| s.index).collect()
    }

    /// Assign a (spatial, color) filter pair per tile by minimum entropy
    /// after substitution. Later passes subtract a tile's previous
    /// contribution before re-selecting, until the revisit budget runs out.
    fn design_tiles(&mut self) {
        info!(
            "rgba: designing tiles for {}x{} grid",
            self.tiles_x, self.tiles_y
        );

        let mut ee = [
            EntropyEstimator::new(),
            EntropyEstimator::new(),
            EntropyEstimator::new(),
        ];
        let mut codes: [Vec<u8>; 3] = Default::default();
        let mut best_codes: [Vec<u8>; 3] = Default::default();
        let mut revisit = self.knobs.cm_revisit_count as i64;

        for pass in 0..MAX_PASSES {
            for ty in 0..self.tiles_y {
                for tx in 0..self.tiles_x {
                    if self.sf_tiles[(ty, tx)] == MASK_TILE {
                        continue;
                    }

                    if pass > 0 {
                        if revisit <= 0 {
                            return;
                        }
                        revisit -= 1;
                        let osf = self.sf_tiles[(ty, tx)] as usize;
                        let ocf = self.cf_tiles[(ty, tx)] as usize;
                        self.tile_codes(tx, ty, osf, ocf, &mut codes);
                        for c in 0..3 {
                            ee[c].subtract(&codes[c]);
                        }
                    }

                    let mut lowest = u32::MAX;
                    let (mut best_sf, mut best_cf) = (0usize, 0usize);
                    for &sf_slot in &self.tile_candidates(tx, ty) {
                        for cf in 0..CF_COUNT {
                            self.tile_codes(tx, ty, sf_slot, cf, &mut codes);
                            let entropy = ee[0].entropy(&codes[0])
                                + ee[1].entropy(&codes[1])
                                + ee[2].entropy(&codes[2]);
                            if entropy < lowest {
                                lowest = entropy;
                                best_sf = sf_slot;
                                best_cf = cf;
                                for c in 0..3 {
                                    std::mem::swap(&mut best_codes[c], &mut codes[c]);
                                }
                            }
                        }
                    }

                    self.sf_tiles[(ty, tx)] = best_sf as u8;
                    self.cf_tiles[(ty, tx)] = best_cf as u8;
                    for c in 0..3 {
                        ee[c].add(&best_codes[c]);
                    }
                }
            }
            debug!("rgba: tile pass {} done, revisit budget {}", pass, revisit);
        }
    }

    /// Single-pass selection by raw residual score, used when entropy
    /// estimation is disabled.
    fn design_tiles_fast(&mut self) {
        info!("rgba: designing tiles by residual score");
        let mut codes: [Vec<u8>; 3] = Default::default();
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                if self.sf_tiles[(ty, tx)] == MASK_TILE {
                    continue;
                }
                let mut lowest = u64::MAX;
                let (mut best_sf, mut best_cf) = (0usize, 0usize);
                for sf_slot in 0..self.sf_indices.len() {
                    for cf in 0..CF_COUNT {
                        self.tile_codes(tx, ty, sf_slot, cf, &mut codes);
                        let mut score = 0u64;
                        for c in 0..3 {
                            for &b in &codes[c] {
                                score += residual_score(b) as u64;
                            }
                        }
                        if score < lowest {
                            lowest = score;
                            best_sf = sf_slot;
                            best_cf = cf;
                        }
                    }
                }
                self.sf_tiles[(ty, tx)] = best_sf as u8;
                self.cf_tiles[(ty, tx)] = best_cf as u8;
            }
        }
    }

    fn compute_residuals(&mut self) -> Result<(), GcifError> {
        self.residuals = vec![0u8; self.xsize * self.ysize * 4];
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let sf_slot = self.sf_tiles[(ty, tx)];
                if sf_slot == MASK_TILE {
                    continue;
                }
                if sf_slot == TODO_TILE {
                    return Err(GcifError::InternalState("tile left undesigned"));
                }
                let cf = self.cf_tiles[(ty, tx)] as usize;
                let filter = SF_FILTERS[self.sf_indices[sf_slot as usize] as usize];
                let xsize = self.xsize;
                let rgba = self.rgba;
                let residuals = &mut self.residuals;

                let x0 = tx * self.tile_size_x;
                let y0 = ty * self.tile_size_y;
                let x1 = (x0 + self.tile_size_x).min(self.xsize);
                let y1 = (y0 + self.tile_size_y).min(self.ysize);
                for y in y0..y1 {
                    for x in x0..x1 {
                        if self.mask.masked(x, y) || self.lz.visited(x, y) {
                            continue;
                        }
                        let n = fetch_neighbors(rgba, x, y, xsize);
                        let pred = filter(&n);
                        let off = (y * xsize + x) * 4;
                        let residual = [
                            rgba[off].wrapping_sub(pred[0]),
                            rgba[off + 1].wrapping_sub(pred[1]),
                            rgba[off + 2].wrapping_sub(pred[2]),
                        ];
                        let yuv = CF_FORWARD[cf](residual);
                        residuals[off] = yuv[0];
                        residuals[off + 1] = yuv[1];
                        residuals[off + 2] = yuv[2];
                    }
                }
            }
        }
        Ok(())
    }

    fn compress_alpha(&mut self) -> Result<(), GcifError> {
        info!("rgba: compressing alpha plane");
        let alpha = Array2::from_shape_fn((self.ysize, self.xsize), |(y, x)| {
            self.rgba[(y * self.xsize + x) * 4 + 3]
        });
        let mask = self.mask;
        let lz = self.lz;
        let masked = move |x: usize, y: usize| mask.masked(x, y) || lz.visited(x, y);
        let mut params = MonoParams::standard(alpha, 256);
        params.mask = Some(&masked);
        self.a_encoder = Some(MonoWriter::init(params)?);
        Ok(())
    }

    /// Sweep the candidate chaos levels over the residual stream and keep
    /// the one whose entropy plus table cost is lowest.
    fn design_chaos(&mut self) {
        let mut best_entropy = u64::MAX;
        let mut best_levels = 1usize;

        for levels in 1..MAX_CHAOS_LEVELS {
            let mut chaos = RgbaChaos::new(levels, self.xsize);
            let mut ee: Vec<[EntropyEstimator; 3]> = (0..levels)
                .map(|_| {
                    [
                        EntropyEstimator::new(),
                        EntropyEstimator::new(),
                        EntropyEstimator::new(),
                    ]
                })
                .collect();

            chaos.start();
            for y in 0..self.ysize {
                chaos.start_row();
                for x in 0..self.xsize {
                    if self.is_masked(x, y) {
                        chaos.zero();
                        continue;
                    }
                    let off = (y * self.xsize + x) * 4;
                    let res = &self.residuals[off..off + 3];
                    for c in 0..3 {
                        let bin = chaos.chaos(c) as usize;
                        ee[bin][c].add_single(res[c]);
                    }
                    chaos.store(res[0], res[1], res[2], 0);
                }
            }

            let mut entropy = 0u64;
            for bins in &ee {
                for est in bins {
                    entropy += est.entropy_overall() as u64;
                }
                // Approximate cost of carrying one more table level.
                entropy += 3 * 5 * 256u64;
            }

            if entropy < best_entropy {
                best_entropy = entropy;
                best_levels = levels;
            }
        }

        info!("rgba: {} chaos levels", best_levels);
        self.chaos = RgbaChaos::new(best_levels, self.xsize);
    }

    fn compress_filter_grid(&self, grid: Array2<u8>, num_syms: usize) -> Result<MonoWriter, GcifError> {
        let tiles = &self.sf_tiles;
        let masked = move |x: usize, y: usize| tiles[(y, x)] == MASK_TILE;
        let mut params = MonoParams::standard(grid, num_syms);
        params.mask = Some(&masked);
        MonoWriter::init(params)
    }

    fn compress_sf(&mut self) -> Result<(), GcifError> {
        self.sf_encoder = Some(self.compress_filter_grid(self.sf_tiles.clone(), self.sf_indices.len())?);
        Ok(())
    }

    fn compress_cf(&mut self) -> Result<(), GcifError> {
        self.cf_encoder = Some(self.compress_filter_grid(self.cf_tiles.clone(), CF_COUNT)?);
        Ok(())
    }

    /// Replay the residual stream through the chaos state to train the
    /// per-bin channel encoders.
    fn initialize_encoders(&mut self) {
        let bins = self.chaos.bin_count();
        self.y_encoders = (0..bins)
            .map(|_| EntropyEncoder::new(256, ENCODER_ZRLE_SYMS))
            .collect();
        self.u_encoders = (0..bins)
            .map(|_| EntropyEncoder::new(256, ENCODER_ZRLE_SYMS))
            .collect();
        self.v_encoders = (0..bins)
            .map(|_| EntropyEncoder::new(256, ENCODER_ZRLE_SYMS))
            .collect();

        self.chaos.start();
        for y in 0..self.ysize {
            self.chaos.start_row();
            for x in 0..self.xsize {
                if self.is_masked(x, y) {
                    self.chaos.zero();
                    continue;
                }
                let off = (y * self.xsize + x) * 4;
                let res = [
                    self.residuals[off],
                    self.residuals[off + 1],
                    self.residuals[off + 2],
                ];
                self.y_encoders[self.chaos.chaos(0) as usize].add(res[0] as u16);
                self.u_encoders[self.chaos.chaos(1) as usize].add(res[1] as u16);
                self.v_encoders[self.chaos.chaos(2) as usize].add(res[2] as u16);
                self.chaos.store(res[0], res[1], res[2], 0);
            }
        }

        for enc in self
            .y_encoders
            .iter_mut()
            .chain(self.u_encoders.iter_mut())
            .chain(self.v_encoders.iter_mut())
        {
            enc.finalize();
        }
    }

    /// Build the full pipeline state for one image.
    pub fn init(
        rgba: &'a [u8],
        xsize: usize,
        ysize: usize,
        mask: &'a MaskWriter,
        lz: &'a LzMatchFinder,
        knobs: &'a GcifKnobs,
    ) -> Result<Self, GcifError> {
        if xsize == 0 || ysize == 0 || xsize > MAX_DIM || ysize > MAX_DIM {
            return Err(GcifError::BadDims);
        }
        if rgba.len() != xsize * ysize * 4 {
            return Err(GcifError::BadDims);
        }
        if !knobs.cm_disable_entropy && knobs.cm_filter_select_fuzz == 0 {
            return Err(GcifError::BadParams);
        }

        let tile_bits_x = TILE_BITS;
        let tile_size_x = 1usize << tile_bits_x;
        let tile_size_y = tile_size_x;
        let tiles_x = (xsize + tile_size_x - 1) >> tile_bits_x;
        let tiles_y = (ysize + tile_size_y - 1) >> tile_bits_x;

        let mut writer = Self {
            knobs,
            rgba,
            xsize,
            ysize,
            mask,
            lz,
            tile_bits_x,
            tile_size_x,
            tile_size_y,
            tiles_x,
            tiles_y,
            sf_tiles: Array2::from_elem((tiles_y, tiles_x), TODO_TILE),
            cf_tiles: Array2::from_elem((tiles_y, tiles_x), TODO_TILE),
            sf_indices: Vec::new(),
            residuals: Vec::new(),
            chaos: RgbaChaos::new(1, xsize),
            y_encoders: Vec::new(),
            u_encoders: Vec::new(),
            v_encoders: Vec::new(),
            sf_encoder: None,
            cf_encoder: None,
            a_encoder: None,
        };

        writer.mask_tiles();
        writer.design_filters();
        if writer.knobs.cm_disable_entropy {
            writer.design_tiles_fast();
        } else {
            writer.design_tiles();
        }
        writer.compute_residuals()?;
        writer.compress_alpha()?;
        writer.design_chaos();
        writer.compress_sf()?;
        writer.compress_cf()?;
        writer.initialize_encoders();

        Ok(writer)
    }

    /// Number of selected spatial filters, fixed set included.
    pub fn sf_count(&self) -> usize {
        self.sf_indices.len()
    }

    /// The designed per-tile spatial and color filter grids.
    pub fn tile_filters(&self) -> (&Array2<u8>, &Array2<u8>) {
        (&self.sf_tiles, &self.cf_tiles)
    }

    /// Chosen number of chaos context bins.
    pub fn chaos_levels(&self) -> usize {
        self.chaos.bin_count()
    }

    fn write_tables(&mut self, bw: &mut BitWriter) {
        bw.write_bits(self.tile_bits_x, 3);

        bw.write_bits((self.sf_indices.len() - SF_FIXED) as u32, 5);
        for &index in &self.sf_indices[SF_FIXED..] {
            bw.write_bits(index as u32, 7);
        }

        self.sf_encoder.as_ref().unwrap().write_tables(bw);
        self.cf_encoder.as_ref().unwrap().write_tables(bw);
        self.a_encoder.as_ref().unwrap().write_tables(bw);

        bw.write_bits(self.chaos.bin_count() as u32 - 1, 4);
        for bin in 0..self.chaos.bin_count() {
            self.y_encoders[bin].write_tables(bw);
            self.u_encoders[bin].write_tables(bw);
            self.v_encoders[bin].write_tables(bw);
        }
    }

    fn write_pixels(&mut self, bw: &mut BitWriter) {
        let tile_mask = self.tile_size_y - 1;
        let sf_encoder = self.sf_encoder.as_mut().unwrap();
        let cf_encoder = self.cf_encoder.as_mut().unwrap();
        let a_encoder = self.a_encoder.as_mut().unwrap();

        self.chaos.start();
        for y in 0..self.ysize {
            self.chaos.start_row();
            a_encoder.write_row_header(y, bw);

            if y & tile_mask == 0 {
                let ty = y >> self.tile_bits_x;
                sf_encoder.write_row_header(ty, bw);
                cf_encoder.write_row_header(ty, bw);
                for tx in 0..self.tiles_x {
                    if self.sf_tiles[(ty, tx)] == MASK_TILE {
                        sf_encoder.zero(tx);
                        cf_encoder.zero(tx);
                    } else {
                        sf_encoder.write(tx, ty, bw);
                        cf_encoder.write(tx, ty, bw);
                    }
                }
            }

            for x in 0..self.xsize {
                if self.mask.masked(x, y) || self.lz.visited(x, y) {
                    self.chaos.zero();
                    a_encoder.zero(x);
                    continue;
                }
                let off = (y * self.xsize + x) * 4;
                let res = [
                    self.residuals[off],
                    self.residuals[off + 1],
                    self.residuals[off + 2],
                ];
                self.y_encoders[self.chaos.chaos(0) as usize].write(res[0] as u16, bw);
                self.u_encoders[self.chaos.chaos(1) as usize].write(res[1] as u16, bw);
                self.v_encoders[self.chaos.chaos(2) as usize].write(res[2] as u16, bw);
                self.chaos.store(res[0], res[1], res[2], 0);
                a_encoder.write(x, y, bw);
            }
        }
    }

    /// Emit tables then pixel data.
    pub fn write(&mut self, bw: &mut BitWriter) {
        info!("rgba: writing encoded pixel data");
        self.write_tables(bw);
        self.write_pixels(bw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcifstructs::GcifKnobs;

    fn writer_for<'a>(
        rgba: &'a [u8],
        xsize: usize,
        ysize: usize,
        mask: &'a MaskWriter,
        lz: &'a LzMatchFinder,
        knobs: &'a GcifKnobs,
    ) -> RgbaWriter<'a> {
        RgbaWriter::init(rgba, xsize, ysize, mask, lz, knobs).unwrap()
    }

    #[test]
    fn gradient_tiles_agree_on_one_filter_pair() {
        let mut rgba = Vec::new();
        for _y in 0..8 {
            for x in 0..8u32 {
                rgba.extend_from_slice(&[(x * 32) as u8, 0, 0, 255]);
            }
        }
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 8, 8, &knobs);
        let lz = LzMatchFinder::new(8, 8);
        let writer = writer_for(&rgba, 8, 8, &mask, &lz, &knobs);

        let (sf, cf) = writer.tile_filters();
        let first = (sf[(0, 0)], cf[(0, 0)]);
        for ty in 0..2 {
            for tx in 0..2 {
                assert_eq!((sf[(ty, tx)], cf[(ty, tx)]), first);
            }
        }

        // The shared predictor reproduces the gradient exactly away from
        // the top and left edges, so interior residuals vanish on every
        // channel.
        for y in 1..8 {
            for x in 1..8 {
                let off = (y * 8 + x) * 4;
                assert_eq!(&writer.residuals[off..off + 3], &[0, 0, 0]);
            }
        }
    }

    #[test]
    fn fully_masked_image_marks_every_tile() {
        let rgba = vec![0u8; 16 * 16 * 4];
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 16, 16, &knobs);
        assert!(mask.enabled());
        let lz = LzMatchFinder::new(16, 16);
        let writer = writer_for(&rgba, 16, 16, &mask, &lz, &knobs);

        let (sf, cf) = writer.tile_filters();
        for ty in 0..4 {
            for tx in 0..4 {
                assert_eq!(sf[(ty, tx)], MASK_TILE);
                assert_eq!(cf[(ty, tx)], MASK_TILE);
            }
        }
        assert_eq!(writer.sf_count(), SF_FIXED);
    }

    #[test]
    fn filter_selection_covers_the_grid_or_exhausts_awards() {
        let mut rgba = Vec::new();
        for y in 0..32u32 {
            for x in 0..32u32 {
                let v = ((x * 7) ^ (y * 13)) as u8;
                rgba.extend_from_slice(&[v, v.wrapping_mul(3), v.wrapping_add(9), 255]);
            }
        }
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&rgba, 32, 32, &knobs);
        let lz = LzMatchFinder::new(32, 32);
        let writer = writer_for(&rgba, 32, 32, &mask, &lz, &knobs);

        assert!(writer.sf_count() >= SF_FIXED);
        assert!(writer.sf_count() <= SF_COUNT);
        // 64 unmasked tiles award 10 points each; the top picks must
        // either reach grid coverage or include every scoring filter.
        assert!(writer.chaos_levels() >= 1);
    }

    #[test]
    fn bad_dimensions_are_rejected() {
        let knobs = GcifKnobs::default();
        let mask = MaskWriter::init(&[], 0, 0, &knobs);
        let lz = LzMatchFinder::new(0, 0);
        assert!(matches!(
            RgbaWriter::init(&[], 0, 0, &mask, &lz, &knobs),
            Err(GcifError::BadDims)
        ));
    }

    #[test]
    fn zero_fuzz_with_entropy_enabled_is_rejected() {
        let rgba = vec![1u8; 4];
        let mut knobs = GcifKnobs::default();
        knobs.cm_filter_select_fuzz = 0;
        let mask = MaskWriter::init(&rgba, 1, 1, &knobs);
        let lz = LzMatchFinder::new(1, 1);
        assert!(matches!(
            RgbaWriter::init(&rgba, 1, 1, &mask, &lz, &knobs),
            Err(GcifError::BadParams)
        ));
    }
}
