//! 2D LZ over raw RGBA pixels.
//!
//! Repeated 8x8 pixel blocks are found with an image-wide hash table. The
//! prescan runs bottom-right to top-left so each bucket ends up holding the
//! earliest (upper-left) occurrence; the forward scan then verifies
//! candidates byte-for-byte and expands them up to 256 pixels per axis.
//! Accepted matches lock the zone blocks their destination fully covers,
//! and later candidates touching locked blocks or already-consumed source
//! blocks are rejected, which keeps every emitted pair of matches
//! source-disjoint.

use bitvec::order::Msb0;
use bitvec::vec::BitVec;
use log::debug;

use crate::gcifbits::{BitReader, BitWriter};
use crate::GcifError;

/// Match block granularity in pixels.
pub const ZONE: usize = 8;

/// Largest match extent per axis.
pub const MAX_MATCH_SIZE: usize = 256;

const HASH_BITS: u32 = 18;
const HASH_MULT: u64 = 0xc6a4_a793_5bd1_e995;
const TABLE_EMPTY: u32 = u32::MAX;
const MAX_MATCHES: usize = 65_535;

/// One rectangular copy of a previously seen region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LzMatch {
    pub src_x: u16,
    pub src_y: u16,
    pub dst_x: u16,
    pub dst_y: u16,
    pub w1: u8,
    pub h1: u8,
}

impl LzMatch {
    pub fn width(&self) -> usize {
        self.w1 as usize + 1
    }

    pub fn height(&self) -> usize {
        self.h1 as usize + 1
    }
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: usize,
    y: usize,
    w: usize,
    h: usize,
}

impl Rect {
    fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Hash of two horizontally adjacent pixels.
#[inline]
fn hash_pixels(p0: u32, p1: u32) -> u32 {
    let packed = ((p0 as u64) << 32) | p1 as u64;
    (packed.wrapping_mul(HASH_MULT) >> (64 - HASH_BITS)) as u32
}

#[inline]
fn pixel32(rgba: &[u8], x: usize, y: usize, xsize: usize) -> u32 {
    let off = (y * xsize + x) * 4;
    u32::from_le_bytes([rgba[off], rgba[off + 1], rgba[off + 2], rgba[off + 3]])
}

fn block_hash(rgba: &[u8], x: usize, y: usize, xsize: usize) -> usize {
    let mut h = 0u64;
    for r in 0..ZONE {
        for c in (0..ZONE).step_by(2) {
            let a = pixel32(rgba, x + c, y + r, xsize);
            let b = pixel32(rgba, x + c + 1, y + r, xsize);
            h = h.wrapping_mul(HASH_MULT) ^ hash_pixels(a, b) as u64;
        }
    }
    (h.wrapping_mul(HASH_MULT) >> (64 - HASH_BITS)) as usize
}

fn rows_equal(rgba: &[u8], xsize: usize, sx: usize, sy: usize, dx: usize, dy: usize, w: usize) -> bool {
    let s = (sy * xsize + sx) * 4;
    let d = (dy * xsize + dx) * 4;
    rgba[s..s + w * 4] == rgba[d..d + w * 4]
}

fn cols_equal(rgba: &[u8], xsize: usize, sx: usize, sy: usize, dx: usize, dy: usize, h: usize) -> bool {
    for r in 0..h {
        if pixel32(rgba, sx, sy + r, xsize) != pixel32(rgba, dx, dy + r, xsize) {
            return false;
        }
    }
    true
}

/// Encoder-side match finder.
pub struct LzMatchFinder {
    xsize: usize,
    ysize: usize,
    zones_x: usize,
    matches: Vec<LzMatch>,
    visited: BitVec<u8, Msb0>,
    locked: BitVec<u8, Msb0>,
    src_blocks: BitVec<u8, Msb0>,
}

impl LzMatchFinder {
    /// An empty finder; [`LzMatchFinder::scan`] fills it in.
    pub fn new(xsize: usize, ysize: usize) -> Self {
        let zones_x = (xsize + ZONE - 1) / ZONE;
        let zones_y = (ysize + ZONE - 1) / ZONE;
        Self {
            xsize,
            ysize,
            zones_x,
            matches: Vec::new(),
            visited: BitVec::repeat(false, xsize * ysize),
            locked: BitVec::repeat(false, zones_x * zones_y),
            src_blocks: BitVec::repeat(false, zones_x * zones_y),
        }
    }

    /// True when the residual coder must skip (x, y) because a match
    /// reproduces it.
    #[inline]
    pub fn visited(&self, x: usize, y: usize) -> bool {
        self.visited[y * self.xsize + x]
    }

    pub fn matches(&self) -> &[LzMatch] {
        &self.matches
    }

    /// Zone blocks intersecting `rect`, as indices into the lock planes.
    fn zones_touching(&self, rect: &Rect) -> impl Iterator<Item = usize> + '_ {
        let zx0 = rect.x / ZONE;
        let zx1 = (rect.x + rect.w - 1) / ZONE;
        let zy0 = rect.y / ZONE;
        let zy1 = (rect.y + rect.h - 1) / ZONE;
        let zones_x = self.zones_x;
        (zy0..=zy1).flat_map(move |zy| (zx0..=zx1).map(move |zx| zy * zones_x + zx))
    }

    /// Zone blocks lying entirely inside `rect`.
    fn zones_covered(&self, rect: &Rect) -> impl Iterator<Item = usize> + '_ {
        let zx0 = (rect.x + ZONE - 1) / ZONE;
        let zy0 = (rect.y + ZONE - 1) / ZONE;
        let zx1 = (rect.x + rect.w) / ZONE; // exclusive
        let zy1 = (rect.y + rect.h) / ZONE;
        let zones_x = self.zones_x;
        (zy0..zy1).flat_map(move |zy| (zx0..zx1).map(move |zx| zy * zones_x + zx))
    }

    fn collides(&self, src: &Rect, dst: &Rect) -> bool {
        self.zones_touching(src).any(|z| self.locked[z])
            || self.zones_touching(dst).any(|z| self.locked[z])
            || self.zones_covered(dst).any(|z| self.src_blocks[z])
    }

    fn expand(&self, rgba: &[u8], mut src: Rect, mut dst: Rect) -> (Rect, Rect) {
        let (xsize, ysize) = (self.xsize, self.ysize);

        // Left
        while src.w < MAX_MATCH_SIZE
            && src.x > 0
            && dst.x > 0
            && !(Rect { x: src.x - 1, w: src.w + 1, ..src })
                .intersects(&Rect { x: dst.x - 1, w: dst.w + 1, ..dst })
            && cols_equal(rgba, xsize, src.x - 1, src.y, dst.x - 1, dst.y, src.h)
        {
            src.x -= 1;
            dst.x -= 1;
            src.w += 1;
            dst.w += 1;
        }
        // Right
        while src.w < MAX_MATCH_SIZE
            && src.x + src.w < xsize
            && dst.x + dst.w < xsize
            && !(Rect { w: src.w + 1, ..src }).intersects(&Rect { w: dst.w + 1, ..dst })
            && cols_equal(rgba, xsize, src.x + src.w, src.y, dst.x + dst.w, dst.y, src.h)
        {
            src.w += 1;
            dst.w += 1;
        }
        // Up
        while src.h < MAX_MATCH_SIZE
            && src.y > 0
            && dst.y > 0
            && !(Rect { y: src.y - 1, h: src.h + 1, ..src })
                .intersects(&Rect { y: dst.y - 1, h: dst.h + 1, ..dst })
            && rows_equal(rgba, xsize, src.x, src.y - 1, dst.x, dst.y - 1, src.w)
        {
            src.y -= 1;
            dst.y -= 1;
            src.h += 1;
            dst.h += 1;
        }
        // Down
        while src.h < MAX_MATCH_SIZE
            && src.y + src.h < ysize
            && dst.y + dst.h < ysize
            && !(Rect { h: src.h + 1, ..src }).intersects(&Rect { h: dst.h + 1, ..dst })
            && rows_equal(rgba, xsize, src.x, src.y + src.h, dst.x, dst.y + dst.h, src.w)
        {
            src.h += 1;
            dst.h += 1;
        }

        (src, dst)
    }

    /// Run the two scans over the raster.
    pub fn scan(&mut self, rgba: &[u8]) {
        if self.xsize < ZONE || self.ysize < ZONE {
            return;
        }

        let mut table = vec![TABLE_EMPTY; 1 << HASH_BITS];
        for y in (0..=self.ysize - ZONE).rev() {
            for x in (0..=self.xsize - ZONE).rev() {
                table[block_hash(rgba, x, y, self.xsize)] = ((y as u32) << 16) | x as u32;
            }
        }

        for y in 0..=self.ysize - ZONE {
            for x in 0..=self.xsize - ZONE {
                if self.matches.len() >= MAX_MATCHES {
                    return;
                }
                let cand = table[block_hash(rgba, x, y, self.xsize)];
                if cand == TABLE_EMPTY {
                    continue;
                }
                let sx = (cand & 0xFFFF) as usize;
                let sy = (cand >> 16) as usize;
                if (sy, sx) >= (y, x) {
                    continue;
                }

                let src0 = Rect { x: sx, y: sy, w: ZONE, h: ZONE };
                let dst0 = Rect { x, y, w: ZONE, h: ZONE };
                if src0.intersects(&dst0) {
                    continue;
                }
                let mut verified = true;
                for r in 0..ZONE {
                    if !rows_equal(rgba, self.xsize, sx, sy + r, x, y + r, ZONE) {
                        verified = false;
                        break;
                    }
                }
                if !verified {
                    continue;
                }

                let (src, dst) = self.expand(rgba, src0, dst0);
                if self.collides(&src, &dst) {
                    continue;
                }

                for z in self.zones_covered(&dst).collect::<Vec<_>>() {
                    self.locked.set(z, true);
                }
                for z in self.zones_touching(&src).collect::<Vec<_>>() {
                    self.src_blocks.set(z, true);
                }
                for dy in dst.y..dst.y + dst.h {
                    for dx in dst.x..dst.x + dst.w {
                        self.visited.set(dy * self.xsize + dx, true);
                    }
                }

                self.matches.push(LzMatch {
                    src_x: src.x as u16,
                    src_y: src.y as u16,
                    dst_x: dst.x as u16,
                    dst_y: dst.y as u16,
                    w1: (dst.w - 1) as u8,
                    h1: (dst.h - 1) as u8,
                });
            }
        }

        debug!("lz: {} matches accepted", self.matches.len());
    }

    /// Emit the match sub-stream: a 16-bit count, then 80 bits per match.
    pub fn write(&self, bw: &mut BitWriter) {
        bw.write_bits(self.matches.len() as u32, 16);
        for m in &self.matches {
            bw.write_bits(m.src_x as u32, 16);
            bw.write_bits(m.src_y as u32, 16);
            bw.write_bits(m.dst_x as u32, 16);
            bw.write_bits(m.dst_y as u32, 16);
            bw.write_bits(m.w1 as u32, 8);
            bw.write_bits(m.h1 as u32, 8);
        }
    }
}

/// Decoder-side match state: which pixels a match reproduces and where
/// each one copies from.
pub struct LzReader {
    xsize: usize,
    owner: Vec<u32>,
    matches: Vec<LzMatch>,
}

impl LzReader {
    pub fn read(xsize: usize, ysize: usize, br: &mut BitReader) -> Result<Self, GcifError> {
        let count = br.read_bits(16) as usize;
        let mut matches = Vec::with_capacity(count);
        let mut owner = vec![0u32; xsize * ysize];

        for i in 0..count {
            let m = LzMatch {
                src_x: br.read_bits(16) as u16,
                src_y: br.read_bits(16) as u16,
                dst_x: br.read_bits(16) as u16,
                dst_y: br.read_bits(16) as u16,
                w1: br.read_bits(8) as u8,
                h1: br.read_bits(8) as u8,
            };
            let (w, h) = (m.width(), m.height());
            let src_in = m.src_x as usize + w <= xsize && m.src_y as usize + h <= ysize;
            let dst_in = m.dst_x as usize + w <= xsize && m.dst_y as usize + h <= ysize;
            let ordered = (m.src_y, m.src_x) < (m.dst_y, m.dst_x);
            if !src_in || !dst_in || !ordered {
                return Err(GcifError::DataCorrupt);
            }

            for dy in m.dst_y as usize..m.dst_y as usize + h {
                for dx in m.dst_x as usize..m.dst_x as usize + w {
                    owner[dy * xsize + dx] = i as u32 + 1;
                }
            }
            matches.push(m);
        }

        Ok(Self {
            xsize,
            owner,
            matches,
        })
    }

    #[inline]
    pub fn visited(&self, x: usize, y: usize) -> bool {
        self.owner[y * self.xsize + x] != 0
    }

    /// Source coordinates feeding a visited pixel. The source always
    /// precedes the destination in raster order, so it is already decoded.
    #[inline]
    pub fn source_of(&self, x: usize, y: usize) -> (usize, usize) {
        let m = &self.matches[self.owner[y * self.xsize + x] as usize - 1];
        (
            x - m.dst_x as usize + m.src_x as usize,
            y - m.dst_y as usize + m.src_y as usize,
        )
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    pub fn matches(&self) -> &[LzMatch] {
        &self.matches
    }
}
