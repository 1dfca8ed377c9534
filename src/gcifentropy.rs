//! Entropy primitives: the integer-histogram estimator used by the filter
//! tournaments and the canonical prefix coder that writes the residual,
//! palette and monochrome sub-streams.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::gcifbits::{BitReader, BitWriter};
use crate::GcifError;

/// Longest prefix code emitted; table entries are 4-bit lengths.
pub const MAX_CODE_BITS: u32 = 15;

/// Run-symbol slots reserved after the literal alphabet. The current
/// writers never emit them; the table keeps the space so a run-capable
/// coder stays wire-compatible.
pub const ENCODER_ZRLE_SYMS: usize = 16;

/// Byte-histogram entropy estimator.
///
/// The histogram is integer so that `subtract` after `add` of the same
/// buffer restores the state exactly; only the bit-cost estimate uses
/// floating point.
pub struct EntropyEstimator {
    hist: [u32; 256],
    total: u64,
}

impl EntropyEstimator {
    pub fn new() -> Self {
        Self {
            hist: [0; 256],
            total: 0,
        }
    }

    pub fn add(&mut self, buf: &[u8]) {
        for &b in buf {
            self.hist[b as usize] += 1;
        }
        self.total += buf.len() as u64;
    }

    pub fn add_single(&mut self, b: u8) {
        self.hist[b as usize] += 1;
        self.total += 1;
    }

    pub fn subtract(&mut self, buf: &[u8]) {
        for &b in buf {
            debug_assert!(self.hist[b as usize] > 0);
            self.hist[b as usize] -= 1;
        }
        debug_assert!(self.total >= buf.len() as u64);
        self.total -= buf.len() as u64;
    }

    /// Estimated cost in bits of coding `buf` with the histogram extended
    /// by `buf` itself, so a fresh estimator still ranks candidate streams
    /// by their own entropy.
    pub fn entropy(&self, buf: &[u8]) -> u32 {
        if buf.is_empty() {
            return 0;
        }
        let mut local = [0u32; 256];
        for &b in buf {
            local[b as usize] += 1;
        }
        let denom = (self.total + buf.len() as u64 + 256) as f64;
        let mut bits = 0.0f64;
        for b in 0..256 {
            if local[b] > 0 {
                let p = (self.hist[b] as u64 + local[b] as u64) as f64 / denom;
                bits -= local[b] as f64 * p.log2();
            }
        }
        bits as u32
    }

    /// Shannon cost in bits of everything added so far.
    pub fn entropy_overall(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        let total = self.total as f64;
        let mut bits = 0.0f64;
        for &count in self.hist.iter() {
            if count > 0 {
                bits += count as f64 * (total / count as f64).log2();
            }
        }
        bits as u32
    }
}

impl Default for EntropyEstimator {
    fn default() -> Self {
        Self::new()
    }
}

fn build_code_lengths(hist: &[u32], lengths: &mut [u8]) {
    lengths.fill(0);
    let mut live: Vec<(usize, u64)> = hist
        .iter()
        .enumerate()
        .filter(|(_, &f)| f > 0)
        .map(|(s, &f)| (s, f as u64))
        .collect();

    match live.len() {
        0 => return,
        1 => {
            lengths[live[0].0] = 1;
            return;
        }
        _ => {}
    }

    loop {
        // Huffman over (frequency, node-id) pairs; the id tie-break keeps
        // the tree deterministic.
        let n = live.len();
        let mut freq: Vec<u64> = live.iter().map(|&(_, f)| f).collect();
        let mut parent = vec![usize::MAX; 2 * n - 1];
        let mut heap: BinaryHeap<Reverse<(u64, usize)>> =
            (0..n).map(|i| Reverse((freq[i], i))).collect();

        let mut next = n;
        while heap.len() > 1 {
            let Reverse((fa, a)) = heap.pop().unwrap();
            let Reverse((fb, b)) = heap.pop().unwrap();
            parent[a] = next;
            parent[b] = next;
            freq.push(fa + fb);
            heap.push(Reverse((fa + fb, next)));
            next += 1;
        }

        let mut max_depth = 0u32;
        let mut depths = vec![0u8; n];
        for i in 0..n {
            let mut d = 0u32;
            let mut node = i;
            while parent[node] != usize::MAX {
                node = parent[node];
                d += 1;
            }
            depths[i] = d as u8;
            max_depth = max_depth.max(d);
        }

        if max_depth <= MAX_CODE_BITS {
            for (i, &(sym, _)) in live.iter().enumerate() {
                lengths[sym] = depths[i];
            }
            return;
        }

        // Flatten the distribution until the deepest leaf fits the table.
        for entry in live.iter_mut() {
            entry.1 = (entry.1 >> 1) | 1;
        }
    }
}

fn assign_canonical_codes(lengths: &[u8], codes: &mut [u32]) {
    let mut order: Vec<usize> = (0..lengths.len()).filter(|&s| lengths[s] > 0).collect();
    order.sort_by_key(|&s| (lengths[s], s));

    let mut next_code = 0u32;
    let mut prev_len = 0u8;
    for &sym in &order {
        next_code <<= lengths[sym] - prev_len;
        codes[sym] = next_code;
        next_code += 1;
        prev_len = lengths[sym];
    }
}

/// Histogram-trained canonical prefix encoder.
pub struct EntropyEncoder {
    alphabet: usize,
    hist: Vec<u32>,
    lengths: Vec<u8>,
    codes: Vec<u32>,
}

impl EntropyEncoder {
    pub fn new(num_syms: usize, zrle_syms: usize) -> Self {
        let alphabet = num_syms + zrle_syms;
        debug_assert!(alphabet >= 1 && alphabet <= 512);
        Self {
            alphabet,
            hist: vec![0; alphabet],
            lengths: vec![0; alphabet],
            codes: vec![0; alphabet],
        }
    }

    /// Train on one symbol.
    pub fn add(&mut self, sym: u16) {
        self.hist[sym as usize] += 1;
    }

    /// Freeze the histogram into canonical code lengths.
    pub fn finalize(&mut self) {
        build_code_lengths(&self.hist, &mut self.lengths);
        assign_canonical_codes(&self.lengths, &mut self.codes);
    }

    /// Emit the per-symbol code lengths. An untrained coder costs a single
    /// bit, so empty context bins stay cheap. Returns bits written.
    pub fn write_tables(&self, bw: &mut BitWriter) -> usize {
        if self.lengths.iter().all(|&l| l == 0) {
            bw.write_bit(0);
            return 1;
        }
        bw.write_bit(1);
        for &len in &self.lengths {
            bw.write_bits(len as u32, 4);
        }
        1 + self.alphabet * 4
    }

    /// Emit one symbol. Returns bits written.
    pub fn write(&self, sym: u16, bw: &mut BitWriter) -> usize {
        let len = self.lengths[sym as usize] as u32;
        debug_assert!(len > 0, "symbol {} was never trained", sym);
        bw.write_bits(self.codes[sym as usize], len);
        len as usize
    }
}

/// Canonical prefix decoder matching [`EntropyEncoder`].
pub struct EntropyDecoder {
    count: [u32; MAX_CODE_BITS as usize + 1],
    syms: Vec<u16>,
}

impl EntropyDecoder {
    /// Read the code-length table for an alphabet of `num_syms + zrle_syms`
    /// symbols.
    pub fn read_tables(num_syms: usize, zrle_syms: usize, br: &mut BitReader) -> Self {
        let alphabet = num_syms + zrle_syms;
        let mut lengths = vec![0u8; alphabet];
        if br.read_bit() == 1 {
            for len in lengths.iter_mut() {
                *len = br.read_bits(4) as u8;
            }
        }

        let mut count = [0u32; MAX_CODE_BITS as usize + 1];
        for &len in &lengths {
            count[len as usize] += 1;
        }
        count[0] = 0;

        let mut order: Vec<usize> = (0..alphabet).filter(|&s| lengths[s] > 0).collect();
        order.sort_by_key(|&s| (lengths[s], s));
        let syms = order.into_iter().map(|s| s as u16).collect();

        Self { count, syms }
    }

    /// Decode one symbol, bit-serially along the canonical code tree.
    pub fn read(&self, br: &mut BitReader) -> Result<u16, GcifError> {
        let mut code = 0u32;
        let mut first = 0u32;
        let mut index = 0usize;
        for len in 1..=MAX_CODE_BITS as usize {
            code = (code << 1) | br.read_bit();
            let cnt = self.count[len];
            if (code as u64) < first as u64 + cnt as u64 {
                return Ok(self.syms[index + (code - first) as usize]);
            }
            index += cnt as usize;
            first = (first + cnt) << 1;
        }
        Err(GcifError::DataCorrupt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(symbols: &[u16], num_syms: usize) {
        let mut enc = EntropyEncoder::new(num_syms, ENCODER_ZRLE_SYMS);
        for &s in symbols {
            enc.add(s);
        }
        enc.finalize();

        let mut bw = BitWriter::new();
        enc.write_tables(&mut bw);
        for &s in symbols {
            enc.write(s, &mut bw);
        }
        let (words, _) = bw.finalize();

        let mut br = BitReader::new(&words);
        let dec = EntropyDecoder::read_tables(num_syms, ENCODER_ZRLE_SYMS, &mut br);
        for &s in symbols {
            assert_eq!(dec.read(&mut br).unwrap(), s);
        }
    }

    #[test]
    fn skewed_stream_roundtrips() {
        let mut symbols = Vec::new();
        for i in 0..4000u32 {
            let s = match i % 16 {
                0..=9 => 0u16,
                10..=13 => 7,
                14 => (i % 256) as u16,
                _ => 255,
            };
            symbols.push(s);
        }
        roundtrip(&symbols, 256);
    }

    #[test]
    fn single_symbol_stream_roundtrips() {
        roundtrip(&[42u16; 100], 256);
    }

    #[test]
    fn tiny_alphabet_roundtrips() {
        let symbols: Vec<u16> = (0..500u32).map(|i| ((i * 7) % 3) as u16).collect();
        roundtrip(&symbols, 3);
    }

    #[test]
    fn pathological_counts_respect_the_length_cap() {
        let mut enc = EntropyEncoder::new(32, 0);
        // Fibonacci-ish counts drive plain Huffman past the cap.
        let mut a = 1u32;
        let mut b = 1u32;
        for s in 0..32u16 {
            for _ in 0..a {
                enc.add(s);
            }
            let next = a.saturating_add(b);
            a = b;
            b = next;
        }
        enc.finalize();
        assert!(enc.lengths.iter().all(|&l| (l as u32) <= MAX_CODE_BITS));
        assert!(enc.lengths.iter().any(|&l| l > 0));
    }

    #[test]
    fn estimator_subtract_inverts_add() {
        let mut ee = EntropyEstimator::new();
        let base: Vec<u8> = (0..200u32).map(|i| (i * 13) as u8).collect();
        let probe: Vec<u8> = (0..64u32).map(|i| (i * 31) as u8).collect();
        ee.add(&base);
        let before = ee.entropy(&probe);
        ee.add(&probe);
        ee.subtract(&probe);
        assert_eq!(ee.entropy(&probe), before);
        assert_eq!(ee.entropy_overall(), {
            let mut fresh = EntropyEstimator::new();
            fresh.add(&base);
            fresh.entropy_overall()
        });
    }

    #[test]
    fn estimator_prefers_concentrated_streams() {
        let mut ee = EntropyEstimator::new();
        ee.add(&[7u8; 512]);
        let concentrated = ee.entropy(&[7u8; 64]);
        let spread = ee.entropy(&(0..64u32).map(|i| i as u8).collect::<Vec<_>>());
        assert!(concentrated < spread);
    }
}
