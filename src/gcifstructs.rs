//! Container-level constants, tuning knobs and the five-word file header.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use xxhash_rust::xxh32::Xxh32;
use xxhash_rust::xxh3::xxh3_64;

use crate::GcifError;

/// File magic, "GCIF" in little-endian byte order.
pub const HEAD_MAGIC: u32 = 0x4649_4347;

/// Number of 32-bit words in the file header.
pub const HEAD_WORDS: usize = 5;

/// Seed for the hash covering the first two header words.
pub const HEAD_SEED: u32 = 0x120C_A71D;

/// Seed for the streaming hash over the data words.
pub const DATA_SEED: u32 = 0xCA71_D123;

/// Largest width or height accepted by the codec.
pub const MAX_DIM: usize = 65_535;

/// Encoder tuning knobs.
///
/// The defaults reproduce the standard tool behavior; the CLI exposes the
/// interesting ones as flags.
#[derive(Debug, Clone)]
pub struct GcifKnobs {
    /// Number of tiles re-evaluated after the first filter-selection pass.
    pub cm_revisit_count: u32,
    /// Number of spatial-filter candidates kept per tile during entropy
    /// evaluation. Must be nonzero while entropy selection is enabled.
    pub cm_filter_select_fuzz: u32,
    /// Skip the entropy-driven tile tournament and keep the score-based
    /// first choice.
    pub cm_disable_entropy: bool,
    /// Palette sizes at or above this threshold store entries through the
    /// entropy coder instead of literal words.
    pub pal_huff_thresh: u32,
    /// Minimum fraction of pixels that must carry the mask color before the
    /// transparency mask engages.
    pub mask_min_ratio: f64,
    /// Enable the 2D LZ match pass.
    pub lz_enable: bool,
}

impl Default for GcifKnobs {
    fn default() -> Self {
        Self {
            cm_revisit_count: 4096,
            cm_filter_select_fuzz: 8,
            cm_disable_entropy: false,
            pal_huff_thresh: 16,
            mask_min_ratio: 0.1,
            lz_enable: true,
        }
    }
}

/// Decoded file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub xsize: u16,
    pub ysize: u16,
    /// Hash of the first two header words, keyed with [`HEAD_SEED`].
    pub head_hash: u32,
    /// Streaming hash of the data words, keyed with [`DATA_SEED`].
    pub fast_hash: u32,
    /// Stronger data hash for verification on demand.
    pub good_hash: u32,
}

impl ImageHeader {
    /// Serialize to the five big-endian header words.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let dims = ((self.xsize as u32) << 16) | self.ysize as u32;
        out.write_u32::<BigEndian>(HEAD_MAGIC).unwrap();
        out.write_u32::<BigEndian>(dims).unwrap();
        out.write_u32::<BigEndian>(self.head_hash).unwrap();
        out.write_u32::<BigEndian>(self.fast_hash).unwrap();
        out.write_u32::<BigEndian>(self.good_hash).unwrap();
    }

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Magic or head-hash mismatch reports `BadFormat`; a short buffer
    /// reports `ReadFail`.
    pub fn parse(bytes: &[u8]) -> Result<Self, GcifError> {
        if bytes.len() < HEAD_WORDS * 4 {
            return Err(GcifError::ReadFail);
        }
        let magic = BigEndian::read_u32(&bytes[0..4]);
        let dims = BigEndian::read_u32(&bytes[4..8]);
        let head_hash = BigEndian::read_u32(&bytes[8..12]);
        let fast_hash = BigEndian::read_u32(&bytes[12..16]);
        let good_hash = BigEndian::read_u32(&bytes[16..20]);

        if magic != HEAD_MAGIC {
            return Err(GcifError::BadFormat);
        }
        if head_hash != head_hash_of(magic, dims) {
            return Err(GcifError::BadFormat);
        }

        Ok(Self {
            xsize: (dims >> 16) as u16,
            ysize: (dims & 0xFFFF) as u16,
            head_hash,
            fast_hash,
            good_hash,
        })
    }
}

/// Hash of the two leading header words.
pub fn head_hash_of(magic: u32, dims: u32) -> u32 {
    let mut h = Xxh32::new(HEAD_SEED);
    h.update(&magic.to_be_bytes());
    h.update(&dims.to_be_bytes());
    h.digest()
}

/// Streaming data-word hash used by writer and reader alike.
pub struct DataHasher {
    inner: Xxh32,
}

impl DataHasher {
    pub fn new() -> Self {
        Self {
            inner: Xxh32::new(DATA_SEED),
        }
    }

    pub fn mix_word(&mut self, word: u32) {
        self.inner.update(&word.to_be_bytes());
    }

    pub fn finish(&self) -> u32 {
        self.inner.digest()
    }
}

impl Default for DataHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Stronger verification hash over the data words, folded to 32 bits.
pub fn good_hash_of(words: &[u32]) -> u32 {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for w in words {
        bytes.extend_from_slice(&w.to_be_bytes());
    }
    let h = xxh3_64(&bytes);
    (h ^ (h >> 32)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let hdr = ImageHeader {
            xsize: 640,
            ysize: 480,
            head_hash: head_hash_of(HEAD_MAGIC, (640u32 << 16) | 480),
            fast_hash: 0xDEAD_BEEF,
            good_hash: 0x1234_5678,
        };
        let mut bytes = Vec::new();
        hdr.write_to(&mut bytes);
        assert_eq!(bytes.len(), HEAD_WORDS * 4);
        let parsed = ImageHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, hdr);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let hdr = ImageHeader {
            xsize: 1,
            ysize: 1,
            head_hash: head_hash_of(HEAD_MAGIC, (1u32 << 16) | 1),
            fast_hash: 0,
            good_hash: 0,
        };
        let mut bytes = Vec::new();
        hdr.write_to(&mut bytes);
        bytes[0] ^= 0xFF;
        assert!(matches!(
            ImageHeader::parse(&bytes),
            Err(GcifError::BadFormat)
        ));
    }

    #[test]
    fn corrupt_dims_fail_head_hash() {
        let hdr = ImageHeader {
            xsize: 16,
            ysize: 16,
            head_hash: head_hash_of(HEAD_MAGIC, (16u32 << 16) | 16),
            fast_hash: 0,
            good_hash: 0,
        };
        let mut bytes = Vec::new();
        hdr.write_to(&mut bytes);
        bytes[7] ^= 0x01;
        assert!(matches!(
            ImageHeader::parse(&bytes),
            Err(GcifError::BadFormat)
        ));
    }
}
