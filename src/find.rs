
//! Locates bit offsets at which a deflate block plausibly begins,
//! for splitting gzip streams that carry no index.
//!
//! The hot path is a lookup table over the 13 bits that start every
//! dynamic deflate block: the final-block flag, the block type, and the
//! HLIT and HDIST counts. For each 13-bit value the table stores zero if
//! the value is structurally valid, and otherwise the smallest bit shift
//! after which it could become valid. Surviving candidates are verified
//! by trial-decoding the dynamic header and the first 32 KiB of output;
//! this filters the false positives that 13 bits of structure let through.
//!
//! Stored blocks are located through their byte alignment and length
//! checksum while decoding; fixed-coding blocks are never proposed as
//! chunk boundaries and decode serially inside their surrounding chunk.

use log::trace;

use crate::bits::BitReader;
use crate::deflate::{BlockDecoder, ChunkOutput, WINDOW_SIZE};
use crate::error::{Error, Result};
use crate::io::FileReader;


/// Number of structural bits at the start of a dynamic deflate block:
/// 1 final flag + 2 type + 5 HLIT + 5 HDIST.
pub const CANDIDATE_BITS: u8 = 13;

/// `1 << CANDIDATE_BITS` lookup entries.
const LUT_SIZE: usize = 1 << CANDIDATE_BITS;

/// HLIT and HDIST may be at most 29, so that 257 + HLIT stays within the
/// 286 literal/length symbols and 1 + HDIST within the 30 distance symbols.
const MAX_CODE_COUNT_BITS: u64 = 29;


/// Finds candidate deflate block offsets in streams without an index.
#[derive(Debug)]
pub struct BlockFinder {
    next_candidate_lut: Vec<u8>,
    decoder: BlockDecoder,
}

impl BlockFinder {

    pub fn new() -> Self {
        let next_candidate_lut = (0 .. LUT_SIZE as u64)
            .map(|bits| next_candidate_shift(bits, CANDIDATE_BITS))
            .collect();

        Self { next_candidate_lut, decoder: BlockDecoder::new() }
    }

    /// The shift table entry for the given 13 bits. Zero means the bits
    /// begin a structurally valid dynamic block header.
    pub fn shift_for(&self, bits: u64) -> u8 {
        self.next_candidate_lut[(bits as usize) & (LUT_SIZE - 1)]
    }

    /// Scan forward from the given bit offset and return the first verified
    /// candidate, or `None` when the rest of the stream contains none.
    pub fn next_candidate(&self, source: &dyn FileReader, start_bit: u64) -> Result<Option<u64>> {
        let mut bits = BitReader::new(source.clone_reader());
        bits.seek(start_bit)?;

        loop {
            let peeked = match bits.peek(CANDIDATE_BITS) {
                Ok(peeked) => peeked,
                Err(error) if error.is_end_of_file() => return Ok(None),
                Err(error) => return Err(error),
            };

            let shift = self.shift_for(peeked);
            if shift == 0 {
                let candidate = bits.tell();
                if self.verify_candidate(source, candidate)? {
                    trace!("block finder: verified candidate at bit {}", candidate);
                    return Ok(Some(candidate));
                }

                if bits.seek_after_peek(1).is_err() { return Ok(None); }
            }
            else if bits.seek_after_peek(shift).is_err() {
                return Ok(None);
            }
        }
    }

    /// Trial-decode at the candidate: the dynamic header must parse, and
    /// enough output to seed the next chunk must decode without error.
    fn verify_candidate(&self, source: &dyn FileReader, candidate_bit: u64) -> Result<bool> {
        let mut bits = BitReader::new(source.clone_reader());
        bits.seek(candidate_bit)?;

        let mut output = ChunkOutput::speculative();
        loop {
            match self.decoder.decode_block(&mut bits, &mut output) {
                // reaching the member's final block is as convincing
                // as a full window of output
                Ok(true) => return Ok(true),
                Ok(false) => if output.len() >= WINDOW_SIZE { return Ok(true) },

                Err(Error::Decode(kind)) => {
                    trace!("block finder: bit {} refuted by probe: {}", candidate_bit, kind);
                    return Ok(false);
                },

                Err(error) => return Err(error),
            }
        }
    }
}

impl Default for BlockFinder {
    fn default() -> Self { Self::new() }
}


/// How many bits to skip before the low `bit_count` bits of `bits` could
/// possibly turn into a valid dynamic block header. Bits above `bit_count`
/// are unknown and assumed favorable.
fn next_candidate_shift(bits: u64, bit_count: u8) -> u8 {
    if bit_count == 0 { return 0; }

    // the final-block flag must be unset
    if bits & 1 != 0 {
        return 1 + next_candidate_shift(bits >> 1, bit_count - 1);
    }

    if bit_count < 3 { return 0; }
    if (bits >> 1) & 0b11 != 0b10 {
        return 1 + next_candidate_shift(bits >> 1, bit_count - 1);
    }

    if bit_count < 8 { return 0; }
    if (bits >> 3) & 0b11111 > MAX_CODE_COUNT_BITS {
        return 1 + next_candidate_shift(bits >> 1, bit_count - 1);
    }

    if bit_count < 13 { return 0; }
    if (bits >> 8) & 0b11111 > MAX_CODE_COUNT_BITS {
        return 1 + next_candidate_shift(bits >> 1, bit_count - 1);
    }

    0
}
