
//! Decodes one deflate block at a time into a [`ChunkOutput`].
//!
//! Chunk output is marker-tagged: when a chunk is decoded speculatively,
//! before its predecessor finished, back-references reaching behind the
//! chunk start are recorded as unresolved markers instead of bytes.
//! Once the preceding 32 KiB window is known, a single linear pass
//! replaces every marker with its actual byte.

use smallvec::SmallVec;

use crate::bits::BitReader;
use crate::deflate::{
    self, HuffmanCoding,
    DISTANCE_BASE, DISTANCE_EXTRA_BITS, LENGTH_BASE, LENGTH_EXTRA_BITS,
    END_OF_BLOCK_SYMBOL, MAX_CODE_LENGTH, MAX_DISTANCE_SYMBOL_COUNT,
    MAX_LITERAL_OR_LENGTH_SYMBOLS, MAX_PRECODE_LENGTH, PRECODE_LENGTH_ORDER,
    PRECODE_SYMBOL_COUNT, WINDOW_SIZE,
};
use crate::error::{DecodeError, Error, Result};


/// Entries below this value are resolved literal bytes.
/// Entries at or above it encode `distance_behind_chunk_start - 1`
/// in their low 15 bits.
const MARKER_BASE: u16 = 0x8000;


/// The marker-tagged uncompressed output of one chunk.
///
/// Each `u16` entry is either a resolved literal byte or an unresolved
/// back-reference into the yet-unknown window preceding the chunk.
#[derive(Debug)]
pub struct ChunkOutput {

    data: Vec<u16>,

    /// Offset at which the current gzip member started, if any member
    /// started inside this chunk. Back-references never cross it.
    /// `None` means the chunk began in the middle of a member, so
    /// references behind the chunk start become markers.
    member_start: Option<usize>,
}

impl ChunkOutput {

    /// Output of a chunk that begins in the middle of a gzip member.
    /// References behind the chunk start are recorded as markers.
    pub fn speculative() -> Self {
        Self { data: Vec::new(), member_start: None }
    }

    /// Output of a chunk that begins at a gzip member header,
    /// where no preceding window exists.
    pub fn at_member_start() -> Self {
        Self { data: Vec::new(), member_start: Some(0) }
    }

    /// Number of entries produced so far.
    pub fn len(&self) -> usize { self.data.len() }

    /// Whether nothing was produced so far.
    pub fn is_empty(&self) -> bool { self.data.is_empty() }

    /// A fresh gzip member begins after this point;
    /// back-references must not reach behind it.
    pub fn begin_member(&mut self) {
        self.member_start = Some(self.data.len());
    }

    /// The raw marker-tagged entries.
    pub fn into_entries(self) -> Vec<u16> { self.data }

    #[inline]
    fn push_literal(&mut self, byte: u8) {
        self.data.push(byte as u16);
    }

    fn copy_match(&mut self, distance: usize, length: usize) -> Result<()> {
        debug_assert!(distance >= 1 && distance <= WINDOW_SIZE);

        // byte by byte, so that overlapping copies repeat their own output
        for _ in 0 .. length {
            let position = self.data.len();
            let member_start = self.member_start.unwrap_or(0);

            if distance <= position - member_start {
                let entry = self.data[position - distance];
                self.data.push(entry);
            }
            else if self.member_start.is_none() {
                // the reference leads behind the chunk start:
                // record which window byte it needs
                let behind_chunk_start = (distance - position) as u16;
                self.data.push(MARKER_BASE | (behind_chunk_start - 1));
            }
            else {
                return Err(DecodeError::InvalidBackreference.into());
            }
        }

        Ok(())
    }
}


/// Resolve a marker-tagged buffer against the window that precedes the chunk.
/// For chunks that start a gzip member the window is empty and markers
/// cannot legally occur.
pub fn resolve_markers(entries: &[u16], window: &[u8]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(entries.len());

    for &entry in entries {
        if entry < MARKER_BASE {
            debug_assert!(entry <= 0xFF);
            bytes.push(entry as u8);
        }
        else {
            let behind_chunk_start = (entry & 0x7FFF) as usize + 1;
            if behind_chunk_start > window.len() {
                return Err(if window.is_empty() { DecodeError::InvalidBackreference.into() }
                           else { DecodeError::ExceededWindowRange.into() });
            }

            bytes.push(window[window.len() - behind_chunk_start]);
        }
    }

    Ok(bytes)
}


/// Decodes deflate blocks. Holds the fixed codings and is reused
/// across blocks and chunks.
#[derive(Debug)]
pub struct BlockDecoder {
    fixed_literal: HuffmanCoding,
    fixed_distance: HuffmanCoding,
}

impl BlockDecoder {

    pub fn new() -> Self {
        Self {
            fixed_literal: HuffmanCoding::from_lengths(&deflate::fixed_literal_lengths(), MAX_CODE_LENGTH)
                .expect("fixed literal coding is valid"),

            fixed_distance: HuffmanCoding::from_lengths(&deflate::fixed_distance_lengths(), MAX_CODE_LENGTH)
                .expect("fixed distance coding is valid"),
        }
    }

    /// Decode one complete deflate block into the output.
    /// Returns whether this block carried the final-block flag,
    /// which terminates the member's deflate payload.
    pub fn decode_block(&self, bits: &mut BitReader, output: &mut ChunkOutput) -> Result<bool> {
        let is_final = bits.read(1)? == 1;

        match bits.read(2)? {
            0b00 => self.decode_stored(bits, output)?,
            0b01 => self.decode_symbols(bits, output, &self.fixed_literal, Some(&self.fixed_distance))?,
            0b10 => {
                let (literal, distance) = read_dynamic_codings(bits)?;
                self.decode_symbols(bits, output, &literal, distance.as_ref())?;
            },
            _ => return Err(DecodeError::InvalidCompression.into()),
        }

        Ok(is_final)
    }

    fn decode_stored(&self, bits: &mut BitReader, output: &mut ChunkOutput) -> Result<()> {
        if bits.align_to_byte()? != 0 {
            return Err(DecodeError::NonZeroPadding.into());
        }

        let length = bits.read(16)?;
        let length_complement = bits.read(16)?;
        if length != !length_complement & 0xFFFF {
            return Err(DecodeError::LengthChecksumMismatch.into());
        }

        for _ in 0 .. length {
            let byte = bits.read(8).map_err(|error| match error {
                Error::Decode(DecodeError::EndOfFile) => DecodeError::EofUncompressed.into(),
                other => other,
            })?;

            output.push_literal(byte as u8);
        }

        Ok(())
    }

    fn decode_symbols(
        &self, bits: &mut BitReader, output: &mut ChunkOutput,
        literal: &HuffmanCoding, distance: Option<&HuffmanCoding>,
    ) -> Result<()>
    {
        loop {
            let symbol = literal.decode(bits)?;

            if symbol < END_OF_BLOCK_SYMBOL {
                output.push_literal(symbol as u8);
                continue;
            }

            if symbol == END_OF_BLOCK_SYMBOL {
                return Ok(());
            }

            // the fixed coding can produce the unused symbols 286 and 287
            if symbol as usize >= MAX_LITERAL_OR_LENGTH_SYMBOLS {
                return Err(DecodeError::InvalidHuffmanCode.into());
            }

            let length_index = (symbol - 257) as usize;
            let length = LENGTH_BASE[length_index] as usize
                + bits.read(LENGTH_EXTRA_BITS[length_index])? as usize;

            let distance_symbol = distance
                .ok_or(Error::Decode(DecodeError::InvalidBackreference))?
                .decode(bits)? as usize;

            if distance_symbol >= MAX_DISTANCE_SYMBOL_COUNT {
                return Err(DecodeError::ExceededDistanceRange.into());
            }

            let distance = DISTANCE_BASE[distance_symbol] as usize
                + bits.read(DISTANCE_EXTRA_BITS[distance_symbol])? as usize;

            output.copy_match(distance, length)?;
        }
    }
}

impl Default for BlockDecoder {
    fn default() -> Self { Self::new() }
}


/// Read the dynamic block header: counts, the code length coding, and the
/// expanded literal and distance codings. The distance coding may be absent
/// when the block contains no back-references at all.
fn read_dynamic_codings(bits: &mut BitReader) -> Result<(HuffmanCoding, Option<HuffmanCoding>)> {
    let literal_count = bits.read(5)? as usize + 257;
    if literal_count > MAX_LITERAL_OR_LENGTH_SYMBOLS {
        return Err(DecodeError::ExceededLiteralRange.into());
    }

    let distance_count = bits.read(5)? as usize + 1;
    if distance_count > MAX_DISTANCE_SYMBOL_COUNT {
        return Err(DecodeError::ExceededDistanceRange.into());
    }

    let precode_count = bits.read(4)? as usize + 4;
    debug_assert!(precode_count <= PRECODE_SYMBOL_COUNT);

    let mut precode_lengths: SmallVec<[u8; PRECODE_SYMBOL_COUNT]> =
        SmallVec::from_elem(0, PRECODE_SYMBOL_COUNT);

    for index in 0 .. precode_count {
        precode_lengths[PRECODE_LENGTH_ORDER[index]] = bits.read(3)? as u8;
    }

    let precode = HuffmanCoding::from_lengths(&precode_lengths, MAX_PRECODE_LENGTH)?;

    // expand the run-length encoded literal + distance code lengths
    let total = literal_count + distance_count;
    let mut lengths: SmallVec<[u8; 320]> = SmallVec::new();

    while lengths.len() < total {
        let symbol = precode.decode(bits)?;

        let (value, repeat) = match symbol {
            0 ..= 15 => (symbol as u8, 1),
            16 => {
                let previous = *lengths.last()
                    .ok_or(Error::Decode(DecodeError::InvalidClBackreference))?;
                (previous, 3 + bits.read(2)? as usize)
            },
            17 => (0, 3 + bits.read(3)? as usize),
            _ => (0, 11 + bits.read(7)? as usize),
        };

        if lengths.len() + repeat > total {
            return Err(DecodeError::InvalidCodeLengths.into());
        }

        for _ in 0 .. repeat { lengths.push(value); }
    }

    let literal = HuffmanCoding::from_lengths(&lengths[.. literal_count], MAX_CODE_LENGTH)?;

    let distance_lengths = &lengths[literal_count ..];
    let distance =
        if distance_lengths.iter().all(|&length| length == 0) { None }
        else { Some(HuffmanCoding::from_lengths(distance_lengths, MAX_CODE_LENGTH)?) };

    Ok((literal, distance))
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::io::BufferViewReader;

    fn bit_reader(bytes: Vec<u8>) -> BitReader {
        BitReader::new(Box::new(BufferViewReader::new(bytes)))
    }

    /// Raw deflate data for tests, produced by the crate that also
    /// compresses the index checkpoint windows.
    fn deflated(data: &[u8]) -> Vec<u8> {
        miniz_oxide::deflate::compress_to_vec(data, 6)
    }

    fn decode_all_blocks(compressed: Vec<u8>, output: &mut ChunkOutput) {
        let decoder = BlockDecoder::new();
        let mut bits = bit_reader(compressed);
        while !decoder.decode_block(&mut bits, output).unwrap() {}
    }

    #[test]
    fn decodes_a_stored_block() {
        // final stored block: 1, 00, padding, LEN = 3, ~LEN, payload
        let mut bytes = vec![0b0000_0001];
        bytes.extend_from_slice(&3_u16.to_le_bytes());
        bytes.extend_from_slice(&(!3_u16).to_le_bytes());
        bytes.extend_from_slice(b"abc");

        let mut output = ChunkOutput::at_member_start();
        let mut bits = bit_reader(bytes);
        assert!(BlockDecoder::new().decode_block(&mut bits, &mut output).unwrap());
        assert_eq!(resolve_markers(&output.into_entries(), &[]).unwrap(), b"abc");
    }

    #[test]
    fn rejects_a_corrupted_stored_length() {
        let mut bytes = vec![0b0000_0001];
        bytes.extend_from_slice(&3_u16.to_le_bytes());
        bytes.extend_from_slice(&3_u16.to_le_bytes());

        let mut output = ChunkOutput::at_member_start();
        let mut bits = bit_reader(bytes);
        let error = BlockDecoder::new().decode_block(&mut bits, &mut output).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::LengthChecksumMismatch)));
    }

    #[test]
    fn round_trips_repetitive_data_through_real_deflate() {
        let data: Vec<u8> = b"AAAAAAABBBBBBB".repeat(50);

        let mut output = ChunkOutput::at_member_start();
        decode_all_blocks(deflated(&data), &mut output);
        assert_eq!(resolve_markers(&output.into_entries(), &[]).unwrap(), data);
    }

    #[test]
    fn speculative_markers_resolve_against_the_window() {
        // known prefix, then a continuation that references it
        let mut data = Vec::new();
        for index in 0 .. 40_000_u32 { data.extend_from_slice(&index.to_le_bytes()); }
        data.extend_from_slice(&data.clone()[data.len() - 1000 ..]);

        let compressed = deflated(&data);

        // reference decode of everything
        let mut reference = ChunkOutput::at_member_start();
        decode_all_blocks(compressed, &mut reference);
        let reference = resolve_markers(&reference.into_entries(), &[]).unwrap();
        assert_eq!(reference, data);

        // markers stand in for an unknown window and resolve to the same bytes
        let window = &reference[reference.len() - 1000 ..];
        let mut speculative = ChunkOutput::speculative();
        speculative.copy_match(1000, 1000).unwrap();
        let entries = speculative.into_entries();
        assert!(entries.iter().all(|&entry| entry >= 0x8000));
        assert_eq!(resolve_markers(&entries, window).unwrap(), window);
    }

    #[test]
    fn copied_markers_keep_their_window_position() {
        let mut output = ChunkOutput::speculative();

        // one byte from behind the chunk start, then repeated from within
        output.copy_match(5, 1).unwrap();
        output.copy_match(1, 2).unwrap();

        let window = [10, 20, 30, 40, 50];
        assert_eq!(resolve_markers(&output.into_entries(), &window).unwrap(), [10, 10, 10]);
    }

    #[test]
    fn references_behind_a_member_start_are_invalid() {
        let mut output = ChunkOutput::speculative();
        output.push_literal(1);
        output.begin_member();
        output.push_literal(2);

        let error = output.copy_match(2, 1).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::InvalidBackreference)));
    }

    #[test]
    fn unresolvable_markers_exceed_the_window() {
        let mut output = ChunkOutput::speculative();
        output.copy_match(100, 1).unwrap();

        let error = resolve_markers(&output.into_entries(), &[0; 10]).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::ExceededWindowRange)));
    }
}
