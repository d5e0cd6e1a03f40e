
//! A chunk is a contiguous range of the compressed stream covering one
//! or more complete deflate blocks. Chunks are decoded independently on
//! worker threads, possibly before their predecessor has finished, and
//! stitched together afterwards through 32 KiB seed windows.

use std::sync::Arc;

use crate::bits::BitReader;
use crate::deflate::{BlockDecoder, ChunkOutput, WINDOW_SIZE, block::resolve_markers};
use crate::error::{DecodeError, Error, Result, usize_to_u64};
use crate::gzip;
use crate::io::FileReader;


/// The last up-to-32 KiB of uncompressed data preceding some cut point.
/// Immutable once sealed; chunks share windows by reference counting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    bytes: Vec<u8>,
}

impl Window {

    /// The sliding window never exceeds this many bytes.
    pub const MAX_SIZE: usize = WINDOW_SIZE;

    /// The window before the start of a stream or gzip member.
    pub fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Seal a window from bytes that precede a cut point.
    /// Keeps only the trailing 32 KiB.
    pub fn from_preceding(bytes: &[u8]) -> Self {
        let start = bytes.len().saturating_sub(Self::MAX_SIZE);
        Self { bytes: bytes[start ..].to_vec() }
    }

    /// The window after appending more uncompressed data.
    pub fn extended(&self, new_bytes: &[u8]) -> Self {
        if new_bytes.len() >= Self::MAX_SIZE {
            return Self::from_preceding(new_bytes);
        }

        let keep = Self::MAX_SIZE.saturating_sub(new_bytes.len()).min(self.bytes.len());
        let mut bytes = self.bytes[self.bytes.len() - keep ..].to_vec();
        bytes.extend_from_slice(new_bytes);
        Self { bytes }
    }

    pub fn len(&self) -> usize { self.bytes.len() }
    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }
    pub fn bytes(&self) -> &[u8] { &self.bytes }
}

impl From<Vec<u8>> for Window {
    fn from(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() <= Self::MAX_SIZE);
        Self { bytes }
    }
}


/// What a worker should decode: the chunk's bit range and whether it
/// begins at a gzip member header instead of inside a deflate stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub start_bit: u64,

    /// Decoding stops at the first block boundary at or past this bit.
    pub until_bit: u64,

    /// Whether `start_bit` points at a member header (byte aligned,
    /// empty seed window) rather than a deflate block boundary.
    pub at_member_start: bool,
}


/// A deflate block boundary encountered while decoding a chunk.
/// These become index checkpoint candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStart {
    pub bit_offset: u64,
    pub output_offset: usize,
}

/// A gzip member that ended inside a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberEnd {

    /// Chunk output offset at which the member ended
    /// and, unless the stream ended, the next member begins.
    pub output_offset: usize,

    /// Checksum the footer promised for the member's contents.
    pub crc32: u32,

    /// Member length modulo 2^32 that the footer promised.
    pub uncompressed_size: u32,

    /// Bit offset of the member header following the footer.
    pub next_header_bit: u64,
}


/// The raw result of decoding a chunk, before marker resolution.
#[derive(Debug)]
pub struct DecodedChunk {
    pub start_bit: u64,
    pub end_bit: u64,

    /// Marker-tagged output entries.
    pub entries: Vec<u16>,

    pub block_starts: Vec<BlockStart>,
    pub member_ends: Vec<MemberEnd>,

    /// Whether the compressed stream ended inside this chunk.
    pub ends_stream: bool,

    /// Whether `end_bit` points at the header of the next gzip member
    /// instead of a deflate block boundary.
    pub ends_at_member_start: bool,
}

/// A decoded chunk with all markers substituted,
/// carrying the window for its successor.
#[derive(Debug)]
pub struct ResolvedChunk {
    pub bytes: Vec<u8>,
    pub end_bit: u64,
    pub block_starts: Vec<BlockStart>,
    pub member_ends: Vec<MemberEnd>,
    pub ends_stream: bool,
    pub ends_at_member_start: bool,

    /// The 32 KiB window valid after this chunk.
    pub tail_window: Arc<Window>,
}

impl DecodedChunk {

    /// Substitute every marker with its byte from the seed window
    /// and seal the tail window for the following chunk.
    pub fn resolve(&self, seed_window: &Window) -> Result<ResolvedChunk> {
        let bytes = resolve_markers(&self.entries, seed_window.bytes())?;

        // a window never reaches across a member boundary
        let tail_window = match self.member_ends.last() {
            Some(member) => Window::from_preceding(&bytes[member.output_offset ..]),
            None => seed_window.extended(&bytes),
        };

        Ok(ResolvedChunk {
            bytes,
            end_bit: self.end_bit,
            block_starts: self.block_starts.clone(),
            member_ends: self.member_ends.clone(),
            ends_stream: self.ends_stream,
            ends_at_member_start: self.ends_at_member_start,
            tail_window: Arc::new(tail_window),
        })
    }
}

impl ResolvedChunk {

    /// The number of uncompressed bytes this chunk produced.
    pub fn len(&self) -> u64 { usize_to_u64(self.bytes.len()) }

    pub fn is_empty(&self) -> bool { self.bytes.is_empty() }

    /// The window preceding the given output offset, for index checkpoints.
    /// Stays within the member that contains the offset.
    pub fn window_before(&self, output_offset: usize, seed_window: &Window) -> Window {
        let member_start = self.member_ends.iter().rev()
            .map(|member| member.output_offset)
            .find(|&start| start <= output_offset);

        match member_start {
            None => seed_window.extended(&self.bytes[.. output_offset]),
            Some(start) => {
                let begin = output_offset.saturating_sub(Window::MAX_SIZE).max(start);
                Window::from_preceding(&self.bytes[begin .. output_offset])
            },
        }
    }
}


/// The worker task body: decode deflate blocks starting at the requested
/// bit offset until the cursor reaches the target bit, crossing gzip member
/// boundaries as needed. This is a pure function over the shared compressed
/// bytes; its only input besides the request is the byte source.
pub fn decode_chunk(source: Box<dyn FileReader>, request: ChunkRequest) -> Result<DecodedChunk> {
    let mut bits = BitReader::new(source);
    bits.seek(request.start_bit)?;

    let mut output =
        if request.at_member_start { ChunkOutput::at_member_start() }
        else { ChunkOutput::speculative() };

    let decoder = BlockDecoder::new();
    let mut block_starts = Vec::new();
    let mut member_ends = Vec::new();
    let mut at_header = request.at_member_start;

    let (end_bit, ends_stream, ends_at_member_start) = 'stream: loop {
        if bits.tell() >= request.until_bit {
            // a chunk can end exactly at a member boundary when the
            // boundary candidate fell inside the member's last block
            break (bits.tell(), false, at_header);
        }

        if at_header {
            let header_bit = bits.tell();
            match gzip::read_member_header(&mut bits) {
                Ok(_) => {},

                // a clean end, or trailing bytes that are not another member
                Err(Error::Decode(DecodeError::EndOfFile))
                | Err(Error::Decode(DecodeError::InvalidGzipHeader))
                | Err(Error::Decode(DecodeError::IncompleteGzipHeader)) => {
                    break (header_bit, true, false);
                },

                Err(error) => return Err(error),
            }

            at_header = false;
        }

        // decode the blocks of the current member
        loop {
            let block_bit = bits.tell();
            if block_bit >= request.until_bit {
                break 'stream (block_bit, false, false);
            }

            block_starts.push(BlockStart {
                bit_offset: block_bit,
                output_offset: output.len(),
            });

            let was_final = decoder.decode_block(&mut bits, &mut output)?;
            if was_final {
                bits.align_to_byte()?;
                let footer = gzip::read_member_footer(&mut bits)?;

                member_ends.push(MemberEnd {
                    output_offset: output.len(),
                    crc32: footer.crc32,
                    uncompressed_size: footer.uncompressed_size,
                    next_header_bit: bits.tell(),
                });

                output.begin_member();
                at_header = true;
                break;
            }
        }
    };

    Ok(DecodedChunk {
        start_bit: request.start_bit,
        end_bit,
        entries: output.into_entries(),
        block_starts,
        member_ends,
        ends_stream,
        ends_at_member_start,
    })
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::io::BufferViewReader;
    use std::io::Write;

    fn gzipped(data: &[u8]) -> Vec<u8> {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn decode_whole_stream(compressed: Vec<u8>) -> DecodedChunk {
        decode_chunk(
            Box::new(BufferViewReader::new(compressed)),
            ChunkRequest { start_bit: 0, until_bit: u64::MAX, at_member_start: true },
        ).unwrap()
    }

    #[test]
    fn decodes_a_whole_member() {
        let data = b"hello, parallel gzip world".repeat(100);
        let decoded = decode_whole_stream(gzipped(&data));

        assert!(decoded.ends_stream);
        assert_eq!(decoded.member_ends.len(), 1);
        assert!(!decoded.block_starts.is_empty());

        let resolved = decoded.resolve(&Window::empty()).unwrap();
        assert_eq!(resolved.bytes, data);
        assert_eq!(resolved.member_ends[0].uncompressed_size as usize, data.len());
    }

    #[test]
    fn crosses_member_boundaries() {
        let mut compressed = gzipped(b"A");
        compressed.extend_from_slice(&gzipped(b"A"));

        let decoded = decode_whole_stream(compressed);
        assert_eq!(decoded.member_ends.len(), 2);
        assert!(decoded.ends_stream);

        let resolved = decoded.resolve(&Window::empty()).unwrap();
        assert_eq!(resolved.bytes, b"AA");
    }

    #[test]
    fn trailing_garbage_ends_the_stream_silently() {
        let mut compressed = gzipped(b"payload");
        let payload_end = compressed.len();
        compressed.extend_from_slice(b"not a gzip member");

        let decoded = decode_whole_stream(compressed);
        assert!(decoded.ends_stream);
        assert_eq!(decoded.end_bit, payload_end as u64 * 8);

        let resolved = decoded.resolve(&Window::empty()).unwrap();
        assert_eq!(resolved.bytes, b"payload");
    }

    #[test]
    fn tail_windows_chain_across_chunks() {
        let window = Window::from_preceding(&[1, 2, 3]);
        assert_eq!(window.bytes(), [1, 2, 3]);

        let extended = window.extended(&[4, 5]);
        assert_eq!(extended.bytes(), [1, 2, 3, 4, 5]);

        let big = vec![7_u8; Window::MAX_SIZE + 10];
        let rolled = extended.extended(&big);
        assert_eq!(rolled.len(), Window::MAX_SIZE);
        assert!(rolled.bytes().iter().all(|&byte| byte == 7));

        let partial = Window::from_preceding(&[9; 100]).extended(&vec![8; Window::MAX_SIZE - 40]);
        assert_eq!(partial.len(), Window::MAX_SIZE);
        assert_eq!(&partial.bytes()[.. 40], &[9; 40]);
    }

    #[test]
    fn windows_do_not_cross_member_boundaries() {
        let mut compressed = gzipped(&[1_u8; 100]);
        compressed.extend_from_slice(&gzipped(&[2_u8; 60]));

        let decoded = decode_whole_stream(compressed);
        let resolved = decoded.resolve(&Window::empty()).unwrap();

        // the tail window covers only the last member's output
        assert!(resolved.tail_window.is_empty(), "stream ended at a member boundary");

        let window = resolved.window_before(130, &Window::empty());
        assert_eq!(window.bytes(), &[2_u8; 30]);
    }
}
