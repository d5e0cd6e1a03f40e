
//! The binary index that maps uncompressed offsets to bit-precise
//! compressed positions, enabling O(1) seeks into pre-indexed streams.
//!
//! Layout (little endian, all integers unsigned):
//!
//! | offset | field                      | size |
//! |--------|----------------------------|------|
//! | 0      | magic `"GZIDX\0"`          | 6    |
//! | 6      | format version (= 1)       | 1    |
//! | 7      | reserved                   | 1    |
//! | 8      | compressed size            | 8    |
//! | 16     | uncompressed size          | 8    |
//! | 24     | checkpoint spacing         | 8    |
//! | 32     | window size (= 32768)      | 4    |
//! | 36     | checkpoint count           | 4    |
//! | 40     | checkpoint table           | count x 24 |
//! | ...    | windows, in table order    | variable   |
//!
//! Each table entry is `{ compressed bit offset: 8, uncompressed byte
//! offset: 8, stored window size: 4, window flags: 4 }` where flag bit 0
//! marks a deflate-compressed window. A stored window size of zero means
//! the seed is empty because the checkpoint sits at a gzip member header.

use std::io::{Read, Write};

use bit_field::BitField;
use lebe::prelude::*;

use crate::chunk::Window;
use crate::error::{Error, Result, UnitResult, usize_to_u64};


/// The first bytes of every index file.
pub const MAGIC_BYTES: [u8; 6] = *b"GZIDX\0";

/// The only version this implementation reads and writes.
pub const FORMAT_VERSION: u8 = 1;

const WINDOW_FLAG_COMPRESSED: usize = 0;


/// One random-access point into the compressed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {

    /// Bit-precise position in the compressed stream. Either a deflate
    /// block boundary, or a member header when the window is empty.
    pub compressed_bit_offset: u64,

    /// Position in the uncompressed output that decoding from this
    /// checkpoint continues at.
    pub uncompressed_byte_offset: u64,

    /// The sliding window preceding the uncompressed offset.
    pub window: Window,
}

/// A complete index over one compressed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GzipIndex {
    pub compressed_size: u64,
    pub uncompressed_size: u64,

    /// The requested distance between checkpoints. Actual distances may be
    /// larger because checkpoints only sit on block boundaries.
    pub checkpoint_spacing: u64,

    /// Ordered by uncompressed offset, strictly increasing,
    /// starting at offset zero.
    pub checkpoints: Vec<Checkpoint>,
}

impl GzipIndex {

    /// The latest checkpoint at or before the given uncompressed offset.
    pub fn checkpoint_before(&self, uncompressed_offset: u64) -> Option<&Checkpoint> {
        let index = self.checkpoints
            .partition_point(|checkpoint| checkpoint.uncompressed_byte_offset <= uncompressed_offset);

        index.checked_sub(1).map(|index| &self.checkpoints[index])
    }

    fn validate(&self) -> UnitResult {
        if let Some(first) = self.checkpoints.first() {
            if first.uncompressed_byte_offset != 0 {
                return Err(Error::invalid("index must start at uncompressed offset zero"));
            }
        }

        let offsets_increase = self.checkpoints.windows(2).all(|pair|
            pair[0].uncompressed_byte_offset < pair[1].uncompressed_byte_offset
            && pair[0].compressed_bit_offset < pair[1].compressed_bit_offset);

        if !offsets_increase {
            return Err(Error::invalid("index checkpoints must be strictly increasing"));
        }

        Ok(())
    }
}


/// Read and validate an index.
pub fn read_index(read: &mut impl Read) -> Result<GzipIndex> {
    let mut magic = [0_u8; MAGIC_BYTES.len()];
    read.read_exact(&mut magic)?;
    if magic != MAGIC_BYTES {
        return Err(Error::invalid("index file identifier missing"));
    }

    let version: u8 = read.read_from_little_endian()?;
    if version != FORMAT_VERSION {
        return Err(Error::invalid(format!("unsupported index version {}", version)));
    }

    let _reserved: u8 = read.read_from_little_endian()?;
    let compressed_size: u64 = read.read_from_little_endian()?;
    let uncompressed_size: u64 = read.read_from_little_endian()?;
    let checkpoint_spacing: u64 = read.read_from_little_endian()?;

    let window_size: u32 = read.read_from_little_endian()?;
    if window_size as usize != Window::MAX_SIZE {
        return Err(Error::invalid(format!("unsupported window size {}", window_size)));
    }

    let checkpoint_count: u32 = read.read_from_little_endian()?;

    struct TableEntry { compressed_bit_offset: u64, uncompressed_byte_offset: u64, stored_size: u32, flags: u32 }
    let mut table = Vec::with_capacity(checkpoint_count.min(1024) as usize);

    for _ in 0 .. checkpoint_count {
        table.push(TableEntry {
            compressed_bit_offset: read.read_from_little_endian()?,
            uncompressed_byte_offset: read.read_from_little_endian()?,
            stored_size: read.read_from_little_endian()?,
            flags: read.read_from_little_endian()?,
        });
    }

    let checkpoints = table.into_iter().map(|entry| {
        let mut stored = vec![0_u8; entry.stored_size as usize];
        read.read_exact(&mut stored)?;

        let window_bytes =
            if entry.flags.get_bit(WINDOW_FLAG_COMPRESSED) {
                miniz_oxide::inflate::decompress_to_vec_with_limit(&stored, Window::MAX_SIZE)
                    .map_err(|_| Error::invalid("checkpoint window deflate data"))?
            }
            else { stored };

        if window_bytes.len() > Window::MAX_SIZE {
            return Err(Error::invalid("checkpoint window exceeds the window size"));
        }

        Ok(Checkpoint {
            compressed_bit_offset: entry.compressed_bit_offset,
            uncompressed_byte_offset: entry.uncompressed_byte_offset,
            window: Window::from(window_bytes),
        })
    }).collect::<Result<Vec<_>>>()?;

    let index = GzipIndex {
        compressed_size,
        uncompressed_size,
        checkpoint_spacing,
        checkpoints,
    };

    index.validate()?;
    Ok(index)
}

/// Validate and write an index. Windows are stored deflate-compressed
/// whenever that is smaller than the raw bytes.
pub fn write_index(index: &GzipIndex, write: &mut impl Write) -> UnitResult {
    index.validate()?;

    write.write_all(&MAGIC_BYTES)?;
    write.write_as_little_endian(&FORMAT_VERSION)?;
    write.write_as_little_endian(&0_u8)?;
    write.write_as_little_endian(&index.compressed_size)?;
    write.write_as_little_endian(&index.uncompressed_size)?;
    write.write_as_little_endian(&index.checkpoint_spacing)?;
    write.write_as_little_endian(&(Window::MAX_SIZE as u32))?;

    let checkpoint_count = u32::try_from(index.checkpoints.len())
        .map_err(|_| Error::invalid("too many checkpoints for the index format"))?;
    write.write_as_little_endian(&checkpoint_count)?;

    // compress each window with an empty dictionary, keeping whichever
    // representation is smaller
    let stored_windows: Vec<(Vec<u8>, bool)> = index.checkpoints.iter().map(|checkpoint| {
        let raw = checkpoint.window.bytes();
        let compressed = miniz_oxide::deflate::compress_to_vec(raw, 6);

        if compressed.len() < raw.len() { (compressed, true) }
        else { (raw.to_vec(), false) }
    }).collect();

    for (checkpoint, (stored, is_compressed)) in index.checkpoints.iter().zip(&stored_windows) {
        let mut flags = 0_u32;
        flags.set_bit(WINDOW_FLAG_COMPRESSED, *is_compressed);

        write.write_as_little_endian(&checkpoint.compressed_bit_offset)?;
        write.write_as_little_endian(&checkpoint.uncompressed_byte_offset)?;
        write.write_as_little_endian(&(usize_to_u64(stored.len()) as u32))?;
        write.write_as_little_endian(&flags)?;
    }

    for (stored, _) in &stored_windows {
        write.write_all(stored)?;
    }

    Ok(())
}

/// The number of bytes `write_index` will produce for this index.
pub fn written_index_size(index: &GzipIndex) -> usize {
    let windows: usize = index.checkpoints.iter()
        .map(|checkpoint| {
            let raw = checkpoint.window.bytes();
            let compressed = miniz_oxide::deflate::compress_to_vec(raw, 6);
            compressed.len().min(raw.len())
        })
        .sum();

    40 + index.checkpoints.len() * 24 + windows
}


#[cfg(test)]
mod test {
    use super::*;

    fn example_index() -> GzipIndex {
        let window: Vec<u8> = (0 .. Window::MAX_SIZE).map(|index| (index % 256) as u8).collect();

        GzipIndex {
            compressed_size: 123_456,
            uncompressed_size: 654_321,
            checkpoint_spacing: 64 * 1024,
            checkpoints: vec![
                Checkpoint {
                    compressed_bit_offset: 80,
                    uncompressed_byte_offset: 0,
                    window: Window::empty(),
                },
                Checkpoint {
                    compressed_bit_offset: 400_001,
                    uncompressed_byte_offset: 100_000,
                    window: Window::from(window),
                },
                Checkpoint {
                    compressed_bit_offset: 800_003,
                    uncompressed_byte_offset: 200_000,
                    window: Window::from(vec![42; 1000]),
                },
            ],
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let index = example_index();

        let mut bytes = Vec::new();
        write_index(&index, &mut bytes).unwrap();
        assert_eq!(bytes.len(), written_index_size(&index));

        let reread = read_index(&mut bytes.as_slice()).unwrap();
        assert_eq!(reread, index);

        // and once more, to make sure writing is deterministic
        let mut again = Vec::new();
        write_index(&reread, &mut again).unwrap();
        assert_eq!(again, bytes);
    }

    #[test]
    fn rejects_corrupted_headers() {
        let mut bytes = Vec::new();
        write_index(&example_index(), &mut bytes).unwrap();

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(read_index(&mut wrong_magic.as_slice()).is_err());

        let mut wrong_version = bytes.clone();
        wrong_version[6] = 9;
        assert!(read_index(&mut wrong_version.as_slice()).is_err());

        let mut wrong_window_size = bytes;
        wrong_window_size[33] = 0; // 32768 -> 0 in the window size field
        assert!(read_index(&mut wrong_window_size.as_slice()).is_err());
    }

    #[test]
    fn rejects_unordered_checkpoints() {
        let mut index = example_index();
        index.checkpoints.swap(1, 2);

        let mut bytes = Vec::new();
        assert!(write_index(&index, &mut bytes).is_err());
    }

    #[test]
    fn locates_the_checkpoint_before_an_offset() {
        let index = example_index();

        assert_eq!(index.checkpoint_before(0).unwrap().uncompressed_byte_offset, 0);
        assert_eq!(index.checkpoint_before(99_999).unwrap().uncompressed_byte_offset, 0);
        assert_eq!(index.checkpoint_before(100_000).unwrap().uncompressed_byte_offset, 100_000);
        assert_eq!(index.checkpoint_before(1_000_000).unwrap().uncompressed_byte_offset, 200_000);

        let empty = GzipIndex { checkpoints: Vec::new(), .. index };
        assert!(empty.checkpoint_before(50).is_none());
    }
}
