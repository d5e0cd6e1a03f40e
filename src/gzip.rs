
//! Gzip member framing per RFC 1952: the member header with its optional
//! fields, and the CRC32 + ISIZE footer. Multiple concatenated members,
//! as emitted by bgzf and `cat a.gz b.gz`, are handled by the chunk decoder
//! calling back into this module after every final block.

use bit_field::BitField;

use crate::bits::BitReader;
use crate::error::{DecodeError, Error, Result};


/// The first two bytes of every gzip member.
pub const MAGIC_BYTES: [u8; 2] = [0x1f, 0x8b];

/// The only compression method gzip ever assigned.
const METHOD_DEFLATE: u8 = 8;

const FLAG_HEADER_CRC: usize = 1;
const FLAG_EXTRA: usize = 2;
const FLAG_NAME: usize = 3;
const FLAG_COMMENT: usize = 4;


/// The fields of a decoded member header that callers may care about.
/// Optional name, comment, and extra fields are validated and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberHeader {

    /// Modification time of the original file, or zero.
    pub modification_time: u32,

    /// Identifier of the file system the member was created on.
    pub operating_system: u8,
}

/// The eight bytes that terminate every gzip member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberFooter {

    /// CRC32 of the uncompressed member contents.
    pub crc32: u32,

    /// Uncompressed member size modulo 2^32.
    pub uncompressed_size: u32,
}


/// Parse a member header at the current byte-aligned position.
///
/// End of stream at the very first byte surfaces as `EndOfFile` so callers
/// can treat it as normal stream completion; running out of data anywhere
/// later is `IncompleteGzipHeader`.
pub fn read_member_header(bits: &mut BitReader) -> Result<MemberHeader> {
    debug_assert_eq!(bits.tell() % 8, 0, "gzip members are byte aligned");

    let first_magic = bits.read(8)? as u8;
    let second_magic = read_header_byte(bits)?;
    if [first_magic, second_magic] != MAGIC_BYTES {
        return Err(DecodeError::InvalidGzipHeader.into());
    }

    if read_header_byte(bits)? != METHOD_DEFLATE {
        return Err(DecodeError::InvalidGzipHeader.into());
    }

    let flags = read_header_byte(bits)?;
    if flags.get_bits(5 .. 8) != 0 {
        // reserved flag bits must be zero
        return Err(DecodeError::InvalidGzipHeader.into());
    }

    let modification_time = truncate_eof(bits.read(32))? as u32;
    let _extra_flags = read_header_byte(bits)?;
    let operating_system = read_header_byte(bits)?;

    if flags.get_bit(FLAG_EXTRA) {
        let extra_length = truncate_eof(bits.read(16))?;
        for _ in 0 .. extra_length { read_header_byte(bits)?; }
    }

    if flags.get_bit(FLAG_NAME) { skip_zero_terminated(bits)?; }
    if flags.get_bit(FLAG_COMMENT) { skip_zero_terminated(bits)?; }

    if flags.get_bit(FLAG_HEADER_CRC) {
        // CRC16 over the header; present but not verified
        truncate_eof(bits.read(16))?;
    }

    Ok(MemberHeader { modification_time, operating_system })
}

/// Parse the footer following a member's final block.
/// The reader must already be byte aligned.
pub fn read_member_footer(bits: &mut BitReader) -> Result<MemberFooter> {
    debug_assert_eq!(bits.tell() % 8, 0, "gzip footers are byte aligned");

    Ok(MemberFooter {
        crc32: bits.read(32)? as u32,
        uncompressed_size: bits.read(32)? as u32,
    })
}

fn read_header_byte(bits: &mut BitReader) -> Result<u8> {
    Ok(truncate_eof(bits.read(8))? as u8)
}

fn skip_zero_terminated(bits: &mut BitReader) -> Result<()> {
    while read_header_byte(bits)? != 0 {}
    Ok(())
}

/// Inside a header, running out of bytes means the header is truncated.
fn truncate_eof(result: Result<u64>) -> Result<u64> {
    result.map_err(|error| match error {
        Error::Decode(DecodeError::EndOfFile) => DecodeError::IncompleteGzipHeader.into(),
        other => other,
    })
}


#[cfg(test)]
mod test {
    use super::*;
    use crate::io::BufferViewReader;

    fn bit_reader(bytes: Vec<u8>) -> BitReader {
        BitReader::new(Box::new(BufferViewReader::new(bytes)))
    }

    #[test]
    fn parses_a_minimal_header() {
        let bytes = vec![0x1f, 0x8b, 8, 0, 0x78, 0x56, 0x34, 0x12, 0, 3];
        let header = read_member_header(&mut bit_reader(bytes)).unwrap();

        assert_eq!(header.modification_time, 0x12345678);
        assert_eq!(header.operating_system, 3);
    }

    #[test]
    fn skips_name_extra_and_header_checksum() {
        let mut bytes = vec![0x1f, 0x8b, 8, 0b0001_1110, 0, 0, 0, 0, 0, 255];
        bytes.extend_from_slice(&3_u16.to_le_bytes()); // XLEN
        bytes.extend_from_slice(&[1, 2, 3]);           // extra field
        bytes.extend_from_slice(b"name\0");
        bytes.extend_from_slice(b"comment\0");
        bytes.extend_from_slice(&[0xAA, 0xBB]);        // header crc
        bytes.push(0x77);                              // first payload byte

        let mut bits = bit_reader(bytes);
        read_member_header(&mut bits).unwrap();
        assert_eq!(bits.read(8).unwrap(), 0x77);
    }

    #[test]
    fn rejects_wrong_magic_and_method() {
        let error = read_member_header(&mut bit_reader(vec![0x1f, 0x8c, 8, 0])).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::InvalidGzipHeader)));

        let error = read_member_header(&mut bit_reader(vec![0x1f, 0x8b, 7, 0])).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::InvalidGzipHeader)));
    }

    #[test]
    fn distinguishes_truncation_from_completion() {
        let error = read_member_header(&mut bit_reader(vec![])).unwrap_err();
        assert!(error.is_end_of_file());

        let error = read_member_header(&mut bit_reader(vec![0x1f, 0x8b, 8])).unwrap_err();
        assert!(matches!(error, Error::Decode(DecodeError::IncompleteGzipHeader)));
    }

    #[test]
    fn reads_the_footer() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0xDEAD_BEEF_u32.to_le_bytes());
        bytes.extend_from_slice(&1024_u32.to_le_bytes());

        let footer = read_member_footer(&mut bit_reader(bytes)).unwrap();
        assert_eq!(footer.crc32, 0xDEAD_BEEF);
        assert_eq!(footer.uncompressed_size, 1024);
    }
}
