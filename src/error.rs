
//! All error types that this crate produces.
//! Decoding hot paths carry the lightweight [`DecodeError`] kind,
//! which the public [`Error`] wraps.

use std::fmt;

/// A result that may contain a pargz error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains a pargz error.
pub type UnitResult = Result<()>;

pub use std::io::Error as IoError;
pub use std::io::Result as IoResult;


/// An error produced while locating, decoding, or stitching compressed data.
#[derive(Debug)]
pub enum Error {

    /// A format level failure with a precise kind.
    /// During block finder probing these refute a candidate instead of surfacing.
    Decode(DecodeError),

    /// The data is not as expected, for example a checksum mismatch
    /// or an index file that contradicts itself.
    Invalid(String),

    /// The feature is not supported by this implementation.
    NotSupported(String),

    /// The underlying byte source failed.
    /// This can also occur when reading truncated files,
    /// where the number of bytes to read exceeds the input stream length.
    Io(IoError),
}


/// The exact kind of a format level decoding failure.
/// These are `Copy` so that candidate probing and end-of-stream signalling
/// never allocate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {

    /// No more bits in the stream. Non-fatal at a member boundary,
    /// where it signals normal completion.
    EndOfFile,

    /// End of file encountered while copying a stored block.
    EofUncompressed,

    /// A code length exceeds the maximum possible value.
    ExceededClLimit,

    /// Invalid number of literal/length codes.
    ExceededLiteralRange,

    /// Invalid number of distance codes.
    ExceededDistanceRange,

    /// The back-referenced distance lies outside the window buffer.
    ExceededWindowRange,

    /// Failed to decode Huffman bits.
    InvalidHuffmanCode,

    /// Assumed padding seems to contain some kind of data.
    NonZeroPadding,

    /// Integrity check for the length of an uncompressed block failed.
    LengthChecksumMismatch,

    /// Invalid block compression type.
    InvalidCompression,

    /// Cannot copy the previous code length because this is the first one.
    InvalidClBackreference,

    /// Back-referenced data does not exist.
    InvalidBackreference,

    /// All code lengths are zero.
    EmptyAlphabet,

    /// Constructing a Huffman coding from the given code length sequence failed.
    InvalidCodeLengths,

    /// The Huffman coding is not optimal.
    BloatingHuffmanCoding,

    /// Invalid gzip magic bytes or header fields.
    InvalidGzipHeader,

    /// End of file encountered inside a gzip header.
    IncompleteGzipHeader,

    /// A block is the last of its stream even though it should not be.
    UnexpectedLastBlock,
}


impl Error {

    /// Create an error of the variant `Invalid`.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::Invalid(message.into())
    }

    /// Create an error of the variant `Decode`.
    pub(crate) fn decode(kind: DecodeError) -> Self {
        Error::Decode(kind)
    }

    /// Whether this is the distinguished end-of-stream signal.
    pub fn is_end_of_file(&self) -> bool {
        matches!(self, Error::Decode(DecodeError::EndOfFile))
    }

    /// Errors are stored in shared chunk slots and may be observed
    /// by every reader waiting on the same chunk.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Error::Decode(kind) => Error::Decode(*kind),
            Error::Invalid(message) => Error::Invalid(message.clone()),
            Error::NotSupported(message) => Error::NotSupported(message.clone()),
            Error::Io(error) => Error::Io(IoError::new(error.kind(), error.to_string())),
        }
    }
}


/// Enable using the `?` operator on `io::Result`.
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::Io(error)
    }
}

impl From<DecodeError> for Error {
    fn from(kind: DecodeError) -> Self {
        Error::Decode(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(kind) => write!(formatter, "{}", kind),
            Error::Invalid(message) => write!(formatter, "invalid data: {}", message),
            Error::NotSupported(message) => write!(formatter, "not supported: {}", message),
            Error::Io(error) => write!(formatter, "io error: {}", error),
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            DecodeError::EndOfFile => "end of stream reached",
            DecodeError::EofUncompressed =>
                "end of stream encountered while copying an uncompressed block",
            DecodeError::ExceededClLimit =>
                "a code length exceeds the maximum possible value",
            DecodeError::ExceededLiteralRange => "invalid number of literal/length codes",
            DecodeError::ExceededDistanceRange => "invalid number of distance codes",
            DecodeError::ExceededWindowRange =>
                "the back-referenced distance lies outside the window buffer",
            DecodeError::InvalidHuffmanCode => "failed to decode huffman bits",
            DecodeError::NonZeroPadding => "assumed padding contains data",
            DecodeError::LengthChecksumMismatch =>
                "length integrity check of an uncompressed block failed",
            DecodeError::InvalidCompression => "invalid block compression type",
            DecodeError::InvalidClBackreference =>
                "cannot repeat the previous code length because this is the first one",
            DecodeError::InvalidBackreference => "back-referenced data does not exist",
            DecodeError::EmptyAlphabet => "all code lengths are zero",
            DecodeError::InvalidCodeLengths =>
                "the code length sequence does not describe a huffman coding",
            DecodeError::BloatingHuffmanCoding => "the huffman coding is not optimal",
            DecodeError::InvalidGzipHeader => "invalid gzip magic bytes or header fields",
            DecodeError::IncompleteGzipHeader => "end of stream inside a gzip header",
            DecodeError::UnexpectedLastBlock =>
                "a block is the last of its stream even though it should not be",
        })
    }
}

impl std::error::Error for Error {}


/// Panics on incompatible machines. All 64-bit machines are compatible.
pub(crate) fn u64_to_usize(value: u64) -> usize {
    usize::try_from(value).expect("(u64 as usize) overflowed")
}

/// Panics on incompatible machines. All 64-bit machines are compatible.
pub(crate) fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}
