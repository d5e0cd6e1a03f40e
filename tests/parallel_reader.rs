
//! End-to-end tests of the parallel reader against a reference decoder.

use std::io::{Read, Write};

use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use pargz::prelude::*;


fn gzipped(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn reference_decode(compressed: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::new();
    flate2::read::MultiGzDecoder::new(compressed).read_to_end(&mut decoded).unwrap();
    decoded
}

/// Text-like data in the spirit of base64 output: compressible enough for
/// dynamic blocks, incompressible enough for many of them.
fn base64_like(length: usize, seed: u64) -> Vec<u8> {
    let alphabet = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut random = StdRng::seed_from_u64(seed);
    (0 .. length).map(|_| alphabet[random.random_range(0 .. alphabet.len())]).collect()
}

/// Options that force several chunks even for small test inputs.
fn small_chunk_options(threads: usize) -> ReaderOptions {
    ReaderOptions::default()
        .with_thread_count(threads)
        .with_chunk_size(8 * 1024)
}

fn parallel_decode(compressed: &[u8], options: ReaderOptions) -> Vec<u8> {
    let mut reader = ParallelGzipReader::with_options(
        Box::new(BufferViewReader::new(compressed.to_vec())), options);

    let mut decoded = Vec::new();
    Read::read_to_end(&mut reader, &mut decoded).unwrap();
    decoded
}


#[test]
fn two_concatenated_members_read_as_one_stream() {
    let mut compressed = gzipped(b"A");
    compressed.extend_from_slice(&gzipped(b"A"));

    let mut reader = ParallelGzipReader::from_bytes(compressed);
    let mut bytes = [0_u8; 2];
    assert_eq!(reader.read(&mut bytes).unwrap(), 2);
    assert_eq!(&bytes, b"AA");

    assert_eq!(reader.read(&mut bytes).unwrap(), 0);
    assert!(reader.eof());
    assert_eq!(reader.known_size(), Some(2));
}

#[test_log::test]
fn reads_a_large_stream_completely() {
    let data = base64_like(256 * 1024, 1);
    let compressed = gzipped(&data);
    assert_eq!(reference_decode(&compressed), data, "reference encoder sanity");

    let decoded = parallel_decode(&compressed, small_chunk_options(4));
    assert_eq!(decoded.len(), 262_144);
    assert_eq!(decoded, data);
}

#[test]
fn output_is_identical_across_thread_counts() {
    let data = base64_like(256 * 1024, 2);
    let compressed = gzipped(&data);

    for threads in [1, 2, 4, 16] {
        let decoded = parallel_decode(&compressed, small_chunk_options(threads));
        assert_eq!(decoded, data, "{} threads changed the output", threads);
    }
}

#[test]
fn run_length_patterns_survive_parallel_decoding() {
    let data = b"AAAAAAABBBBBBB";
    let decoded = parallel_decode(&gzipped(data), small_chunk_options(4));
    assert_eq!(decoded, data);
}

#[test]
fn highly_repetitive_data_resolves_markers_across_chunks() {
    // long runs produce back-references that reach far behind chunk starts
    let mut data = Vec::new();
    let mut random = StdRng::seed_from_u64(3);
    while data.len() < 512 * 1024 {
        let run_length = random.random_range(1 .. 2000_usize);
        let byte = random.random_range(b'a' ..= b'z');
        data.extend(std::iter::repeat(byte).take(run_length));
    }

    let compressed = gzipped(&data);
    let decoded = parallel_decode(&compressed, small_chunk_options(4).with_chunk_size(4 * 1024));
    assert_eq!(decoded, data);
}

#[test]
fn random_binary_data_round_trips() {
    let mut random = StdRng::seed_from_u64(4);
    let data: Vec<u8> = (0 .. 300_000).map(|_| random.random()).collect();

    let decoded = parallel_decode(&gzipped(&data), small_chunk_options(4));
    assert_eq!(decoded, data);
}

#[test]
fn an_empty_member_decodes_to_nothing() {
    let compressed = gzipped(b"");

    let mut reader = ParallelGzipReader::from_bytes(compressed);
    assert_eq!(reader.read(&mut [0; 16]).unwrap(), 0);
    assert!(reader.eof());
    assert_eq!(reader.known_size(), Some(0));
}

#[test]
fn seeking_matches_slices_of_the_reference_output() {
    let data = base64_like(200 * 1024, 5);
    let compressed = gzipped(&data);

    let mut reader = ParallelGzipReader::with_options(
        Box::new(BufferViewReader::new(compressed)), small_chunk_options(4));

    let mut random = StdRng::seed_from_u64(6);
    for _ in 0 .. 20 {
        let offset = random.random_range(0 .. data.len());
        let length = random.random_range(0 .. 10_000_usize);

        reader.seek(offset as u64);
        let mut slice = vec![0_u8; length];
        let read = reader.read(&mut slice).unwrap();
        slice.truncate(read);

        let expected_end = (offset + length).min(data.len());
        assert_eq!(slice, &data[offset .. expected_end], "slice at offset {}", offset);
    }

    // a seek past the end reads nothing
    reader.seek(u64::MAX);
    assert_eq!(reader.read(&mut [0; 8]).unwrap(), 0);
}

#[test]
fn each_chunk_is_decoded_at_most_once_while_streaming() {
    let data = base64_like(256 * 1024, 7);
    let compressed = gzipped(&data);

    let mut options = small_chunk_options(4);
    options.cache_capacity = 1024; // nothing gets evicted in this test

    let mut reader = ParallelGzipReader::with_options(
        Box::new(BufferViewReader::new(compressed)), options);

    let mut decoded = Vec::new();
    Read::read_to_end(&mut reader, &mut decoded).unwrap();
    assert_eq!(decoded, data);

    let statistics = reader.statistics();
    assert!(statistics.spawned_decode_tasks > 1, "expected parallel chunked decoding");
    assert_eq!(statistics.max_decodes_per_chunk, 1);
}

#[test]
fn truncated_streams_error_instead_of_hanging() {
    let data = base64_like(64 * 1024, 8);
    let mut compressed = gzipped(&data);
    compressed.truncate(compressed.len() / 2);

    let mut reader = ParallelGzipReader::from_bytes(compressed);
    let mut decoded = Vec::new();
    assert!(Read::read_to_end(&mut reader, &mut decoded).is_err());
}

#[test]
fn corrupted_member_checksums_are_detected() {
    let data = base64_like(16 * 1024, 9);
    let mut compressed = gzipped(&data);

    // flip a bit inside the footer's CRC32
    let footer_crc_byte = compressed.len() - 8;
    compressed[footer_crc_byte] ^= 0x01;

    let mut reader = ParallelGzipReader::from_bytes(compressed.clone());
    let mut decoded = Vec::new();
    let error = Read::read_to_end(&mut reader, &mut decoded).unwrap_err();
    assert!(error.to_string().contains("checksum"), "unexpected error: {}", error);

    // with verification disabled, the bytes come through regardless
    let options = ReaderOptions::default().with_checksum_verification(false);
    assert_eq!(parallel_decode(&compressed, options), data);
}

#[test]
fn reads_through_a_shared_file_reader_from_disk() {
    let data = base64_like(128 * 1024, 10);
    let compressed = gzipped(&data);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&compressed).unwrap();
    file.flush().unwrap();

    let standard = StandardFileReader::open(file.path()).unwrap();
    let shared = SharedFileReader::new(Box::new(standard));

    let mut reader = ParallelGzipReader::with_options(
        Box::new(shared), small_chunk_options(2));

    let mut decoded = Vec::new();
    Read::read_to_end(&mut reader, &mut decoded).unwrap();
    assert_eq!(decoded, data);
}

#[test]
fn std_io_seek_composes_with_read() {
    use std::io::{Seek, SeekFrom};

    let data = base64_like(64 * 1024, 11);
    let compressed = gzipped(&data);

    let mut reader = ParallelGzipReader::from_bytes(compressed);

    Seek::seek(&mut reader, SeekFrom::End(-100)).unwrap();
    let mut tail = Vec::new();
    Read::read_to_end(&mut reader, &mut tail).unwrap();
    assert_eq!(tail, &data[data.len() - 100 ..]);

    Seek::seek(&mut reader, SeekFrom::Start(10)).unwrap();
    let mut ten = [0_u8; 10];
    reader.read(&mut ten).unwrap();
    assert_eq!(ten, data[10 .. 20]);
}
