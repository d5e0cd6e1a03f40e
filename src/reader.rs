
//! The parallel reader: finds chunk boundaries, dispatches decode tasks,
//! stitches the results back into strictly sequential output, and serves
//! random access through sealed chunks and index checkpoints.
//!
//! Chunks may finish decoding in any order, but a chunk's position in the
//! uncompressed output is assigned only once its predecessor is sealed,
//! so the bytes handed to the caller are exactly what a serial decoder
//! would produce.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use log::{debug, trace};

use crate::cache::{Cache, CacheStatistics};
use crate::chunk::{decode_chunk, ChunkRequest, DecodedChunk, ResolvedChunk, Window};
use crate::error::{DecodeError, Error, Result, UnitResult, u64_to_usize, usize_to_u64};
use crate::find::BlockFinder;
use crate::index::{Checkpoint, GzipIndex};
use crate::io::{FileReader, StandardFileReader, BufferViewReader};
use crate::pool::ThreadPool;


/// Tuning knobs for a [`ParallelGzipReader`].
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {

    /// Number of decode worker threads.
    pub thread_count: usize,

    /// Target compressed size of one chunk, in bytes.
    pub chunk_size: u64,

    /// Number of decoded chunks kept around, including in-flight ones.
    pub cache_capacity: usize,

    /// Whether to compare each gzip member's CRC32 and length against its
    /// footer. Only possible while reading sequentially from the start.
    pub verify_checksums: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        let thread_count = num_cpus::get();
        Self {
            thread_count,
            chunk_size: 4 * 1024 * 1024,
            cache_capacity: 4 * thread_count,
            verify_checksums: true,
        }
    }
}

impl ReaderOptions {

    pub fn with_thread_count(self, thread_count: usize) -> Self {
        let thread_count = thread_count.max(1);
        Self { thread_count, cache_capacity: self.cache_capacity.max(4 * thread_count), .. self }
    }

    pub fn with_chunk_size(self, chunk_size: u64) -> Self {
        Self { chunk_size: chunk_size.max(1), .. self }
    }

    pub fn with_checksum_verification(self, verify_checksums: bool) -> Self {
        Self { verify_checksums, .. self }
    }
}


/// Usage counters of a reader, for tests and tuning.
#[derive(Debug, Clone, Copy)]
pub struct ReaderStatistics {
    pub cache: CacheStatistics,

    /// Total decode tasks handed to the thread pool.
    pub spawned_decode_tasks: u64,

    /// The most decode tasks ever dispatched for a single chunk offset.
    /// Stays at one unless entries are evicted and decoded again.
    pub max_decodes_per_chunk: u64,
}


// ------------------------------------------------------------------------
// chunk slots: condition-variable backed futures shared between the
// cache, the decode workers, and waiting readers
// ------------------------------------------------------------------------

#[derive(Debug)]
enum SlotState {
    Pending,
    Raw(Arc<DecodedChunk>),
    Resolved(Arc<ResolvedChunk>),
    Failed(Error),
}

/// What a waiting reader receives from a slot.
#[derive(Debug, Clone)]
enum ChunkPayload {
    Raw(Arc<DecodedChunk>),
    Resolved(Arc<ResolvedChunk>),
}

#[derive(Debug)]
struct ChunkSlot {
    state: Mutex<SlotState>,
    finished: Condvar,
}

impl ChunkSlot {

    fn pending() -> Self {
        Self { state: Mutex::new(SlotState::Pending), finished: Condvar::new() }
    }

    /// Called by the decode worker exactly once.
    fn complete(&self, result: Result<DecodedChunk>) {
        let mut state = self.state.lock().expect("chunk slot lock poisoned");

        if matches!(*state, SlotState::Pending) {
            *state = match result {
                Ok(decoded) => SlotState::Raw(Arc::new(decoded)),
                Err(error) => SlotState::Failed(error),
            };
        }

        self.finished.notify_all();
    }

    /// Replace the raw marker buffer with its resolved bytes, so later
    /// readers of this chunk skip marker resolution.
    fn store_resolved(&self, resolved: Arc<ResolvedChunk>) {
        let mut state = self.state.lock().expect("chunk slot lock poisoned");
        *state = SlotState::Resolved(resolved);
        self.finished.notify_all();
    }

    /// Block until the decode task has finished.
    fn wait(&self) -> Result<ChunkPayload> {
        let mut state = self.state.lock().expect("chunk slot lock poisoned");

        loop {
            match &*state {
                SlotState::Pending =>
                    state = self.finished.wait(state).expect("chunk slot lock poisoned"),

                SlotState::Raw(decoded) => return Ok(ChunkPayload::Raw(decoded.clone())),
                SlotState::Resolved(resolved) => return Ok(ChunkPayload::Resolved(resolved.clone())),
                SlotState::Failed(error) => return Err(error.duplicate()),
            }
        }
    }
}


/// Owns the thread pool and the chunk cache. Guarantees at most one
/// concurrent decode task per chunk start bit: the cache lock is held
/// across the lookup-or-insert decision, never across decode work.
struct ChunkFetcher {
    pool: ThreadPool,
    slots: Mutex<Cache<u64, Arc<ChunkSlot>>>,
    spawn_counts: Mutex<HashMap<u64, u64>>,
}

impl ChunkFetcher {

    fn new(thread_count: usize, cache_capacity: usize) -> Self {
        Self {
            pool: ThreadPool::new(thread_count),
            slots: Mutex::new(Cache::new(cache_capacity.max(2))),
            spawn_counts: Mutex::new(HashMap::new()),
        }
    }

    /// Return the existing or in-flight entry for this start bit,
    /// or insert a pending entry and submit a decode task.
    fn get_or_spawn(
        &self, request: ChunkRequest,
        open_reader: impl FnOnce() -> Box<dyn FileReader>,
    ) -> Arc<ChunkSlot>
    {
        let mut slots = self.slots.lock().expect("chunk cache lock poisoned");
        if let Some(slot) = slots.get(&request.start_bit) {
            return slot;
        }

        let slot = Arc::new(ChunkSlot::pending());
        slots.insert(request.start_bit, slot.clone());
        drop(slots);

        *self.spawn_counts.lock().expect("spawn counter lock poisoned")
            .entry(request.start_bit).or_insert(0) += 1;

        trace!("dispatching decode task for chunk at bit {}", request.start_bit);

        let source = open_reader();
        let task_slot = slot.clone();
        let _completion = self.pool.submit(move || {
            // a panicking decoder must still release everyone waiting on the slot
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(
                || decode_chunk(source, request)));

            task_slot.complete(result.unwrap_or_else(|_|
                Err(Error::invalid("chunk decoder panicked"))));
        });

        slot
    }

    /// Drop an entry whose contents turned out to be wrong.
    /// Must not be called while other readers still consume the entry.
    fn invalidate(&self, start_bit: u64) {
        self.slots.lock().expect("chunk cache lock poisoned").remove(&start_bit);
    }

    fn statistics(&self) -> ReaderStatistics {
        let counts = self.spawn_counts.lock().expect("spawn counter lock poisoned");
        ReaderStatistics {
            cache: self.slots.lock().expect("chunk cache lock poisoned").statistics(),
            spawned_decode_tasks: counts.values().sum(),
            max_decodes_per_chunk: counts.values().copied().max().unwrap_or(0),
        }
    }
}


// ------------------------------------------------------------------------
// chunker: partition points to verified block boundaries
// ------------------------------------------------------------------------

/// Partitions the compressed stream into chunks of approximately equal
/// compressed size by asking the block finder for the first verified
/// candidate at or after every partition point.
struct Chunker {
    finder: BlockFinder,
    chunk_size_bytes: u64,

    /// Memoized scan results per partition byte offset.
    partitions: HashMap<u64, Option<u64>>,
}

impl Chunker {

    fn new(chunk_size_bytes: u64) -> Self {
        Self {
            finder: BlockFinder::new(),
            chunk_size_bytes: chunk_size_bytes.max(1),
            partitions: HashMap::new(),
        }
    }

    /// The first verified block boundary after the given bit, located at or
    /// beyond the next partition point. `None` means the chunk extends to
    /// the end of the stream.
    fn next_boundary_after(&mut self, source: &dyn FileReader, bit: u64) -> Result<Option<u64>> {
        let partition = (bit / 8 / self.chunk_size_bytes + 1) * self.chunk_size_bytes;

        let candidate = match self.partitions.get(&partition) {
            Some(&memoized) => memoized,
            None => {
                let found = self.finder.next_candidate(source, partition * 8)?;
                debug!("partition at byte {}: candidate {:?}", partition, found);
                self.partitions.insert(partition, found);
                found
            },
        };

        debug_assert!(candidate.map_or(true, |found| found > bit));
        Ok(candidate)
    }
}


// ------------------------------------------------------------------------
// sealing
// ------------------------------------------------------------------------

/// A point from which sequential decoding can continue: the complete
/// decoder state after some prefix of the uncompressed output.
#[derive(Debug, Clone)]
struct Anchor {
    end_bit: u64,
    uncompressed_end: u64,
    tail_window: Arc<Window>,

    /// Whether `end_bit` points at a gzip member header.
    at_member_start: bool,
}

impl Anchor {
    fn stream_start() -> Self {
        Self {
            end_bit: 0,
            uncompressed_end: 0,
            tail_window: Arc::new(Window::empty()),
            at_member_start: true,
        }
    }
}

/// A chunk whose place in the uncompressed output is known.
/// Keeps both boundary windows alive so evicted chunk contents
/// can be decoded again at any time.
#[derive(Debug, Clone)]
struct SealedChunk {
    start_bit: u64,
    end_bit: u64,
    uncompressed_start: u64,
    length: u64,
    seed_window: Arc<Window>,
    tail_window: Arc<Window>,
    at_member_start: bool,
    ends_stream: bool,
}

impl SealedChunk {

    fn uncompressed_end(&self) -> u64 {
        self.uncompressed_start + self.length
    }

    fn contains(&self, offset: u64) -> bool {
        offset >= self.uncompressed_start && offset < self.uncompressed_end()
    }

    fn request(&self) -> ChunkRequest {
        ChunkRequest {
            start_bit: self.start_bit,
            until_bit: self.end_bit,
            at_member_start: self.at_member_start,
        }
    }
}


// ------------------------------------------------------------------------
// the reader
// ------------------------------------------------------------------------

/// A seekable reader over a gzip or bgzf stream that decodes
/// independent chunks on multiple threads.
pub struct ParallelGzipReader {
    stream: Box<dyn FileReader>,
    options: ReaderOptions,
    fetcher: ChunkFetcher,
    chunker: Chunker,

    /// Chunks with assigned output positions, by uncompressed start offset.
    sealed: BTreeMap<u64, SealedChunk>,

    /// Decoder states to continue sealing from, by uncompressed offset.
    /// Also acts as the window store: each anchor holds the 32 KiB window
    /// of its boundary.
    continuations: BTreeMap<u64, Anchor>,

    /// Anchors from an imported index, sorted by uncompressed offset.
    checkpoints: Vec<(u64, Anchor)>,
    index_uncompressed_size: Option<u64>,

    /// The logical read cursor in the uncompressed output.
    position: u64,

    /// Known once a chunk sealed the end of the stream,
    /// or immediately from an imported index.
    total_size: Option<u64>,

    /// Checksum state for sequential verification.
    verified_until: u64,
    member_hasher: crc32fast::Hasher,
    member_length: u64,
}

impl ParallelGzipReader {

    /// Read from the given byte source with default options.
    pub fn new(stream: Box<dyn FileReader>) -> Self {
        Self::with_options(stream, ReaderOptions::default())
    }

    /// Read the file at the given path with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Box::new(StandardFileReader::open(path)?)))
    }

    /// Read from an in-memory buffer with default options.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Box::new(BufferViewReader::new(bytes)))
    }

    pub fn with_options(stream: Box<dyn FileReader>, options: ReaderOptions) -> Self {
        let mut continuations = BTreeMap::new();
        continuations.insert(0, Anchor::stream_start());

        Self {
            fetcher: ChunkFetcher::new(options.thread_count, options.cache_capacity),
            chunker: Chunker::new(options.chunk_size),
            sealed: BTreeMap::new(),
            continuations,
            checkpoints: Vec::new(),
            index_uncompressed_size: None,
            position: 0,
            total_size: None,
            verified_until: 0,
            member_hasher: crc32fast::Hasher::new(),
            member_length: 0,
            stream,
            options,
        }
    }

    /// The current position in the uncompressed output.
    pub fn tell(&self) -> u64 { self.position }

    /// Move the read cursor. Positions past the end are allowed
    /// and read zero bytes.
    pub fn seek(&mut self, uncompressed_offset: u64) {
        self.position = uncompressed_offset;
    }

    /// Whether the cursor is at or past the end of the uncompressed output.
    /// Only meaningful after the end of the stream has been discovered.
    pub fn eof(&self) -> bool {
        matches!(self.total_size, Some(total) if self.position >= total)
    }

    /// The total uncompressed size, if already known from an imported
    /// index or from having sealed the end of the stream.
    pub fn known_size(&self) -> Option<u64> { self.total_size }

    /// The total uncompressed size, sealing the remainder of the stream
    /// if it is not yet known.
    pub fn size(&mut self) -> Result<u64> {
        while self.total_size.is_none() {
            let anchor = self.best_anchor(u64::MAX);
            self.seal_next(anchor)?;
        }

        Ok(self.total_size.expect("stream size must be known after sealing the end"))
    }

    /// Usage counters for tests and tuning.
    pub fn statistics(&self) -> ReaderStatistics {
        self.fetcher.statistics()
    }

    /// Copy uncompressed bytes at the cursor into the buffer and advance.
    /// Returns the number of bytes delivered, which is less than the buffer
    /// size only at the end of the stream.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut written = 0;

        while written < buffer.len() {
            let position = self.position;
            let (chunk, resolved) = match self.chunk_at(position)? {
                Some(found) => found,
                None => break,
            };

            let offset_in_chunk = u64_to_usize(position - chunk.uncompressed_start);
            let count = (resolved.bytes.len() - offset_in_chunk).min(buffer.len() - written);

            buffer[written .. written + count]
                .copy_from_slice(&resolved.bytes[offset_in_chunk .. offset_in_chunk + count]);

            written += count;
            self.position += usize_to_u64(count);
        }

        Ok(written)
    }

    /// Use the checkpoints of an index instead of scanning for block
    /// boundaries, enabling O(1) seeks into not-yet-decoded regions.
    pub fn import_index(&mut self, index: GzipIndex) -> UnitResult {
        if index.compressed_size != self.stream.size() {
            return Err(Error::invalid("index does not match the compressed stream size"));
        }

        self.checkpoints = index.checkpoints.iter().map(|checkpoint| {
            let at_member_start = checkpoint.window.is_empty()
                && checkpoint.compressed_bit_offset % 8 == 0;

            (checkpoint.uncompressed_byte_offset, Anchor {
                end_bit: checkpoint.compressed_bit_offset,
                uncompressed_end: checkpoint.uncompressed_byte_offset,
                tail_window: Arc::new(checkpoint.window.clone()),
                at_member_start,
            })
        }).collect();

        self.index_uncompressed_size = Some(index.uncompressed_size);
        self.total_size = Some(index.uncompressed_size);
        Ok(())
    }

    /// Decode the whole stream and record a checkpoint at the first block
    /// boundary every `checkpoint_spacing` uncompressed bytes.
    pub fn export_index(&mut self, checkpoint_spacing: u64) -> Result<GzipIndex> {
        let spacing = checkpoint_spacing.max(1);

        // the stream itself starts at a member header with an empty window
        let mut checkpoints = vec![Checkpoint {
            compressed_bit_offset: 0,
            uncompressed_byte_offset: 0,
            window: Window::empty(),
        }];

        let mut position = 0;
        loop {
            let (chunk, resolved) = match self.chunk_at(position)? {
                Some(found) => found,
                None => break,
            };

            for block in &resolved.block_starts {
                let uncompressed_offset = chunk.uncompressed_start + usize_to_u64(block.output_offset);
                let previous = checkpoints.last().expect("first checkpoint always present");
                if uncompressed_offset < previous.uncompressed_byte_offset + spacing { continue; }

                let window = resolved.window_before(block.output_offset, &chunk.seed_window);

                // an empty window means the block opens a member,
                // so anchor at the member header instead
                let bit_offset =
                    if window.is_empty() {
                        resolved.member_ends.iter().rev()
                            .find(|member| member.output_offset == block.output_offset)
                            .map(|member| member.next_header_bit)
                            .or_else(|| (block.output_offset == 0 && chunk.at_member_start)
                                .then_some(chunk.start_bit))
                    }
                    else { Some(block.bit_offset) };

                if let Some(bit_offset) = bit_offset {
                    checkpoints.push(Checkpoint {
                        compressed_bit_offset: bit_offset,
                        uncompressed_byte_offset: uncompressed_offset,
                        window,
                    });
                }
            }

            if chunk.ends_stream { break; }
            position = chunk.uncompressed_end();
        }

        Ok(GzipIndex {
            compressed_size: self.stream.size(),
            uncompressed_size: self.size()?,
            checkpoint_spacing: spacing,
            checkpoints,
        })
    }

    /// The sealed chunk covering the given offset together with its
    /// decoded bytes, sealing further chunks as necessary.
    /// `None` once the offset is at or past the end of the stream.
    fn chunk_at(&mut self, position: u64) -> Result<Option<(SealedChunk, Arc<ResolvedChunk>)>> {
        loop {
            if let Some((_, chunk)) = self.sealed.range(..= position).next_back() {
                if chunk.contains(position) {
                    let chunk = chunk.clone();
                    let resolved = self.resolved_chunk(&chunk)?;
                    return Ok(Some((chunk, resolved)));
                }
            }

            if let Some(total) = self.total_size {
                if position >= total { return Ok(None); }
            }

            let anchor = self.best_anchor(position);
            self.seal_next(anchor)?;
        }
    }

    /// The latest state at or before the target offset that decoding can
    /// continue from: a sealed boundary, or an imported checkpoint when
    /// that skips further ahead.
    fn best_anchor(&self, position: u64) -> Anchor {
        let sealed_anchor = self.continuations.range(..= position).next_back()
            .map(|(_, anchor)| anchor.clone())
            .unwrap_or_else(Anchor::stream_start);

        let checkpoint_count = self.checkpoints
            .partition_point(|(offset, _)| *offset <= position);

        match checkpoint_count.checked_sub(1).map(|index| &self.checkpoints[index]) {
            Some((offset, checkpoint)) if *offset > sealed_anchor.uncompressed_end => {
                trace!("seeking via index checkpoint at offset {}", offset);
                checkpoint.clone()
            },
            _ => sealed_anchor,
        }
    }

    /// Decode and seal the chunk that begins at the anchor.
    fn seal_next(&mut self, anchor: Anchor) -> UnitResult {
        let start_bit = anchor.end_bit;
        let until_bit = self.chunker
            .next_boundary_after(self.stream.as_ref(), start_bit)?
            .unwrap_or(u64::MAX);

        let request = ChunkRequest {
            start_bit,
            until_bit,
            at_member_start: anchor.at_member_start,
        };

        let stream = &self.stream;
        let slot = self.fetcher.get_or_spawn(request, || stream.clone_reader());

        let resolved = match slot.wait() {
            Err(error) => {
                self.fetcher.invalidate(start_bit);
                return Err(error);
            },

            Ok(ChunkPayload::Resolved(resolved)) => resolved,

            Ok(ChunkPayload::Raw(decoded)) => match decoded.resolve(&anchor.tail_window) {
                Ok(resolved) => {
                    let resolved = Arc::new(resolved);
                    slot.store_resolved(resolved.clone());
                    resolved
                },
                Err(error) => {
                    self.fetcher.invalidate(start_bit);
                    return Err(error);
                },
            },
        };

        let sealed = SealedChunk {
            start_bit,
            end_bit: resolved.end_bit,
            uncompressed_start: anchor.uncompressed_end,
            length: resolved.len(),
            seed_window: anchor.tail_window.clone(),
            tail_window: resolved.tail_window.clone(),
            at_member_start: anchor.at_member_start,
            ends_stream: resolved.ends_stream,
        };

        debug!(
            "sealed chunk: bits {}..{} at uncompressed offset {}, {} bytes",
            sealed.start_bit, sealed.end_bit, sealed.uncompressed_start, sealed.length,
        );

        if self.options.verify_checksums && sealed.uncompressed_start == self.verified_until {
            self.verify_member_checksums(&resolved)?;
        }

        if sealed.ends_stream {
            let total = sealed.uncompressed_end();
            if let Some(expected) = self.index_uncompressed_size {
                if expected != total {
                    return Err(DecodeError::UnexpectedLastBlock.into());
                }
            }

            self.total_size = Some(total);
        }

        self.continuations.insert(sealed.uncompressed_end(), Anchor {
            end_bit: sealed.end_bit,
            uncompressed_end: sealed.uncompressed_end(),
            tail_window: sealed.tail_window.clone(),
            at_member_start: resolved.ends_at_member_start,
        });

        self.prefetch_following(sealed.end_bit);

        if sealed.length > 0 {
            self.sealed.insert(sealed.uncompressed_start, sealed);
        }

        Ok(())
    }

    /// The decoded bytes of a sealed chunk, decoding them again
    /// if the cache evicted them.
    fn resolved_chunk(&self, chunk: &SealedChunk) -> Result<Arc<ResolvedChunk>> {
        let stream = &self.stream;
        let slot = self.fetcher.get_or_spawn(chunk.request(), || stream.clone_reader());

        match slot.wait() {
            Ok(ChunkPayload::Resolved(resolved)) => Ok(resolved),

            Ok(ChunkPayload::Raw(decoded)) => {
                let resolved = Arc::new(decoded.resolve(&chunk.seed_window)?);
                slot.store_resolved(resolved.clone());
                Ok(resolved)
            },

            Err(error) => {
                self.fetcher.invalidate(chunk.start_bit);
                Err(error)
            },
        }
    }

    /// Speculatively decode the next few chunks so workers stay busy.
    /// Scan failures are ignored here; sealing will surface them.
    fn prefetch_following(&mut self, after_bit: u64) {
        let mut start = after_bit;

        for _ in 1 .. self.options.thread_count {
            let next = match self.chunker.next_boundary_after(self.stream.as_ref(), start) {
                Ok(Some(bit)) => bit,
                _ => break,
            };

            let until = match self.chunker.next_boundary_after(self.stream.as_ref(), next) {
                Ok(Some(bit)) => bit,
                _ => u64::MAX,
            };

            let request = ChunkRequest { start_bit: next, until_bit: until, at_member_start: false };
            let stream = &self.stream;
            self.fetcher.get_or_spawn(request, || stream.clone_reader());

            start = next;
        }
    }

    /// Feed the sealed bytes through the running per-member checksum and
    /// compare against every footer that ended inside this chunk.
    fn verify_member_checksums(&mut self, resolved: &ResolvedChunk) -> UnitResult {
        let mut segment_start = 0_usize;

        for member in &resolved.member_ends {
            self.member_hasher.update(&resolved.bytes[segment_start .. member.output_offset]);
            self.member_length += usize_to_u64(member.output_offset - segment_start);

            let hasher = std::mem::replace(&mut self.member_hasher, crc32fast::Hasher::new());
            let actual = hasher.finalize();

            if actual != member.crc32 {
                return Err(Error::invalid(format!(
                    "gzip member checksum mismatch (expected {:08x}, found {:08x})",
                    member.crc32, actual,
                )));
            }

            if self.member_length as u32 != member.uncompressed_size {
                return Err(Error::invalid("gzip member length does not match its footer"));
            }

            self.member_length = 0;
            segment_start = member.output_offset;
        }

        self.member_hasher.update(&resolved.bytes[segment_start ..]);
        self.member_length += usize_to_u64(resolved.bytes.len() - segment_start);
        self.verified_until += usize_to_u64(resolved.bytes.len());
        Ok(())
    }
}

impl fmt::Debug for ParallelGzipReader {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("ParallelGzipReader")
            .field("position", &self.position)
            .field("total_size", &self.total_size)
            .field("sealed_chunks", &self.sealed.len())
            .field("thread_count", &self.options.thread_count)
            .finish()
    }
}


// ------------------------------------------------------------------------
// std::io interoperability
// ------------------------------------------------------------------------

fn to_io_error(error: Error) -> std::io::Error {
    match error {
        Error::Io(io_error) => io_error,
        other => std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string()),
    }
}

impl std::io::Read for ParallelGzipReader {
    fn read(&mut self, buffer: &mut [u8]) -> std::io::Result<usize> {
        ParallelGzipReader::read(self, buffer).map_err(to_io_error)
    }
}

impl std::io::Seek for ParallelGzipReader {
    fn seek(&mut self, position: SeekFrom) -> std::io::Result<u64> {
        let target = match position {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(offset) => i128::from(self.position) + i128::from(offset),
            SeekFrom::End(offset) => {
                let size = self.size().map_err(to_io_error)?;
                i128::from(size) + i128::from(offset)
            },
        };

        self.position = u64::try_from(target).map_err(|_| std::io::Error::new(
            std::io::ErrorKind::InvalidInput, "seek before the start of the stream"))?;

        Ok(self.position)
    }
}
