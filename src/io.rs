
//! Seekable byte sources that every decoder in this crate reads from.
//! The central abstraction is [`FileReader`]: a cursor over immutable bytes
//! that can be cloned into independent cursors for worker threads.

use std::fmt::Debug;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result, u64_to_usize};


/// A random-access view over immutable encoded bytes.
///
/// Unlike `std::io::Read + Seek`, a `FileReader` knows its total size up front
/// and can produce independent cursors over the same underlying bytes, which
/// decode workers require.
pub trait FileReader: Send + Debug {

    /// Read up to `buffer.len()` bytes at the current cursor. Returns the
    /// number of bytes read, which is zero exactly at the end of the source.
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Move the cursor. Seeking past the end is allowed and reads zero bytes.
    fn seek(&mut self, position: SeekFrom) -> Result<u64>;

    /// The current cursor position in bytes.
    fn tell(&self) -> u64;

    /// The total number of bytes in the source.
    fn size(&self) -> u64;

    /// Returns an independent cursor over the same underlying bytes.
    fn clone_reader(&self) -> Box<dyn FileReader>;

    /// Whether the cursor is at or past the end of the source.
    fn eof(&self) -> bool { self.tell() >= self.size() }

    /// Move the cursor to an absolute byte offset.
    fn seek_to(&mut self, position: u64) -> Result<()> {
        self.seek(SeekFrom::Start(position))?;
        Ok(())
    }
}

fn resolved_seek_position(position: SeekFrom, current: u64, size: u64) -> Result<u64> {
    let target = match position {
        SeekFrom::Start(offset) => i128::from(offset),
        SeekFrom::Current(offset) => i128::from(current) + i128::from(offset),
        SeekFrom::End(offset) => i128::from(size) + i128::from(offset),
    };

    u64::try_from(target).map_err(|_| Error::invalid("seek before the start of the stream"))
}


/// Reads directly from a file on disk.
/// Cloning reopens the file, so every cursor owns its own OS handle.
#[derive(Debug)]
pub struct StandardFileReader {
    file: File,
    path: PathBuf,
    position: u64,
    size: u64,
}

impl StandardFileReader {

    /// Open the file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, path, position: 0, size })
    }
}

impl FileReader for StandardFileReader {

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        if self.position >= self.size { return Ok(0); }
        self.file.seek(SeekFrom::Start(self.position))?;
        let count = self.file.read(buffer)?;
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        self.position = resolved_seek_position(position, self.position, self.size)?;
        Ok(self.position)
    }

    fn tell(&self) -> u64 { self.position }
    fn size(&self) -> u64 { self.size }

    fn clone_reader(&self) -> Box<dyn FileReader> {
        // opening another handle keeps cursors fully independent across threads
        let file = File::open(&self.path)
            .expect("file vanished while readers were still open");

        Box::new(Self {
            file,
            path: self.path.clone(),
            position: self.position,
            size: self.size,
        })
    }
}


/// A cursor over shared in-memory bytes. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct BufferViewReader {
    bytes: Arc<Vec<u8>>,
    position: u64,
}

impl BufferViewReader {

    /// View the given bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: Arc::new(bytes.into()), position: 0 }
    }
}

impl FileReader for BufferViewReader {

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let start = u64_to_usize(self.position.min(self.size()));
        let count = buffer.len().min(self.bytes.len() - start);
        buffer[..count].copy_from_slice(&self.bytes[start .. start + count]);
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        self.position = resolved_seek_position(position, self.position, self.size())?;
        Ok(self.position)
    }

    fn tell(&self) -> u64 { self.position }
    fn size(&self) -> u64 { self.bytes.len() as u64 }

    fn clone_reader(&self) -> Box<dyn FileReader> {
        Box::new(self.clone())
    }
}


/// Drains a non-seekable source, such as stdin, into memory once,
/// and then behaves like a [`BufferViewReader`].
#[derive(Debug, Clone, Copy)]
pub struct BufferedFileReader;

impl BufferedFileReader {

    /// Read the source to its end and return an in-memory view of it.
    pub fn drain(mut source: impl Read) -> Result<BufferViewReader> {
        let mut bytes = Vec::new();
        source.read_to_end(&mut bytes)?;
        Ok(BufferViewReader::new(bytes))
    }
}


/// Shares one underlying reader between many cursors.
/// Each clone keeps its own position; reads lock the shared handle,
/// reposition it, and advance only the local cursor.
#[derive(Debug)]
pub struct SharedFileReader {
    inner: Arc<Mutex<Box<dyn FileReader>>>,
    position: u64,
    size: u64,
}

impl SharedFileReader {

    /// Wrap a reader for shared use.
    pub fn new(reader: Box<dyn FileReader>) -> Self {
        let size = reader.size();
        Self { inner: Arc::new(Mutex::new(reader)), position: 0, size }
    }
}

impl FileReader for SharedFileReader {

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock()
            .expect("a reader thread panicked while holding the shared file lock");

        inner.seek_to(self.position)?;
        let count = inner.read(buffer)?;
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: SeekFrom) -> Result<u64> {
        self.position = resolved_seek_position(position, self.position, self.size)?;
        Ok(self.position)
    }

    fn tell(&self) -> u64 { self.position }
    fn size(&self) -> u64 { self.size }

    fn clone_reader(&self) -> Box<dyn FileReader> {
        Box::new(Self {
            inner: self.inner.clone(),
            position: self.position,
            size: self.size,
        })
    }
}
