use std::{fs::OpenOptions, path::Path, sync::Arc};

use chunkfile_common::Result;
use chunkfile_io::ReadAt;

use crate::{CachePolicy, ChunkStore, Element, FileRange, default_chunk_size};

/// Options for opening a [`FileRange`] (or a bare [`ChunkStore`]).
///
/// ```no_run
/// use chunkfile::{CachePolicy, FileRange, FileRangeOptions};
///
/// let mut range: FileRange<u32> = FileRangeOptions::new()
///     .chunk_size(1024)
///     .cache_policy(CachePolicy::lru(64)?)
///     .open("data.bin")?;
/// let _first = range.front()?;
/// # Ok::<(), chunkfile::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct FileRangeOptions {
    chunk_size: Option<usize>,
    cache_policy: CachePolicy,
    open_mode: Option<OpenOptions>,
}

impl FileRangeOptions {
    pub fn new() -> FileRangeOptions {
        Default::default()
    }

    /// Sets the number of elements per chunk. Defaults to 4 KiB worth of elements.
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Sets the chunk cache policy. Defaults to [`CachePolicy::Unbounded`].
    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Sets the mode the file is opened with. Defaults to read-only.
    pub fn open_mode(mut self, open_mode: OpenOptions) -> Self {
        self.open_mode = Some(open_mode);
        self
    }

    /// Opens a shared chunk store over the file at `path`.
    pub fn open_store<E: Element>(&self, path: impl AsRef<Path>) -> Result<Arc<ChunkStore<E>>> {
        let mode = self.open_mode.clone().unwrap_or_else(|| {
            let mut mode = OpenOptions::new();
            mode.read(true);
            mode
        });
        let chunk_size = self.resolve_chunk_size::<E>();
        let store = ChunkStore::open_with(path, &mode, chunk_size, self.cache_policy)?;
        Ok(Arc::new(store))
    }

    /// Opens the file at `path` and returns a range over all of its elements.
    pub fn open<E: Element>(&self, path: impl AsRef<Path>) -> Result<FileRange<E>> {
        Ok(FileRange::from_store(self.open_store(path)?))
    }

    /// Returns a range over all elements of an arbitrary positional reader.
    /// The open mode is ignored.
    pub fn open_reader<E: Element>(&self, reader: impl ReadAt) -> Result<FileRange<E>> {
        let chunk_size = self.resolve_chunk_size::<E>();
        let store = ChunkStore::from_reader(reader, chunk_size, self.cache_policy)?;
        Ok(FileRange::from_store(Arc::new(store)))
    }

    fn resolve_chunk_size<E: Element>(&self) -> usize {
        self.chunk_size.unwrap_or_else(default_chunk_size::<E>)
    }
}
