//! The shared chunk store: owns the open file and the cache of materialized chunks.

use std::{
    fs::OpenOptions,
    ops::Range,
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use chunkfile_common::{Result, error::Error, verify_arg};
use chunkfile_io::{FileReader, ReadAt};

use crate::{CachePolicy, ChunkCache, Element, default_chunk_size};

/// Owns a readable source (usually a local file), knows its size in elements,
/// and hands out chunks of `chunk_size` elements, each read at most once per
/// cache residency.
///
/// A store is shared (`Arc<ChunkStore<E>>`) by every view and range derived from
/// it. [`close`](ChunkStore::close) is a store-wide action: once any alias closes
/// the store, every subsequent read through any alias fails with
/// [`ErrorKind::Closed`](chunkfile_common::error::ErrorKind::Closed), including
/// reads of chunks that were already materialized.
///
/// The underlying file is assumed to stay unchanged while the store is open.
pub struct ChunkStore<E> {
    /// Source name used in log records and error contexts.
    name: String,
    /// Size of the source in whole elements, fixed at open time.
    total_elements: u64,
    /// Number of elements per chunk.
    chunk_size: usize,
    closed: AtomicBool,
    /// Number of chunk reads issued against the source.
    chunk_reads: AtomicU64,
    /// `None` once the store has been closed.
    state: Mutex<Option<OpenState<E>>>,
}

struct OpenState<E> {
    reader: Box<dyn ReadAt>,
    cache: Box<dyn ChunkCache<E>>,
}

impl<E: Element> ChunkStore<E> {
    /// Byte width of one element.
    pub const ELEMENT_SIZE: usize = std::mem::size_of::<E>();

    /// Opens `path` read-only with the default chunk size (4 KiB worth of
    /// elements) and an unbounded cache.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<ChunkStore<E>> {
        let mut mode = OpenOptions::new();
        mode.read(true);
        Self::open_with(path, &mode, default_chunk_size::<E>(), CachePolicy::Unbounded)
    }

    /// Opens `path` using the given open `mode`, chunk size (in elements) and
    /// cache policy.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: &OpenOptions,
        chunk_size: usize,
        policy: CachePolicy,
    ) -> Result<ChunkStore<E>> {
        let path = path.as_ref();
        let reader = FileReader::open_with(path, mode)
            .map_err(|e| Error::io(format!("open {}", path.display()), e))?;
        Self::with_reader(
            Box::new(reader),
            path.display().to_string(),
            chunk_size,
            policy,
        )
    }

    /// Creates a store over an arbitrary positional reader.
    pub fn from_reader(
        reader: impl ReadAt,
        chunk_size: usize,
        policy: CachePolicy,
    ) -> Result<ChunkStore<E>> {
        Self::with_reader(Box::new(reader), "<reader>".to_string(), chunk_size, policy)
    }

    fn with_reader(
        reader: Box<dyn ReadAt>,
        name: String,
        chunk_size: usize,
        policy: CachePolicy,
    ) -> Result<ChunkStore<E>> {
        verify_arg!(element_size, Self::ELEMENT_SIZE > 0);
        verify_arg!(chunk_size, chunk_size > 0);
        verify_arg!(
            chunk_size,
            chunk_size.checked_mul(Self::ELEMENT_SIZE).is_some()
        );

        let byte_size = reader
            .size()
            .map_err(|e| Error::io(format!("size of {name}"), e))?;
        let total_elements = byte_size / Self::ELEMENT_SIZE as u64;
        log::debug!(
            "opened chunk store over {name}: {total_elements} elements of {} bytes, \
             chunk size {chunk_size}, {policy:?} cache",
            Self::ELEMENT_SIZE
        );

        Ok(ChunkStore {
            name,
            total_elements,
            chunk_size,
            closed: AtomicBool::new(false),
            chunk_reads: AtomicU64::new(0),
            state: Mutex::new(Some(OpenState {
                reader,
                cache: policy.build(),
            })),
        })
    }

    /// Size of the source in elements. A trailing partial element is not counted.
    pub fn file_size(&self) -> u64 {
        self.total_elements
    }

    /// Number of elements per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks covering the source; the last one may be partial.
    pub fn chunk_count(&self) -> u64 {
        self.total_elements.div_ceil(self.chunk_size as u64)
    }

    /// Number of elements chunk `index` holds, zero for chunks at or past the end.
    pub fn chunk_len(&self, index: u64) -> usize {
        let start = index.saturating_mul(self.chunk_size as u64);
        let remaining = self.total_elements.saturating_sub(start);
        remaining.min(self.chunk_size as u64) as usize
    }

    /// Number of chunks currently held by the cache (zero once closed).
    pub fn cached_chunks(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |state| state.cache.len())
    }

    /// Returns `true` if chunk `index` is currently cached.
    pub fn is_cached(&self, index: u64) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|state| state.cache.contains(index))
    }

    /// Number of chunk reads issued against the source so far (cache misses).
    pub fn chunk_reads(&self) -> u64 {
        self.chunk_reads.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fails with `ErrorKind::Closed` if the store has been closed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed(self.name.as_str()));
        }
        Ok(())
    }

    /// Releases the underlying file and drops every cached chunk.
    ///
    /// Affects every view and range sharing this store. Closing an already
    /// closed store fails with `ErrorKind::Closed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        if state.take().is_none() {
            return Err(Error::closed(self.name.as_str()));
        }
        self.closed.store(true, Ordering::Release);
        log::debug!(
            "closed chunk store over {} after {} chunk reads",
            self.name,
            self.chunk_reads()
        );
        Ok(())
    }

    /// Returns the elements of chunk `index`, reading them from the source on a
    /// cache miss.
    ///
    /// The returned chunk holds `chunk_size` elements, except for the final
    /// chunk of the source, which holds the remainder.
    pub fn fetch_chunk(&self, index: u64) -> Result<Arc<[E]>> {
        self.ensure_open()?;
        verify_arg!(index, index < self.chunk_count());

        let mut guard = self.lock_state()?;
        let state = guard
            .as_mut()
            .ok_or_else(|| Error::closed(self.name.as_str()))?;

        if let Some(chunk) = state.cache.get(index) {
            log::trace!("chunk {index} of {} served from cache", self.name);
            return Ok(chunk);
        }

        let chunk = self.read_chunk(&*state.reader, index)?;
        if let Some(evicted) = state.cache.insert(index, chunk.clone()) {
            log::debug!("evicted chunk {evicted} of {}", self.name);
        }
        Ok(chunk)
    }

    fn read_chunk(&self, reader: &dyn ReadAt, index: u64) -> Result<Arc<[E]>> {
        let range = self.chunk_byte_range(index);
        log::debug!("reading chunk {index} of {}: bytes {range:?}", self.name);
        let expected = (range.end - range.start) as usize;

        let bytes = reader
            .read_at(range.clone())
            .map_err(|e| Error::io(format!("chunk {index} of {}", self.name), e))?;
        if bytes.len() != expected {
            return Err(Error::io(
                format!(
                    "chunk {index} of {}: expected {expected} bytes at {range:?}, got {}",
                    self.name,
                    bytes.len()
                ),
                std::io::ErrorKind::UnexpectedEof.into(),
            ));
        }
        self.chunk_reads.fetch_add(1, Ordering::Relaxed);

        let elements: Vec<E> = bytemuck::pod_collect_to_vec(bytes.as_slice());
        Ok(elements.into())
    }

    fn chunk_byte_range(&self, index: u64) -> Range<u64> {
        let element_size = Self::ELEMENT_SIZE as u64;
        let start = index * self.chunk_size as u64 * element_size;
        let len = self.chunk_len(index) as u64 * element_size;
        start..start + len
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, Option<OpenState<E>>>> {
        self.state
            .lock()
            .map_err(|_| Error::invalid_operation("chunk store state lock poisoned"))
    }
}

impl<E> std::fmt::Debug for ChunkStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("name", &self.name)
            .field("total_elements", &self.total_elements)
            .field("chunk_size", &self.chunk_size)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}
