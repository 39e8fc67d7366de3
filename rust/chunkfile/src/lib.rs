//! Lazy, random-access, sliceable views over the contents of a file.
//!
//! A [`FileRange`] gives array-like access (`front`, `back`, `at`, `slice`) to an
//! arbitrarily large file without loading it into memory and without issuing one
//! read per element. Reads are batched into fixed-size chunks by a shared
//! [`ChunkStore`], and every chunk is cached once retrieved (subject to the
//! configured [`CachePolicy`]).
//!
//! The layering is strictly top-down:
//!
//! ```text
//! FileRange  --(chunk index, intra-chunk offset)-->  ChunkView  --(fetch_chunk)-->  ChunkStore
//! ```
//!
//! The file is treated as immutable for the lifetime of the store: chunks that
//! were already cached are never re-validated against the file.

pub mod cache;
pub mod options;
pub mod range;
pub mod store;
pub mod view;

pub use cache::{CachePolicy, ChunkCache, LruChunkCache, UnboundedChunkCache};
pub use chunkfile_common::{
    Result,
    error::{Error, ErrorKind},
};
pub use options::FileRangeOptions;
pub use range::{FileRange, FileRangeIter};
pub use store::ChunkStore;
pub use view::ChunkView;

/// A fixed-width value that can be decoded directly from the bytes of a file.
///
/// Elements are decoded in native byte order.
pub trait Element: bytemuck::Pod + Send + Sync {}

impl<T> Element for T where T: bytemuck::Pod + Send + Sync {}

/// The size, in bytes, of the chunk that a default-sized chunk covers.
pub const DEFAULT_CHUNK_BYTES: usize = 4096;

/// Returns the default number of elements per chunk for the element type `E`,
/// i.e. 4 KiB worth of elements (at least one).
pub fn default_chunk_size<E: Element>() -> usize {
    (DEFAULT_CHUNK_BYTES / std::mem::size_of::<E>().max(1)).max(1)
}
