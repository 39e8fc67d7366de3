//! The public random-access range over a window of a file.

use std::{
    ops::{ControlFlow, Range},
    path::Path,
    sync::Arc,
};

use chunkfile_common::Result;

use crate::{ChunkStore, ChunkView, Element, FileRangeOptions};

/// A lazy, random-access, sliceable range over the `[offset, end)` window of a
/// file, viewed as a sequence of elements of type `E`.
///
/// Ranges derived from one another through [`slice`](FileRange::slice) and
/// [`copy`](FileRange::copy) share the same [`ChunkStore`] (and therefore the
/// same chunk cache and the same open file) but each owns its own window, so
/// popping elements from one never moves another.
///
/// Element lookups go through a one-slot cache holding the most recently used
/// chunk view, which keeps sequential traversal from touching the store's cache
/// for every element.
///
/// Operations that require a non-empty range (`front`, `back`, `pop_front`,
/// `pop_back`) and out-of-bounds indexing or slicing panic: check
/// [`is_empty`](FileRange::is_empty) and [`len`](FileRange::len) first.
#[derive(Debug, Clone)]
pub struct FileRange<E = u8> {
    store: Arc<ChunkStore<E>>,
    offset: u64,
    end: u64,
    last_view: Option<ChunkView<E>>,
}

impl<E: Element> FileRange<E> {
    /// Opens the file at `path` with default options and returns a range over
    /// all of its elements.
    pub fn open(path: impl AsRef<Path>) -> Result<FileRange<E>> {
        FileRangeOptions::new().open(path)
    }

    /// Returns a range over all elements of an already open store.
    pub fn from_store(store: Arc<ChunkStore<E>>) -> FileRange<E> {
        let end = store.file_size();
        Self::with_window(store, 0, end)
    }

    fn with_window(store: Arc<ChunkStore<E>>, offset: u64, end: u64) -> FileRange<E> {
        debug_assert!(offset <= end && end <= store.file_size());
        FileRange {
            store,
            offset,
            end,
            last_view: None,
        }
    }

    /// Size of the whole file in elements, regardless of this range's window.
    pub fn file_size(&self) -> u64 {
        self.store.file_size()
    }

    /// Closes the shared store. Every range and view over it fails to read
    /// afterwards.
    pub fn close(&self) -> Result<()> {
        self.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }

    pub fn store(&self) -> &Arc<ChunkStore<E>> {
        &self.store
    }

    /// The absolute `[offset, end)` window of this range within the file.
    pub fn window(&self) -> Range<u64> {
        self.offset..self.end
    }

    /// # Panics
    ///
    /// Panics if the range is empty.
    pub fn front(&mut self) -> Result<E> {
        assert!(!self.is_empty(), "front() called on an empty FileRange");
        self.element_at(self.offset)
    }

    /// # Panics
    ///
    /// Panics if the range is empty.
    pub fn back(&mut self) -> Result<E> {
        assert!(!self.is_empty(), "back() called on an empty FileRange");
        self.element_at(self.end - 1)
    }

    pub fn pop_front(&mut self) {
        assert!(!self.is_empty(), "pop_front() called on an empty FileRange");
        self.offset += 1;
    }

    pub fn pop_back(&mut self) {
        assert!(!self.is_empty(), "pop_back() called on an empty FileRange");
        self.end -= 1;
    }

    pub fn is_empty(&self) -> bool {
        self.offset == self.end
    }

    /// Number of elements in the window.
    pub fn len(&self) -> u64 {
        self.end - self.offset
    }

    /// Returns the element at position `i` of the window.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn at(&mut self, i: u64) -> Result<E> {
        assert!(
            i < self.len(),
            "FileRange index {i} out of bounds (length {})",
            self.len()
        );
        self.element_at(self.offset + i)
    }

    /// Returns a range over `[begin, end)` relative to this window, sharing
    /// the same store. No I/O is performed.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end` or `end > self.len()`.
    pub fn slice(&self, begin: u64, end: u64) -> FileRange<E> {
        assert!(begin <= end, "invalid slice bounds {begin}..{end}");
        assert!(
            end <= self.len(),
            "slice end {end} exceeds FileRange length {}",
            self.len()
        );
        FileRange {
            store: self.store.clone(),
            offset: self.offset + begin,
            end: self.offset + end,
            last_view: self.last_view.clone(),
        }
    }

    /// Returns an independent range with the same window over the same store.
    /// The copy can be consumed without disturbing this range's position.
    pub fn copy(&self) -> FileRange<E> {
        self.clone()
    }

    /// Calls `f(i, element)` for every element of the window in order, where `i`
    /// is relative to the window start. Stops early and returns `Break` when `f`
    /// breaks.
    ///
    /// The window is traversed a chunk at a time.
    pub fn for_each_indexed<F>(&self, mut f: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(u64, E) -> ControlFlow<()>,
    {
        self.store.ensure_open()?;
        let chunk_size = self.store.chunk_size() as u64;
        let mut pos = self.offset;
        while pos < self.end {
            let chunk_index = pos / chunk_size;
            let chunk_start = chunk_index * chunk_size;
            let begin = (pos - chunk_start) as usize;
            let end = (self.end.min(chunk_start + chunk_size) - chunk_start) as usize;

            let base = pos - self.offset;
            let mut view = self.chunk_view(chunk_index).slice(begin, end);
            if view
                .for_each_indexed(|i, element| f(base + i as u64, element))?
                .is_break()
            {
                return Ok(ControlFlow::Break(()));
            }
            pos = chunk_start + end as u64;
        }
        Ok(ControlFlow::Continue(()))
    }

    /// Reads the whole window into memory.
    pub fn to_vec(&self) -> Result<Vec<E>> {
        let mut elements = Vec::with_capacity(self.len() as usize);
        self.for_each_indexed(|_, element| {
            elements.push(element);
            ControlFlow::Continue(())
        })?;
        Ok(elements)
    }

    /// Returns an iterator over the window. The iterator consumes a copy of
    /// this range, so this range's window is left untouched.
    pub fn iter(&self) -> FileRangeIter<E> {
        FileRangeIter { range: self.copy() }
    }

    /// Resolves the element at absolute index `idx` through the one-slot view
    /// cache, falling back to the store on a miss.
    fn element_at(&mut self, idx: u64) -> Result<E> {
        let chunk_size = self.store.chunk_size() as u64;
        let chunk_index = idx / chunk_size;
        let intra_offset = (idx % chunk_size) as usize;

        let mut view = match self.last_view.take() {
            Some(view) if view.index() == chunk_index => view,
            _ => self.chunk_view(chunk_index),
        };
        let element = view.at(intra_offset);
        self.last_view = Some(view);
        element
    }

    fn chunk_view(&self, chunk_index: u64) -> ChunkView<E> {
        ChunkView::new(self.store.clone(), chunk_index)
    }
}

/// An iterator over the elements of a [`FileRange`] window, yielding each element
/// (or the error that prevented reading it) from either end.
#[derive(Debug, Clone)]
pub struct FileRangeIter<E = u8> {
    range: FileRange<E>,
}

impl<E: Element> FileRangeIter<E> {
    /// The part of the window not yet yielded.
    pub fn remaining(&self) -> &FileRange<E> {
        &self.range
    }
}

impl<E: Element> Iterator for FileRangeIter<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.range.is_empty() {
            return None;
        }
        let element = self.range.front();
        self.range.pop_front();
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = usize::try_from(self.range.len()).unwrap_or(usize::MAX);
        (len, Some(len))
    }
}

impl<E: Element> DoubleEndedIterator for FileRangeIter<E> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.range.is_empty() {
            return None;
        }
        let element = self.range.back();
        self.range.pop_back();
        Some(element)
    }
}

impl<E: Element> ExactSizeIterator for FileRangeIter<E> {}

impl<'a, E: Element> IntoIterator for &'a FileRange<E> {
    type Item = Result<E>;
    type IntoIter = FileRangeIter<E>;

    fn into_iter(self) -> FileRangeIter<E> {
        self.iter()
    }
}
