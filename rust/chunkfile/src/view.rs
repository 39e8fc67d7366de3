//! A bounded, lazily materialized view over the elements of a single chunk.

use std::{ops::ControlFlow, sync::Arc};

use chunkfile_common::Result;

use crate::{ChunkStore, Element};

#[derive(Debug, Clone)]
enum ChunkData<E> {
    Unfetched,
    Fetched(Arc<[E]>),
}

/// A `[begin, end)` window over the elements of chunk `index`.
///
/// The view does not perform any I/O when constructed or sliced; the chunk is
/// fetched from the store on the first element access and shared (not copied)
/// with every view sliced from it afterwards.
///
/// Element accessors panic when called on an empty view or with an index past
/// the end of the window: these are caller bugs, not recoverable conditions.
#[derive(Debug, Clone)]
pub struct ChunkView<E> {
    store: Arc<ChunkStore<E>>,
    index: u64,
    data: ChunkData<E>,
    begin: usize,
    end: usize,
}

impl<E: Element> ChunkView<E> {
    /// Creates an unmaterialized view spanning the whole chunk `index`.
    ///
    /// The window end is clamped to the number of elements the chunk holds, so
    /// the final partial chunk reports its real length before any I/O.
    ///
    /// # Panics
    ///
    /// Panics if the chunk starts past the end of the store.
    pub fn new(store: Arc<ChunkStore<E>>, index: u64) -> ChunkView<E> {
        let chunk_start = index.checked_mul(store.chunk_size() as u64);
        assert!(
            chunk_start.is_some_and(|start| start <= store.file_size()),
            "chunk {index} starts past the end of the store ({} elements)",
            store.file_size()
        );
        let end = store.chunk_len(index);
        ChunkView {
            store,
            index,
            data: ChunkData::Unfetched,
            begin: 0,
            end,
        }
    }

    /// Creates a view from already known chunk data (or `None` if the chunk has
    /// not been fetched yet) and window bounds. No I/O is performed.
    ///
    /// When `data` is present the window is clamped to its length.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end` or `end` exceeds the chunk size.
    pub fn new_with_bounds(
        store: Arc<ChunkStore<E>>,
        index: u64,
        data: Option<Arc<[E]>>,
        begin: usize,
        end: usize,
    ) -> ChunkView<E> {
        assert!(begin <= end, "invalid chunk view bounds {begin}..{end}");
        assert!(
            end <= store.chunk_size(),
            "chunk view end {end} exceeds chunk size {}",
            store.chunk_size()
        );
        let (data, begin, end) = match data {
            Some(data) => {
                let end = end.min(data.len());
                (ChunkData::Fetched(data), begin.min(end), end)
            }
            None => (ChunkData::Unfetched, begin, end),
        };
        ChunkView {
            store,
            index,
            data,
            begin,
            end,
        }
    }

    /// Fetches the chunk from the store unless it is already present or the view
    /// is empty, and clamps the window to the fetched data.
    ///
    /// Fails with `ErrorKind::Closed` once the store is closed, even if the data
    /// is already present.
    pub fn ensure_materialized(&mut self) -> Result<()> {
        self.store.ensure_open()?;
        if matches!(self.data, ChunkData::Unfetched) && self.begin != self.end {
            let data = self.store.fetch_chunk(self.index)?;
            self.end = self.end.min(data.len());
            self.begin = self.begin.min(self.end);
            self.data = ChunkData::Fetched(data);
        }
        Ok(())
    }

    pub fn is_materialized(&self) -> bool {
        matches!(self.data, ChunkData::Fetched(_))
    }

    /// Returns the element at position `i` of the window.
    ///
    /// # Panics
    ///
    /// Panics if `i >= self.len()`.
    pub fn at(&mut self, i: usize) -> Result<E> {
        let elements = self.elements()?;
        assert!(
            i < elements.len(),
            "chunk view index {i} out of bounds (length {})",
            elements.len()
        );
        Ok(elements[i])
    }

    /// # Panics
    ///
    /// Panics if the view is empty.
    pub fn front(&mut self) -> Result<E> {
        assert!(!self.is_empty(), "front() called on an empty chunk view");
        self.at(0)
    }

    /// # Panics
    ///
    /// Panics if the view is empty.
    pub fn back(&mut self) -> Result<E> {
        assert!(!self.is_empty(), "back() called on an empty chunk view");
        self.ensure_materialized()?;
        assert!(!self.is_empty(), "back() called on an empty chunk view");
        self.at(self.len() - 1)
    }

    pub fn pop_front(&mut self) {
        assert!(!self.is_empty(), "pop_front() called on an empty chunk view");
        self.begin += 1;
    }

    pub fn pop_back(&mut self) {
        assert!(!self.is_empty(), "pop_back() called on an empty chunk view");
        self.end -= 1;
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    /// Returns a view over `[begin, end)` relative to this view's window,
    /// sharing the (possibly still unfetched) chunk data.
    ///
    /// # Panics
    ///
    /// Panics if `begin > end` or `end > self.len()`.
    pub fn slice(&self, begin: usize, end: usize) -> ChunkView<E> {
        assert!(begin <= end, "invalid slice bounds {begin}..{end}");
        assert!(
            end <= self.len(),
            "slice end {end} exceeds chunk view length {}",
            self.len()
        );
        ChunkView {
            store: self.store.clone(),
            index: self.index,
            data: self.data.clone(),
            begin: self.begin + begin,
            end: self.begin + end,
        }
    }

    /// The index of the chunk this view addresses.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn store(&self) -> &Arc<ChunkStore<E>> {
        &self.store
    }

    /// Calls `f(i, element)` for every element of the window in order, where `i`
    /// is relative to the window start. Stops early and returns `Break` when `f`
    /// breaks.
    pub fn for_each_indexed<F>(&mut self, mut f: F) -> Result<ControlFlow<()>>
    where
        F: FnMut(usize, E) -> ControlFlow<()>,
    {
        let elements = self.elements()?;
        for (i, &element) in elements.iter().enumerate() {
            if f(i, element).is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    fn elements(&mut self) -> Result<&[E]> {
        self.ensure_materialized()?;
        match &self.data {
            ChunkData::Fetched(data) => Ok(&data[self.begin..self.end]),
            ChunkData::Unfetched => Ok(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{memory_store, pattern};

    #[test]
    fn test_new_view_is_lazy() {
        let store = memory_store(100, 16);
        let view = ChunkView::new(store.clone(), 2);
        assert!(!view.is_materialized());
        assert_eq!(view.len(), 16);
        assert_eq!(view.index(), 2);
        assert_eq!(store.chunk_reads(), 0);
    }

    #[test]
    fn test_at_materializes_once() {
        let store = memory_store(100, 16);
        let data = pattern(100);
        let mut view = ChunkView::new(store.clone(), 1);
        assert_eq!(view.at(0).unwrap(), data[16]);
        assert_eq!(view.at(15).unwrap(), data[31]);
        assert!(view.is_materialized());
        assert_eq!(view.front().unwrap(), data[16]);
        assert_eq!(view.back().unwrap(), data[31]);
        assert_eq!(store.chunk_reads(), 1);
    }

    #[test]
    fn test_last_partial_chunk() {
        let store = memory_store(100, 16);
        let data = pattern(100);
        let mut view = ChunkView::new(store, 6);
        assert_eq!(view.len(), 4);
        assert_eq!(view.back().unwrap(), data[99]);
        assert_eq!(view.front().unwrap(), data[96]);
    }

    #[test]
    fn test_chunk_at_end_is_empty() {
        let store = memory_store(32, 16);
        let mut view = ChunkView::new(store.clone(), 2);
        assert!(view.is_empty());
        view.ensure_materialized().unwrap();
        assert!(!view.is_materialized());
        assert_eq!(store.chunk_reads(), 0);
    }

    #[test]
    #[should_panic]
    fn test_chunk_past_end_panics() {
        let store = memory_store(32, 16);
        let _view = ChunkView::new(store, 3);
    }

    #[test]
    fn test_pop_front_and_back() {
        let store = memory_store(64, 8);
        let data = pattern(64);
        let mut view = ChunkView::new(store, 3);
        view.pop_front();
        view.pop_back();
        assert_eq!(view.len(), 6);
        assert_eq!(view.front().unwrap(), data[25]);
        assert_eq!(view.back().unwrap(), data[30]);
        while !view.is_empty() {
            view.pop_front();
        }
        assert_eq!(view.len(), 0);
    }

    #[test]
    fn test_slice_shares_data() {
        let store = memory_store(64, 16);
        let data = pattern(64);
        let mut view = ChunkView::new(store.clone(), 1);
        view.ensure_materialized().unwrap();

        let mut sliced = view.slice(4, 10);
        assert!(sliced.is_materialized());
        assert_eq!(sliced.len(), 6);
        assert_eq!(sliced.front().unwrap(), data[20]);

        let mut nested = sliced.slice(2, 3);
        assert_eq!(nested.len(), 1);
        assert_eq!(nested.front().unwrap(), data[22]);
        assert_eq!(store.chunk_reads(), 1);
    }

    #[test]
    fn test_slice_of_unfetched_view_stays_lazy() {
        let store = memory_store(64, 16);
        let view = ChunkView::new(store.clone(), 0);
        let mut sliced = view.slice(8, 16);
        assert!(!sliced.is_materialized());
        assert_eq!(sliced.back().unwrap(), pattern(64)[15]);
        assert!(!view.is_materialized());
    }

    #[test]
    #[should_panic]
    fn test_slice_beyond_window_panics() {
        let store = memory_store(64, 16);
        let view = ChunkView::new(store, 0).slice(4, 8);
        let _ = view.slice(0, 5);
    }

    #[test]
    #[should_panic]
    fn test_front_on_empty_panics() {
        let store = memory_store(64, 16);
        let mut view = ChunkView::new(store, 0).slice(3, 3);
        let _ = view.front();
    }

    #[test]
    #[should_panic]
    fn test_at_out_of_bounds_panics() {
        let store = memory_store(64, 16);
        let mut view = ChunkView::new(store, 0);
        let _ = view.at(16);
    }

    #[test]
    fn test_new_with_bounds() {
        let store = memory_store(64, 16);
        let chunk = store.fetch_chunk(2).unwrap();
        let mut view = ChunkView::new_with_bounds(store.clone(), 2, Some(chunk), 1, 5);
        assert!(view.is_materialized());
        assert_eq!(view.len(), 4);
        assert_eq!(view.front().unwrap(), pattern(64)[33]);

        let mut lazy = ChunkView::new_with_bounds(store, 3, None, 0, 2);
        assert!(!lazy.is_materialized());
        assert_eq!(lazy.back().unwrap(), pattern(64)[49]);
    }

    #[test]
    fn test_new_with_bounds_clamps_to_partial_chunk() {
        let store = memory_store(100, 16);
        let chunk = store.fetch_chunk(6).unwrap();
        assert_eq!(chunk.len(), 4);

        let mut view = ChunkView::new_with_bounds(store.clone(), 6, Some(chunk.clone()), 0, 16);
        assert_eq!(view.len(), 4);
        assert_eq!(view.at(0).unwrap(), pattern(100)[96]);
        assert_eq!(view.back().unwrap(), pattern(100)[99]);

        let view = ChunkView::new_with_bounds(store, 6, Some(chunk), 10, 16);
        assert!(view.is_empty());
    }

    #[test]
    #[should_panic(expected = "back() called on an empty chunk view")]
    fn test_back_on_window_past_short_chunk_panics() {
        let store = memory_store(100, 16);
        let mut view = ChunkView::new_with_bounds(store, 6, None, 8, 12);
        assert_eq!(view.len(), 4);
        let _ = view.back();
    }

    #[test]
    fn test_for_each_indexed() {
        let store = memory_store(64, 16);
        let data = pattern(64);
        let mut view = ChunkView::new(store, 2).slice(2, 12);

        let mut seen = Vec::new();
        let flow = view
            .for_each_indexed(|i, e| {
                seen.push((i, e));
                ControlFlow::Continue(())
            })
            .unwrap();
        assert!(flow.is_continue());
        let expected: Vec<_> = (0..10).map(|i| (i, data[34 + i])).collect();
        assert_eq!(seen, expected);

        let mut count = 0;
        let flow = view
            .for_each_indexed(|i, _| {
                count += 1;
                if i == 3 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert!(flow.is_break());
        assert_eq!(count, 4);
    }

    #[test]
    fn test_reads_fail_after_close() {
        let store = memory_store(64, 16);
        let mut view = ChunkView::new(store.clone(), 0);
        assert_eq!(view.front().unwrap(), pattern(64)[0]);

        store.close().unwrap();
        assert!(view.front().unwrap_err().is_closed());
        let mut other = ChunkView::new(store, 1);
        assert!(other.at(0).unwrap_err().is_closed());
    }
}
