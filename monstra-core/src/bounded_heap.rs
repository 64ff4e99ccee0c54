//! # Bounded Binary Heap
//!
//! Purpose: a fixed-capacity min/max heap, driven by a caller-supplied
//! comparator, that emits a position-changed event on every insert, remove,
//! and sift so an external owner (the TTL-indexed map) can keep an
//! O(1)-lookup index into the heap for any element it cares about.
//!
//! ## Design Principles
//!
//! 1. **Comparator, Not Ord**: callers supply a three-way comparator so the
//!    same type can be ordered differently in different heaps (e.g. a
//!    min-heap by expiration).
//! 2. **Event-Driven Index Tracking**: every time an element's index
//!    changes, `on_move` fires with the element and its new index, so the
//!    owner never has to linear-scan to find something it already knew
//!    about.
//! 3. **Graceful Degradation At Capacity**: `insert` never panics or grows
//!    past capacity; it reports what it could not accept.

/// Three-way comparison result for the heap's ordering: whether the first
/// element belongs closer to the root ("top") than the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lean {
    MoreTop,
    Equal,
    MoreBottom,
}

/// A position-changing event emitted by the heap so an external owner can
/// maintain `element -> index` bookkeeping without scanning.
#[derive(Debug, Clone, Copy)]
pub enum HeapEvent {
    Inserted { index: usize },
    Removed { index: usize },
    Moved { from: usize, to: usize },
}

/// Fixed-capacity binary heap ordered by a caller-supplied comparator.
///
/// `on_event` is invoked with the element at the index the event concerns
/// and the event itself; it must not call back into the heap.
pub struct BoundedBinaryHeap<E> {
    data: Vec<E>,
    capacity: usize,
    compare: Box<dyn Fn(&E, &E) -> Lean + Send + Sync>,
    on_event: Option<Box<dyn FnMut(&E, HeapEvent) + Send>>,
}

impl<E> BoundedBinaryHeap<E> {
    pub fn new(capacity: usize, compare: impl Fn(&E, &E) -> Lean + Send + Sync + 'static) -> Self {
        BoundedBinaryHeap {
            data: Vec::with_capacity(capacity.min(1024)),
            capacity,
            compare: Box::new(compare),
            on_event: None,
        }
    }

    pub fn with_event_callback(
        capacity: usize,
        compare: impl Fn(&E, &E) -> Lean + Send + Sync + 'static,
        on_event: impl FnMut(&E, HeapEvent) + Send + 'static,
    ) -> Self {
        BoundedBinaryHeap {
            data: Vec::with_capacity(capacity.min(1024)),
            capacity,
            compare: Box::new(compare),
            on_event: Some(Box::new(on_event)),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    pub fn peek(&self) -> Option<&E> {
        self.data.first()
    }

    fn emit(&mut self, index: usize, event: HeapEvent) {
        if let Some(cb) = self.on_event.as_mut() {
            cb(&self.data[index], event);
        }
    }

    fn lean(&self, a: &E, b: &E) -> Lean {
        (self.compare)(a, b)
    }

    /// Inserts `element`. When the heap is not full this always succeeds
    /// and returns `None`. When full and `force` is `false`, the element is
    /// rejected and handed back. When full and `force` is `true`: if
    /// `element` is [`Lean::MoreTop`] than the current root, it is rejected
    /// and handed back; otherwise it replaces the root, and the displaced
    /// root is returned.
    pub fn insert(&mut self, element: E, force: bool) -> Option<E> {
        if !self.is_full() {
            self.data.push(element);
            let index = self.data.len() - 1;
            self.emit(index, HeapEvent::Inserted { index });
            self.sift_up(index);
            return None;
        }

        if !force {
            return Some(element);
        }

        let displaces_root = matches!(self.lean(&element, &self.data[0]), Lean::MoreTop);
        if displaces_root {
            return Some(element);
        }

        if let Some(cb) = self.on_event.as_mut() {
            cb(&self.data[0], HeapEvent::Removed { index: 0 });
        }
        let displaced = std::mem::replace(&mut self.data[0], element);
        self.emit(0, HeapEvent::Inserted { index: 0 });
        self.sift_down(0);
        Some(displaced)
    }

    /// Removes and returns the top (root) element.
    pub fn remove(&mut self) -> Option<E> {
        self.remove_at(0)
    }

    /// Removes and returns the element at `index`, or `None` if out of
    /// bounds.
    pub fn remove_at(&mut self, index: usize) -> Option<E> {
        if index >= self.data.len() {
            return None;
        }
        let last = self.data.len() - 1;
        self.data.swap(index, last);
        let removed = self.data.pop()?;
        if let Some(cb) = self.on_event.as_mut() {
            cb(&removed, HeapEvent::Removed { index: last });
        }

        if index != last && index < self.data.len() {
            self.emit(index, HeapEvent::Moved { from: last, to: index });
            self.sift_down(index);
            self.sift_up(index);
        }
        Some(removed)
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if matches!(self.lean(&self.data[index], &self.data[parent]), Lean::MoreTop) {
                self.data.swap(index, parent);
                self.emit(parent, HeapEvent::Moved { from: index, to: parent });
                self.emit(index, HeapEvent::Moved { from: parent, to: index });
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.data.len();
        loop {
            let left = 2 * index + 1;
            let right = 2 * index + 2;
            let mut top = index;

            if left < len && matches!(self.lean(&self.data[left], &self.data[top]), Lean::MoreTop) {
                top = left;
            }
            if right < len && matches!(self.lean(&self.data[right], &self.data[top]), Lean::MoreTop) {
                top = right;
            }
            if top == index {
                break;
            }
            self.data.swap(index, top);
            self.emit(top, HeapEvent::Moved { from: index, to: top });
            self.emit(index, HeapEvent::Moved { from: top, to: index });
            index = top;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_heap(capacity: usize) -> BoundedBinaryHeap<i64> {
        BoundedBinaryHeap::new(capacity, |a, b| {
            if a < b {
                Lean::MoreTop
            } else if a == b {
                Lean::Equal
            } else {
                Lean::MoreBottom
            }
        })
    }

    #[test]
    fn pops_in_ascending_order() {
        let mut heap = min_heap(10);
        for v in [5, 3, 8, 1, 9, 2] {
            heap.insert(v, false);
        }
        let mut popped = Vec::new();
        while let Some(v) = heap.remove() {
            popped.push(v);
        }
        assert_eq!(popped, vec![1, 2, 3, 5, 8, 9]);
    }

    #[test]
    fn non_force_insert_rejects_when_full() {
        let mut heap = min_heap(2);
        assert_eq!(heap.insert(1, false), None);
        assert_eq!(heap.insert(2, false), None);
        assert_eq!(heap.insert(0, false), Some(0));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn force_insert_replaces_root_when_better() {
        let mut heap = min_heap(2);
        heap.insert(5, false);
        heap.insert(10, false);
        // Root (min) is 5. A smaller candidate is MoreTop than root, so it
        // must be rejected per spec: force-insert only replaces the root
        // with something that is NOT more top than it.
        assert_eq!(heap.insert(1, true), Some(1));
        // A candidate that is "less top" (here: larger, since root sorts
        // ascending) than root is accepted, displacing the old root.
        assert_eq!(heap.insert(7, true), Some(5));
        assert_eq!(heap.peek(), Some(&7));
    }

    #[test]
    fn remove_at_arbitrary_index() {
        let mut heap = min_heap(10);
        for v in [5, 3, 8, 1, 9, 2] {
            heap.insert(v, false);
        }
        assert_eq!(heap.remove_at(99), None);
        let removed = heap.remove_at(2);
        assert!(removed.is_some());
        assert_eq!(heap.len(), 5);
    }

    #[test]
    fn on_move_callback_tracks_indices() {
        let positions: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<i64, usize>>> =
            std::sync::Arc::new(std::sync::Mutex::new(std::collections::HashMap::new()));
        let positions_cb = positions.clone();

        let mut heap = BoundedBinaryHeap::with_event_callback(
            10,
            |a: &i64, b: &i64| {
                if a < b {
                    Lean::MoreTop
                } else if a == b {
                    Lean::Equal
                } else {
                    Lean::MoreBottom
                }
            },
            move |element, event| {
                let mut map = positions_cb.lock().unwrap();
                match event {
                    HeapEvent::Inserted { index } | HeapEvent::Moved { to: index, .. } => {
                        map.insert(*element, index);
                    }
                    HeapEvent::Removed { .. } => {
                        map.remove(element);
                    }
                }
            },
        );

        for v in [5, 3, 8, 1, 9, 2] {
            heap.insert(v, false);
        }

        for (&element, &index) in positions.lock().unwrap().iter() {
            assert_eq!(heap.data[index], element);
        }
    }
}
