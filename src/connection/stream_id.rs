//! Stream-id allocation (spec §3, §4.2).
//!
//! Ids are grouped into fixed-size pages of 128. `pop()` always returns the
//! smallest available id. A page other than the currently active one whose
//! in-use count drops to zero is marked for release and freed after
//! `release_delay` unless a `pop()` claims from it before the timer fires —
//! this keeps a connection's id-tracking memory proportional to its recent
//! high-water mark of concurrency rather than to the protocol maximum.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const PAGE_SIZE: usize = 128;

struct Page {
    /// Ids in this page not currently in use, smallest first.
    free: BTreeSet<u16>,
    in_use: usize,
    /// Set when `in_use` returns to zero; the page is released once this
    /// instant is more than `release_delay` in the past, unless claimed
    /// again first.
    empty_since: Option<Instant>,
}

impl Page {
    fn new(base: u16, size: u16) -> Self {
        Page {
            free: (base..base + size).collect(),
            in_use: 0,
            empty_since: None,
        }
    }
}

/// Allocates/reclaims per-connection stream identifiers (spec §3, §4.2).
///
/// `pop()`/`push()` are synchronous and cheap (a `parking_lot::Mutex` over a
/// handful of small `BTreeSet`s), matching the teacher's preference for
/// `parking_lot` on short critical sections.
pub struct StreamIdStack {
    max_streams: usize,
    release_delay: Duration,
    inner: Mutex<Inner>,
    in_flight: Arc<AtomicI64>,
}

struct Inner {
    pages: Vec<Option<Page>>,
    active_page: usize,
}

impl StreamIdStack {
    pub fn new(max_streams: usize, release_delay: Duration) -> Self {
        let num_pages = max_streams.div_ceil(PAGE_SIZE);
        let mut pages = Vec::with_capacity(num_pages);
        pages.push(Some(Page::new(0, PAGE_SIZE.min(max_streams) as u16)));
        for _ in 1..num_pages {
            pages.push(None);
        }
        StreamIdStack {
            max_streams,
            release_delay,
            inner: Mutex::new(Inner { pages, active_page: 0 }),
            in_flight: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Current number of ids considered in-flight (`inFlightIncrease` /
    /// `inFlightDecrease` observable counters from spec §4.2).
    pub fn in_flight(&self) -> i64 {
        self.in_flight.load(Ordering::Relaxed)
    }

    /// Pop the smallest available stream id, allocating a new page on
    /// demand up to the protocol maximum. Returns `None` when exhausted.
    pub fn pop(&self) -> Option<u16> {
        let mut inner = self.inner.lock();
        self.reap_expired_pages(&mut inner);

        // Prefer the active page; fall back to scanning for any page with
        // free capacity, allocating a fresh one if none exists and we are
        // under the protocol maximum.
        let active_page = inner.active_page;
        if let Some(id) = Self::take_from_page(&mut inner, active_page) {
            self.in_flight.fetch_add(1, Ordering::Relaxed);
            return Some(id);
        }

        for idx in 0..inner.pages.len() {
            if let Some(id) = Self::take_from_page(&mut inner, idx) {
                inner.active_page = idx;
                self.in_flight.fetch_add(1, Ordering::Relaxed);
                return Some(id);
            }
        }

        // No page had room. Try to grow.
        let allocated: usize = inner
            .pages
            .iter()
            .map(|p| p.as_ref().map(|p| p.free.len() + p.in_use).unwrap_or(0))
            .sum();
        if allocated >= self.max_streams {
            return None;
        }

        let base = allocated as u16;
        let remaining = self.max_streams - allocated;
        let page_size = PAGE_SIZE.min(remaining) as u16;
        let page_index = (base as usize) / PAGE_SIZE;
        if page_index >= inner.pages.len() {
            return None;
        }
        inner.pages[page_index] = Some(Page::new(base, page_size));
        inner.active_page = page_index;

        let id = Self::take_from_page(&mut inner, page_index)?;
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        Some(id)
    }

    fn take_from_page(inner: &mut Inner, idx: usize) -> Option<u16> {
        let page = inner.pages.get_mut(idx)?.as_mut()?;
        let id = page.free.iter().next().copied()?;
        page.free.remove(&id);
        page.in_use += 1;
        page.empty_since = None;
        Some(id)
    }

    /// Return an id to the pool. Calling this twice for the same id without
    /// an intervening `pop()` is a programming error (spec §3) and, in
    /// debug builds, panics rather than silently corrupting state.
    pub fn push(&self, id: u16) {
        let mut inner = self.inner.lock();
        let page_index = id as usize / PAGE_SIZE;
        let active_page = inner.active_page;
        let Some(page) = inner.pages.get_mut(page_index).and_then(|p| p.as_mut()) else {
            debug_assert!(false, "push() on a page that was never allocated: {id}");
            return;
        };

        debug_assert!(
            !page.free.contains(&id),
            "double free of stream id {id}: push() called without a matching pop()"
        );

        page.free.insert(id);
        page.in_use = page.in_use.saturating_sub(1);
        self.in_flight.fetch_sub(1, Ordering::Relaxed);

        if page.in_use == 0 && page_index != active_page {
            page.empty_since = Some(Instant::now());
        }
    }

    /// Release pages that have been empty for longer than `release_delay`,
    /// other than the active page.
    fn reap_expired_pages(&self, inner: &mut Inner) {
        let active_page = inner.active_page;
        for (idx, slot) in inner.pages.iter_mut().enumerate() {
            if idx == active_page {
                continue;
            }
            let expired = matches!(
                slot,
                Some(p) if p.in_use == 0
                    && p.empty_since.is_some_and(|t| t.elapsed() >= self.release_delay)
            );
            if expired {
                *slot = None;
            }
        }
    }

    /// Drop all allocations, as if every outstanding id had been pushed
    /// back (used when a connection is marked defunct).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let num_pages = inner.pages.len();
        inner.pages = (0..num_pages).map(|_| None).collect();
        inner.pages[0] = Some(Page::new(0, PAGE_SIZE.min(self.max_streams) as u16));
        inner.active_page = 0;
        self.in_flight.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_prefers_smallest_id() {
        let stack = StreamIdStack::new(256, Duration::from_secs(60));
        assert_eq!(stack.pop(), Some(0));
        assert_eq!(stack.pop(), Some(1));
        stack.push(0);
        assert_eq!(stack.pop(), Some(0));
    }

    #[test]
    fn exhaustion_returns_none_and_bounds_outstanding_ids() {
        let stack = StreamIdStack::new(4, Duration::from_secs(60));
        let ids: Vec<_> = std::iter::from_fn(|| stack.pop()).collect();
        assert_eq!(ids.len(), 4);
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.in_flight(), 4);
    }

    #[test]
    fn pop_push_never_yields_a_duplicate_outstanding_id() {
        let stack = StreamIdStack::new(32_768, Duration::from_secs(60));
        let mut outstanding = std::collections::HashSet::new();

        for round in 0..500 {
            if round % 3 == 0 && !outstanding.is_empty() {
                let id = *outstanding.iter().next().unwrap();
                outstanding.remove(&id);
                stack.push(id);
            } else if let Some(id) = stack.pop() {
                assert!(outstanding.insert(id), "duplicate id {id} handed out");
            }
        }

        for id in outstanding.drain() {
            stack.push(id);
        }
        assert_eq!(stack.in_flight(), 0);
    }

    #[test]
    fn inactive_empty_pages_are_reaped_after_release_delay() {
        let stack = StreamIdStack::new(4 * PAGE_SIZE, Duration::from_millis(1));
        // Fill and drain page 1 while page 0 stays active.
        let mut ids = Vec::new();
        for _ in 0..PAGE_SIZE + 1 {
            ids.push(stack.pop().unwrap());
        }
        // Drain everything in page 1 (ids 128..256), leave page 0's lone id
        // outstanding so page 0 remains "active" conceptually via index 0.
        for &id in &ids[1..] {
            stack.push(id);
        }
        std::thread::sleep(Duration::from_millis(5));
        // A pop should reap the expired page and still succeed from page 0.
        let id = stack.pop();
        assert!(id.is_some());
    }

    #[test]
    fn clear_resets_in_flight_to_zero() {
        let stack = StreamIdStack::new(256, Duration::from_secs(60));
        stack.pop();
        stack.pop();
        stack.clear();
        assert_eq!(stack.in_flight(), 0);
        assert_eq!(stack.pop(), Some(0));
    }
}
