use std::mem;

use crate::backend::RgbaFrame;
use crate::document::{PageId, PageInfo};
use crate::error::{AppError, AppResult};
use crate::transform::Quality;

pub const DEFAULT_WINDOW_SIZE: usize = 7;

/// Lifecycle of a render slot. Pixels exist only in `Complete`.
#[derive(Debug, Clone)]
pub enum RenderState {
    Wait,
    Rendering { ticket: u64 },
    Complete(RgbaFrame),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Wait,
    Rendering,
    Complete,
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    page: PageInfo,
    quality: Quality,
    state: RenderState,
}

impl RenderedPage {
    pub fn waiting(page: PageInfo, quality: Quality) -> Self {
        Self {
            page,
            quality,
            state: RenderState::Wait,
        }
    }

    pub fn complete(page: PageInfo, quality: Quality, frame: RgbaFrame) -> Self {
        Self {
            page,
            quality,
            state: RenderState::Complete(frame),
        }
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn status(&self) -> RenderStatus {
        match self.state {
            RenderState::Wait => RenderStatus::Wait,
            RenderState::Rendering { .. } => RenderStatus::Rendering,
            RenderState::Complete(_) => RenderStatus::Complete,
        }
    }

    pub fn frame(&self) -> Option<&RgbaFrame> {
        match &self.state {
            RenderState::Complete(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn into_frame(self) -> Option<RgbaFrame> {
        match self.state {
            RenderState::Complete(frame) => Some(frame),
            _ => None,
        }
    }

    /// Ticket of the in-flight render, if any.
    pub fn ticket(&self) -> Option<u64> {
        match self.state {
            RenderState::Rendering { ticket } => Some(ticket),
            _ => None,
        }
    }

    /// Drops any pixels held by the slot; returns whether there were some.
    fn release(&mut self) -> bool {
        matches!(
            mem::replace(&mut self.state, RenderState::Wait),
            RenderState::Complete(_)
        )
    }
}

/// Window geometry: `size` slots, at most `side_limit` on each side of the
/// viewed page, `buffer` wide when clamped at the left edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    size: usize,
    side_limit: usize,
    buffer: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl WindowConfig {
    /// Even sizes are rounded up so the window stays centered.
    pub fn new(size: usize) -> Self {
        let size = size.max(1) | 1;
        Self {
            size,
            side_limit: size / 2,
            buffer: size - 1,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn side_limit(&self) -> usize {
        self.side_limit
    }

    /// Inclusive page range cached around `index` in a document of `len` pages.
    pub fn range(&self, index: usize, len: usize) -> Option<(usize, usize)> {
        if index >= len {
            return None;
        }
        let last = len - 1;
        let right = if index < self.buffer - self.side_limit {
            self.buffer.min(last)
        } else if index + self.side_limit <= last {
            index + self.side_limit
        } else {
            last
        };
        let left = index.saturating_sub(self.side_limit);
        Some((left, right.max(index)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub submitted: u64,
    pub stale_completions: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SlidingWindowCache {
    config: WindowConfig,
    window: Vec<RenderedPage>,
    counters: CacheCounters,
}

impl SlidingWindowCache {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            window: Vec::new(),
            counters: CacheCounters::default(),
        }
    }

    pub fn config(&self) -> WindowConfig {
        self.config
    }

    /// Rebuilds the window around `index` and submits every slot still in
    /// `Wait`, nearest to `index` first. Slots are reused by page id as long
    /// as they would still render the same pixels.
    pub fn align<F>(&mut self, index: usize, pages: &[PageInfo], mut submit: F) -> AppResult<()>
    where
        F: FnMut(&PageInfo) -> AppResult<u64>,
    {
        let (first, last) = self
            .config
            .range(index, pages.len())
            .ok_or(AppError::out_of_range(index, pages.len()))?;

        let mut previous = mem::take(&mut self.window);
        let mut window = Vec::with_capacity(last - first + 1);
        for page in &pages[first..=last] {
            let reused = previous
                .iter()
                .position(|entry| entry.page.renders_same_as(page))
                .map(|pos| previous.swap_remove(pos));
            let entry = match reused {
                Some(mut entry) => {
                    entry.page = page.clone();
                    entry
                }
                None => RenderedPage::waiting(page.clone(), Quality::Normal),
            };
            window.push(entry);
        }

        for mut dropped in previous {
            if dropped.release() {
                self.counters.evictions += 1;
                log::trace!("evicted page {}", dropped.page.id());
            }
        }

        let center = index - first;
        if window[center].frame().is_some() {
            self.counters.hits += 1;
        } else {
            self.counters.misses += 1;
        }

        let mut order: Vec<usize> = (0..window.len()).collect();
        order.sort_by_key(|&slot| (slot.abs_diff(center), slot < center));
        self.window = window;

        for slot in order {
            let entry = &mut self.window[slot];
            if !matches!(entry.state, RenderState::Wait) {
                continue;
            }
            let ticket = submit(&entry.page)?;
            entry.state = RenderState::Rendering { ticket };
            self.counters.submitted += 1;
        }

        log::debug!(
            "aligned window around {index}: pages {first}..={last}, {} submitted so far",
            self.counters.submitted
        );
        Ok(())
    }

    pub fn entry_at(&self, index: usize) -> Option<&RenderedPage> {
        self.window
            .iter()
            .find(|entry| entry.page.global_index() == index)
    }

    pub fn entry(&self, id: PageId) -> Option<&RenderedPage> {
        self.window.iter().find(|entry| entry.page.id() == id)
    }

    /// Fills the slot whose in-flight render carries `ticket`. Completions
    /// for evicted slots or superseded renders are discarded.
    pub fn complete(&mut self, page: &PageInfo, ticket: u64, frame: RgbaFrame) -> bool {
        let Some(entry) = self.in_flight_mut(page.id(), ticket) else {
            self.counters.stale_completions += 1;
            return false;
        };
        entry.page = page.with_global_index(entry.page.global_index());
        entry.state = RenderState::Complete(frame);
        true
    }

    /// Puts a failed slot back to `Wait` so the next alignment retries it.
    pub fn fail(&mut self, id: PageId, ticket: u64) -> bool {
        match self.in_flight_mut(id, ticket) {
            Some(entry) => {
                entry.state = RenderState::Wait;
                true
            }
            None => {
                self.counters.stale_completions += 1;
                false
            }
        }
    }

    /// Swaps in an edited copy of a page and forgets its pixels.
    pub fn invalidate(&mut self, page: &PageInfo) -> bool {
        let Some(entry) = self.entry_mut(page.id()) else {
            return false;
        };
        entry.page = page.clone();
        let released = entry.release();
        if released {
            self.counters.evictions += 1;
        }
        true
    }

    /// Shelves a finished render produced outside the queue.
    pub fn store(&mut self, page: &PageInfo, frame: RgbaFrame) -> bool {
        let Some(entry) = self.entry_mut(page.id()) else {
            return false;
        };
        entry.page = page.clone();
        entry.state = RenderState::Complete(frame);
        true
    }

    pub fn remove(&mut self, id: PageId) -> Option<RenderedPage> {
        let pos = self.window.iter().position(|entry| entry.page.id() == id)?;
        let mut removed = self.window.remove(pos);
        if removed.frame().is_some() {
            self.counters.evictions += 1;
        }
        let snapshot = removed.clone();
        removed.release();
        Some(snapshot)
    }

    pub fn clear(&mut self) {
        for mut entry in self.window.drain(..) {
            if entry.release() {
                self.counters.evictions += 1;
            }
        }
    }

    /// Returns every in-flight slot to `Wait`; used when completions were lost.
    pub fn reset_rendering(&mut self) -> usize {
        let mut reset = 0;
        for entry in &mut self.window {
            if entry.ticket().is_some() {
                entry.state = RenderState::Wait;
                reset += 1;
            }
        }
        reset
    }

    pub fn window_indices(&self) -> Vec<usize> {
        self.window
            .iter()
            .map(|entry| entry.page.global_index())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn resident_bytes(&self) -> usize {
        self.window
            .iter()
            .filter_map(RenderedPage::frame)
            .map(RgbaFrame::byte_len)
            .sum()
    }

    pub fn counters(&self) -> CacheCounters {
        self.counters
    }

    pub fn hit_rate(&self) -> f64 {
        let lookups = self.counters.hits + self.counters.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.counters.hits as f64 / lookups as f64
    }

    fn entry_mut(&mut self, id: PageId) -> Option<&mut RenderedPage> {
        self.window.iter_mut().find(|entry| entry.page.id() == id)
    }

    fn in_flight_mut(&mut self, id: PageId, ticket: u64) -> Option<&mut RenderedPage> {
        self.entry_mut(id).filter(|entry| entry.ticket() == Some(ticket))
    }
}
