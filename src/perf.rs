use std::time::Duration;

use serde::Serialize;

use crate::render::CacheCounters;

/// Session statistics for the render pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct PerfStats {
    pub render_ms: f64,
    pub render_samples: u64,
    pub failed_renders: u64,
    pub cache_hit_rate: f64,
    pub evictions: u64,
    pub stale_completions: u64,
    pub queue_depth: usize,
    pub save_ms: f64,
}

impl PerfStats {
    pub fn record_render(&mut self, elapsed: Duration) {
        self.render_ms = elapsed.as_secs_f64() * 1000.0;
        self.render_samples += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed_renders += 1;
    }

    pub fn record_save(&mut self, elapsed: Duration) {
        self.save_ms = elapsed.as_secs_f64() * 1000.0;
    }

    pub fn set_hit_rate(&mut self, rate: f64) {
        self.cache_hit_rate = rate.clamp(0.0, 1.0);
    }

    pub fn set_queue_depth(&mut self, depth: usize) {
        self.queue_depth = depth;
    }

    pub fn absorb_cache_counters(&mut self, counters: CacheCounters) {
        self.evictions = counters.evictions;
        self.stale_completions = counters.stale_completions;
        let lookups = counters.hits + counters.misses;
        if lookups > 0 {
            self.set_hit_rate(counters.hits as f64 / lookups as f64);
        }
    }
}
