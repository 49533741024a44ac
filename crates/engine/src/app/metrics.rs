use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use super::handoff::FrameFreshness;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub stale_frames: u32,
    pub dropped_commands: u32,
}

#[derive(Clone, Debug)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
}

impl Default for MetricsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(LoopMetricsSnapshot::default())),
        }
    }
}

impl MetricsHandle {
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    stale_frames: u32,
    dropped_commands: u32,
    tick_counter_start: Option<u64>,
    tick_counter_latest: u64,
    frame_time_sum: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames: 0,
            stale_frames: 0,
            dropped_commands: 0,
            tick_counter_start: None,
            tick_counter_latest: 0,
            frame_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
    }

    pub(crate) fn record_presented_list(&mut self, freshness: FrameFreshness, dropped: usize) {
        match freshness {
            FrameFreshness::Fresh => {
                let dropped = u32::try_from(dropped).unwrap_or(u32::MAX);
                self.dropped_commands = self.dropped_commands.saturating_add(dropped);
            }
            FrameFreshness::Stale => {
                self.stale_frames = self.stale_frames.saturating_add(1);
            }
            FrameFreshness::Empty => {}
        }
    }

    pub(crate) fn observe_tick_counter(&mut self, ticks: u64) {
        self.tick_counter_start.get_or_insert(ticks);
        self.tick_counter_latest = ticks;
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            (self.frame_time_sum.as_secs_f32() / self.frames as f32) * 1000.0
        };

        let ticks = self
            .tick_counter_start
            .map(|start| self.tick_counter_latest.saturating_sub(start))
            .unwrap_or(0);

        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: ticks as f32 / elapsed_seconds,
            frame_time_ms,
            stale_frames: self.stale_frames,
            dropped_commands: self.dropped_commands,
        };

        self.interval_start = now;
        self.frames = 0;
        self.stale_frames = 0;
        self.dropped_commands = 0;
        self.tick_counter_start = self.tick_counter_start.map(|_| self.tick_counter_latest);
        self.frame_time_sum = Duration::ZERO;

        Some(snapshot)
    }
}
