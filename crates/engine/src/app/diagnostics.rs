use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

use super::world::Vec2;

static DIAGNOSTICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_diagnostics_lock_poison_once(operation: &'static str) {
    if DIAGNOSTICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "diagnostics lock poisoned; recovered inner value");
    }
}

/// Read-only view of the loop published on an interval. Anything may poll
/// this from any thread; nothing but the frame loop ever writes it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub player_position: Vec2,
    pub agents_moving: u32,
}

#[derive(Clone, Debug)]
pub struct DiagnosticsHandle {
    snapshot: Arc<RwLock<DiagnosticsSnapshot>>,
}

impl Default for DiagnosticsHandle {
    fn default() -> Self {
        Self {
            snapshot: Arc::new(RwLock::new(DiagnosticsSnapshot::default())),
        }
    }
}

impl DiagnosticsHandle {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_diagnostics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: DiagnosticsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_diagnostics_lock_poison_once("write");
                let mut guard = poisoned.into_inner();
                *guard = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct DiagnosticsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    ticks: u32,
    frame_time_sum: Duration,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LoopRates {
    pub(crate) fps: f32,
    pub(crate) tps: f32,
    pub(crate) frame_time_ms: f32,
}

impl DiagnosticsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval_start: Instant::now(),
            interval,
            frames: 0,
            ticks: 0,
            frame_time_sum: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_dt: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(frame_dt);
    }

    pub(crate) fn record_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub(crate) fn maybe_rates(&mut self, now: Instant) -> Option<LoopRates> {
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

        let rates = LoopRates {
            fps: self.frames as f32 / elapsed_seconds,
            tps: self.ticks as f32 / elapsed_seconds,
            frame_time_ms,
        };

        self.interval_start = now;
        self.frames = 0;
        self.ticks = 0;
        self.frame_time_sum = Duration::ZERO;

        Some(rates)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::RwLock;
    use std::thread;

    use super::*;

    fn poison_lock(lock: &RwLock<DiagnosticsSnapshot>) {
        thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = lock.write().expect("write guard");
                    panic!("poison diagnostics lock");
                })
                .join();
        });
    }

    #[test]
    fn rates_compute_expected_values() {
        let mut accumulator = DiagnosticsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();

        accumulator.record_frame(Duration::from_millis(16));
        accumulator.record_frame(Duration::from_millis(16));
        accumulator.record_tick();
        accumulator.record_tick();
        accumulator.record_tick();
        accumulator.record_tick();

        let rates = accumulator
            .maybe_rates(base + Duration::from_secs(1))
            .expect("rates should be emitted");

        assert!((rates.fps - 2.0).abs() < 0.05);
        assert!((rates.tps - 4.0).abs() < 0.05);
        assert!((rates.frame_time_ms - 16.0).abs() < 0.001);
    }

    #[test]
    fn rates_not_emitted_before_interval() {
        let mut accumulator = DiagnosticsAccumulator::new(Duration::from_secs(1));
        let base = Instant::now();
        accumulator.record_frame(Duration::from_millis(16));

        assert!(accumulator
            .maybe_rates(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn snapshot_recovers_after_poison_without_panic() {
        let handle = DiagnosticsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.fps, 0.0);
        assert_eq!(snapshot.agents_moving, 0);
    }

    #[test]
    fn publish_recovers_after_poison_without_panic() {
        let handle = DiagnosticsHandle::default();
        poison_lock(handle.snapshot.as_ref());

        let expected = DiagnosticsSnapshot {
            fps: 15.0,
            tps: 60.0,
            frame_time_ms: 11.0,
            player_position: Vec2 { x: 3.0, y: 4.0 },
            agents_moving: 2,
        };
        handle.publish(expected);

        let actual = handle.snapshot();
        assert_eq!(actual.fps, expected.fps);
        assert_eq!(actual.tps, expected.tps);
        assert_eq!(actual.agents_moving, expected.agents_moving);
    }
}
