use std::time::{Duration, Instant};

use serde::Serialize;

/// Wall-clock time spent in each pipeline stage for one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    pub extract: Duration,
    pub map: Duration,
    pub interpolate: Duration,
    pub composite: Duration,
    pub commit: Duration,
}

impl StageTimings {
    pub fn total(&self) -> Duration {
        self.extract + self.map + self.interpolate + self.composite + self.commit
    }
}

/// Summary emitted once per reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FpsReport {
    /// Frames rendered during the window.
    pub frames: u32,
    /// Timings of the most recent frame.
    pub last: StageTimings,
    /// Frames whose total time exceeded the block period.
    pub overruns: u32,
}

impl FpsReport {
    /// Logs the report at debug level.
    pub fn log(&self) {
        let ms = |d: Duration| d.as_secs_f64() * 1e3;
        tracing::debug!(
            fps = self.frames,
            extract_ms = ms(self.last.extract),
            map_ms = ms(self.last.map),
            interp_ms = ms(self.last.interpolate),
            composite_ms = ms(self.last.composite),
            commit_ms = ms(self.last.commit),
            total_ms = ms(self.last.total()),
            overruns = self.overruns,
            "frame stats"
        );
    }
}

/// Counts frames and budget overruns, producing a [`FpsReport`] every
/// `window`.
#[derive(Debug, Clone)]
pub struct FrameStats {
    window: Duration,
    window_start: Instant,
    frames: u32,
    overruns: u32,
    budget: Option<Duration>,
}

impl FrameStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            frames: 0,
            overruns: 0,
            budget: None,
        }
    }

    pub fn per_second() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Sets the per-block time budget, `block_size / sample_rate`.
    pub fn set_budget(&mut self, block_size: usize, sample_rate: u32) {
        self.budget = (sample_rate > 0)
            .then(|| Duration::from_secs_f64(block_size as f64 / sample_rate as f64));
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    /// Restarts the reporting window at `now`.
    pub fn reset(&mut self, now: Instant) {
        self.window_start = now;
        self.frames = 0;
        self.overruns = 0;
    }

    /// Records one frame finished at `now`. Returns a report when the window
    /// has elapsed, then starts a new one.
    pub fn record(&mut self, timings: StageTimings, now: Instant) -> Option<FpsReport> {
        if self.budget.is_some_and(|budget| timings.total() > budget) {
            self.overruns += 1;
        }

        let report = if now.saturating_duration_since(self.window_start) >= self.window {
            let report = FpsReport {
                frames: self.frames,
                last: timings,
                overruns: self.overruns,
            };
            self.reset(now);
            Some(report)
        } else {
            None
        };

        self.frames += 1;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings(ms: u64) -> StageTimings {
        StageTimings {
            extract: Duration::from_millis(ms),
            ..Default::default()
        }
    }

    #[test]
    fn totals_all_stages() {
        let t = StageTimings {
            extract: Duration::from_millis(1),
            map: Duration::from_millis(2),
            interpolate: Duration::from_millis(3),
            composite: Duration::from_millis(4),
            commit: Duration::from_millis(5),
        };
        assert_eq!(t.total(), Duration::from_millis(15));
    }

    #[test]
    fn reports_once_per_window() {
        let start = Instant::now();
        let mut stats = FrameStats::new(Duration::from_secs(1));
        stats.reset(start);

        for i in 0..10 {
            let now = start + Duration::from_millis(i * 50);
            assert!(stats.record(timings(1), now).is_none());
        }

        let report = stats
            .record(timings(2), start + Duration::from_secs(1))
            .expect("window elapsed");
        assert_eq!(report.frames, 10);
        assert_eq!(report.last, timings(2));

        assert!(stats
            .record(timings(1), start + Duration::from_millis(1_100))
            .is_none());
    }

    #[test]
    fn counts_budget_overruns() {
        let start = Instant::now();
        let mut stats = FrameStats::new(Duration::from_secs(1));
        stats.reset(start);
        stats.set_budget(480, 48_000);
        assert_eq!(stats.budget(), Some(Duration::from_millis(10)));

        stats.record(timings(5), start);
        stats.record(timings(12), start);
        stats.record(timings(20), start);
        let report = stats
            .record(timings(1), start + Duration::from_secs(2))
            .unwrap();
        assert_eq!(report.overruns, 2);
        assert_eq!(report.frames, 3);
    }
}
