//! How long each stage of a build took.

use std::{
    collections::BTreeMap,
    fmt::Write,
    thread::ThreadId,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::diagnostics::Stage;

#[derive(Debug, Clone)]
pub struct StageTime {
    pub stage: Stage,
    pub entity: String,
    pub thread_id: ThreadId,
    pub elapsed: Duration,
}

/// Accumulates stage timings from any thread.
#[derive(Debug)]
pub struct StageTimer {
    /// The beginning of time
    t0: Instant,
    times: Mutex<Vec<StageTime>>,
}

impl Default for StageTimer {
    fn default() -> Self {
        Self {
            t0: Instant::now(),
            times: Default::default(),
        }
    }
}

impl StageTimer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Run `f`, recording how long it took
    pub fn time<T>(&self, stage: Stage, entity: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.times.lock().push(StageTime {
            stage,
            entity: entity.to_string(),
            thread_id: std::thread::current().id(),
            elapsed: start.elapsed(),
        });
        result
    }

    pub fn times(&self) -> Vec<StageTime> {
        self.times.lock().clone()
    }

    /// Total time and count per stage, in stage order
    pub fn totals(&self) -> BTreeMap<Stage, (Duration, usize)> {
        let mut totals: BTreeMap<Stage, (Duration, usize)> = BTreeMap::new();
        for time in self.times.lock().iter() {
            let entry = totals.entry(time.stage).or_default();
            entry.0 += time.elapsed;
            entry.1 += 1;
        }
        totals
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<20} {:>6} {:>12}",
            "stage", "count", "total ms"
        );
        for (stage, (elapsed, count)) in self.totals() {
            let _ = writeln!(
                out,
                "{:<20} {count:>6} {:>12.3}",
                stage.to_string(),
                elapsed.as_secs_f64() * 1000.0
            );
        }
        let _ = writeln!(
            out,
            "{:<20} {:>6} {:>12.3}",
            "wall",
            "",
            self.t0.elapsed().as_secs_f64() * 1000.0
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use more_asserts::assert_ge;

    use super::*;

    #[test]
    fn totals_per_stage() {
        let timer = StageTimer::new();
        let value = timer.time(Stage::Interpolate, "Bold", || {
            std::thread::sleep(Duration::from_millis(2));
            7
        });
        assert_eq!(7, value);
        timer.time(Stage::Interpolate, "Light", || ());
        timer.time(Stage::Write, "Light", || ());

        let totals = timer.totals();
        assert_eq!(2, totals[&Stage::Interpolate].1);
        assert_ge!(totals[&Stage::Interpolate].0, Duration::from_millis(2));
        assert_eq!(
            vec![Stage::Interpolate, Stage::Write],
            totals.keys().copied().collect::<Vec<_>>()
        );
        let summary = timer.summary();
        assert!(summary.contains("interpolate"), "{summary}");
        assert!(summary.contains("wall"), "{summary}");
    }
}
