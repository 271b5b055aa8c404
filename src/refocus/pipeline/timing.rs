use std::time::{Duration, Instant};

use tracing::info;

/// One timed stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTiming {
    pub name: &'static str,
    pub duration: Duration,
}

/// Wall-clock time per pipeline stage, in the order the stages ran.
///
/// A stage may run more than once (one `encode` per intermediate save);
/// lookups by name return the sum.
#[derive(Debug, Default, Clone)]
pub struct PipelineTimings {
    steps: Vec<StepTiming>,
}

impl PipelineTimings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_step(&mut self, name: &'static str, duration: Duration) {
        self.steps.push(StepTiming { name, duration });
    }

    /// Closes `timer` and appends its stage.
    pub fn record(&mut self, timer: Timer) {
        self.steps.push(timer.stop());
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }

    pub fn get_step(&self, name: &str) -> Option<Duration> {
        self.steps
            .iter()
            .filter(|s| s.name == name)
            .map(|s| s.duration)
            .reduce(|a, b| a + b)
    }

    pub fn steps(&self) -> &[StepTiming] {
        &self.steps
    }

    /// Appends the stages of a nested run, e.g. `prepare` and `relax` from `process_with`.
    pub fn merge(&mut self, other: PipelineTimings) {
        self.steps.extend(other.steps);
    }

    pub fn log_summary(&self) {
        let total = self.total_duration().as_secs_f64();
        for step in &self.steps {
            let share = if total > 0.0 {
                step.duration.as_secs_f64() / total * 100.0
            } else {
                0.0
            };
            info!(
                step = step.name,
                ms = step.duration.as_secs_f64() * 1000.0,
                percent = share,
                "timing"
            );
        }
        info!(ms = total * 1000.0, "total time");
    }
}

/// Running stopwatch for a named stage.
pub struct Timer {
    name: &'static str,
    started: Instant,
}

impl Timer {
    pub fn start(name: &'static str) -> Self {
        Self {
            name,
            started: Instant::now(),
        }
    }

    pub fn stop(self) -> StepTiming {
        StepTiming {
            name: self.name,
            duration: self.started.elapsed(),
        }
    }
}
