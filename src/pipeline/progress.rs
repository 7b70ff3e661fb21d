// file: src/pipeline/progress.rs
// description: step-local progress aggregation and run statistics
// reference: throttled ui updates with threshold log lines every 10 percent

use crate::models::{EventSink, PipelineEvent};
use crate::registry::ProgressSink;
use std::time::{Duration, Instant};

/// Percentages at which a log line is written, once each per step.
const LOG_THRESHOLDS: [u32; 11] = [0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 100];

/// `floor(current / total * 100)` clamped to 100; a zero total reads as 0%.
pub fn percentage(current: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = (current as u128 * 100 / total as u128).min(100);
    pct as u32
}

/// Turns the progress samples of the running step into throttled
/// `StepProgress` events and threshold log lines.
///
/// Only step-local output is produced here. The pipeline-level count of
/// completed steps belongs to the runner.
pub struct ProgressAggregator {
    step_name: String,
    events: EventSink,
    ui_interval: Duration,
    last_ui_update: Option<Instant>,
    previous_pct: Option<u32>,
    fired: [bool; LOG_THRESHOLDS.len()],
    last_sample: Option<(u64, u64)>,
}

impl ProgressAggregator {
    pub fn new(step_name: impl Into<String>, events: EventSink, ui_interval: Duration) -> Self {
        Self {
            step_name: step_name.into(),
            events,
            ui_interval,
            last_ui_update: None,
            previous_pct: None,
            fired: [false; LOG_THRESHOLDS.len()],
            last_sample: None,
        }
    }

    pub fn update_at(&mut self, current: u64, total: u64, now: Instant) {
        let pct = percentage(current, total);

        // Threshold lines bypass the ui throttle.
        for (slot, &point) in LOG_THRESHOLDS.iter().enumerate() {
            let was_below = self.previous_pct.is_none_or(|prev| prev < point);
            if !self.fired[slot] && was_below && pct >= point {
                self.fire_threshold(slot, current, total);
            }
        }
        self.previous_pct = Some(pct);
        self.last_sample = Some((current, total));

        let due = self
            .last_ui_update
            .is_none_or(|last| now.saturating_duration_since(last) >= self.ui_interval);
        if due {
            self.last_ui_update = Some(now);
            self.events
                .emit(PipelineEvent::StepProgress { current, total });
        }
    }

    /// Called once the routine returns successfully. Every threshold still
    /// unfired logs in ascending order at `total/total`, then a final
    /// unthrottled progress event.
    pub fn finish(&mut self) {
        if let Some((_, total)) = self.last_sample {
            for slot in 0..LOG_THRESHOLDS.len() {
                if !self.fired[slot] {
                    self.fire_threshold(slot, total, total);
                }
            }
            self.events.emit(PipelineEvent::StepProgress {
                current: total,
                total,
            });
        }
        self.events.log(format!("{}: done (100%)", self.step_name));
    }

    pub fn percentage(&self) -> u32 {
        self.previous_pct.unwrap_or(0)
    }

    fn fire_threshold(&mut self, slot: usize, current: u64, total: u64) {
        self.fired[slot] = true;
        self.events.log(format!(
            "{}: {}% ({}/{})",
            self.step_name, LOG_THRESHOLDS[slot], current, total
        ));
    }
}

impl ProgressSink for ProgressAggregator {
    fn update(&mut self, current: u64, total: u64) {
        self.update_at(current, total, Instant::now());
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub steps_total: usize,
    pub steps_completed: usize,
    pub steps_failed: usize,
    pub steps_skipped: usize,
    pub detections_found: usize,
    pub duration_ms: u64,
}

impl PipelineStats {
    pub fn new(steps_total: usize) -> Self {
        Self {
            steps_total,
            ..Self::default()
        }
    }

    /// Steps that never ran: neither completed, failed nor skipped by the start index.
    pub fn steps_not_run(&self) -> usize {
        self.steps_total
            .saturating_sub(self.steps_completed + self.steps_failed + self.steps_skipped)
    }

    pub fn success_rate(&self) -> f64 {
        let attempted = self.steps_completed + self.steps_failed;
        if attempted == 0 {
            return 0.0;
        }
        (self.steps_completed as f64 / attempted as f64) * 100.0
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}
