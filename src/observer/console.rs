// file: src/observer/console.rs
// description: terminal rendering of pipeline events with progress bars
// reference: uses indicatif for progress bars and colored for status lines

use crate::models::{EventReceiver, PipelineEvent};
use crate::pipeline::percentage;
use crate::utils::logging::{format_error, format_info, format_step, format_success};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFormat {
    /// Progress bars and colored lines.
    Pretty,
    /// One JSON object per event on stdout.
    Json,
}

/// Renders the coarse step counter and the running step's own percentage.
pub struct ConsoleObserver {
    multi: MultiProgress,
    steps_bar: ProgressBar,
    step_bar: ProgressBar,
    total_steps: usize,
    format: EventFormat,
    detections: usize,
    last_failure: Option<String>,
}

impl ConsoleObserver {
    pub fn new(total_steps: usize, start_index: usize, colored: bool, format: EventFormat) -> Self {
        let multi = match format {
            EventFormat::Pretty => MultiProgress::new(),
            EventFormat::Json => MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        };
        Self::build(multi, total_steps, start_index, colored, format)
    }

    /// Observer that draws nothing; used where no terminal is attached.
    pub fn hidden(total_steps: usize, start_index: usize) -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        Self::build(multi, total_steps, start_index, false, EventFormat::Pretty)
    }

    fn build(
        multi: MultiProgress,
        total_steps: usize,
        start_index: usize,
        colored: bool,
        format: EventFormat,
    ) -> Self {
        let steps_bar = create_steps_bar(&multi, total_steps as u64, colored);
        steps_bar.set_position(start_index as u64);
        let step_bar = create_step_bar(&multi);

        Self {
            multi,
            steps_bar,
            step_bar,
            total_steps,
            format,
            detections: 0,
            last_failure: None,
        }
    }

    /// Consumes events until every sender is gone.
    pub async fn consume(mut self, mut events: EventReceiver) -> Self {
        while let Some(event) = events.recv().await {
            self.handle(&event);
        }
        self
    }

    pub fn handle(&mut self, event: &PipelineEvent) {
        if self.format == EventFormat::Json {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
            self.track(event);
            return;
        }

        match event {
            PipelineEvent::StepStarted { index, name } => {
                self.step_bar.set_position(0);
                self.step_bar.set_message(name.clone());
                self.print(format_step(index + 1, self.total_steps, name));
            }
            PipelineEvent::StepProgress { current, total } => {
                self.step_bar.set_position(percentage(*current, *total) as u64);
            }
            PipelineEvent::StepCompleted { index } => {
                self.print(format_success(&format!("Step {} completed", index + 1)));
            }
            PipelineEvent::StepFailed { index, message } => {
                self.print(format_error(&format!("Step {} failed: {}", index + 1, message)));
            }
            PipelineEvent::DetectionPairFound(pair) => {
                self.print(format_info(&format!(
                    "Detection: {} -> {}",
                    pair.source_artifact.display(),
                    pair.result_artifact.display()
                )));
            }
            PipelineEvent::LogLine(line) => self.print(line.clone()),
            PipelineEvent::PipelineCompleted { success } => {
                if *success {
                    self.steps_bar.finish_with_message("Pipeline complete");
                } else {
                    self.steps_bar.abandon_with_message("Pipeline stopped");
                }
                self.step_bar.finish_and_clear();
            }
        }
        self.track(event);
    }

    fn track(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StepCompleted { index } => {
                // coarse progress follows step completions only
                self.steps_bar.set_position(*index as u64 + 1);
            }
            PipelineEvent::StepFailed { message, .. } => {
                self.last_failure = Some(message.clone());
            }
            PipelineEvent::DetectionPairFound(_) => self.detections += 1,
            _ => {}
        }
    }

    pub fn completed_steps(&self) -> u64 {
        self.steps_bar.position()
    }

    pub fn step_percentage(&self) -> u64 {
        self.step_bar.position()
    }

    pub fn detections(&self) -> usize {
        self.detections
    }

    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    fn print(&self, line: String) {
        if self.multi.println(&line).is_err() {
            println!("{}", line);
        }
    }
}

fn create_steps_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} steps {msg}"
    };
    let chars = if colored { "█▓▒░" } else { "=>-" };
    if let Ok(style) = ProgressStyle::default_bar().template(template) {
        bar.set_style(style.progress_chars(chars));
    }
    bar
}

fn create_step_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(100));
    if let Ok(style) = ProgressStyle::default_bar().template("  {msg} [{bar:30}] {pos}%") {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DetectionPair;
    use crate::models::event::channel;
    use std::path::PathBuf;

    #[test]
    fn test_coarse_counter_ignores_step_progress() {
        let mut observer = ConsoleObserver::hidden(3, 0);

        observer.handle(&PipelineEvent::StepStarted {
            index: 0,
            name: "HSV".to_string(),
        });
        observer.handle(&PipelineEvent::StepProgress { current: 7, total: 10 });
        assert_eq!(observer.completed_steps(), 0);
        assert_eq!(observer.step_percentage(), 70);

        observer.handle(&PipelineEvent::StepCompleted { index: 0 });
        assert_eq!(observer.completed_steps(), 1);
    }

    #[test]
    fn test_resume_starts_counter_at_start_index() {
        let observer = ConsoleObserver::hidden(5, 2);
        assert_eq!(observer.completed_steps(), 2);
    }

    #[tokio::test]
    async fn test_consume_tracks_failures_and_detections() {
        let (sink, rx) = channel();
        sink.emit(PipelineEvent::DetectionPairFound(DetectionPair {
            source_artifact: PathBuf::from("images/a.tif"),
            result_artifact: PathBuf::from("labels/a.txt"),
        }));
        sink.emit(PipelineEvent::StepFailed {
            index: 1,
            message: "exit code 1".to_string(),
        });
        sink.emit(PipelineEvent::PipelineCompleted { success: false });
        drop(sink);

        let observer = ConsoleObserver::hidden(2, 0).consume(rx).await;
        assert_eq!(observer.detections(), 1);
        assert_eq!(observer.last_failure(), Some("exit code 1"));
    }
}
