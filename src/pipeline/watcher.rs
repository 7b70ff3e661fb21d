// file: src/pipeline/watcher.rs
// description: polls a detection output directory and reports new result/source pairs
// reference: https://docs.rs/walkdir, tokio interval timers

use crate::models::{DetectionPair, EventSink, PipelineEvent};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// One synchronous pass over the result directory. Owns the set of result
/// file names already reported; a name is reported at most once.
///
/// A result whose source image is not visible yet stays unseen and is
/// checked again on the next pass, for as long as the scanner lives.
#[derive(Debug)]
pub struct ResultScanner {
    source_dir: PathBuf,
    result_dir: PathBuf,
    source_extension: String,
    result_extension: String,
    seen: HashSet<String>,
}

impl ResultScanner {
    pub fn new(
        source_dir: impl Into<PathBuf>,
        result_dir: impl Into<PathBuf>,
        source_extension: impl Into<String>,
        result_extension: impl Into<String>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            result_dir: result_dir.into(),
            source_extension: source_extension.into(),
            result_extension: result_extension.into(),
            seen: HashSet::new(),
        }
    }

    pub fn scan(&mut self) -> Vec<DetectionPair> {
        if !self.result_dir.is_dir() {
            return Vec::new();
        }

        let names = match self.list_results() {
            Ok(names) => names,
            Err(e) => {
                warn!(
                    "Failed to list detection results in {}: {}",
                    self.result_dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut pairs = Vec::new();
        for name in names {
            if self.seen.contains(&name) {
                continue;
            }

            let source_name = Path::new(&name).with_extension(&self.source_extension);
            let source_artifact = self.source_dir.join(source_name);
            if !source_artifact.is_file() {
                debug!("Result {} has no source image yet", name);
                continue;
            }

            pairs.push(DetectionPair {
                source_artifact,
                result_artifact: self.result_dir.join(&name),
            });
            self.seen.insert(name);
        }
        pairs
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn list_results(&self) -> walkdir::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.result_dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == self.result_extension.as_str())
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }
}

/// Background poller that runs beside a detection step.
pub struct ResultWatcher {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<usize>>,
    found: usize,
}

impl ResultWatcher {
    pub fn start(scanner: ResultScanner, poll_interval: Duration, events: EventSink) -> Self {
        info!(
            "Watching {} for detection results",
            scanner.result_dir.display()
        );
        let (shutdown, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(watch_loop(scanner, poll_interval, events, shutdown_rx));

        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
            found: 0,
        }
    }

    /// Stops polling and waits for the loop to exit. Safe to call again;
    /// later calls return the same count without waiting.
    pub async fn stop(&mut self) -> usize {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }

        if let Some(handle) = self.handle.take() {
            match handle.await {
                Ok(found) => self.found = found,
                Err(e) => warn!("Result watcher task ended abnormally: {}", e),
            }
        }

        self.found
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for ResultWatcher {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Shortest polling period; `tokio::time::interval` rejects zero.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

async fn watch_loop(
    mut scanner: ResultScanner,
    poll_interval: Duration,
    events: EventSink,
    mut shutdown: oneshot::Receiver<()>,
) -> usize {
    let mut ticker = tokio::time::interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut found = 0;

    loop {
        let stopping = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            _ = ticker.tick() => false,
        };
        if stopping {
            break;
        }

        match sweep(scanner, &events).await {
            Some((next, count)) => {
                scanner = next;
                found += count;
            }
            None => return found,
        }
    }

    // last pass so results written during the final interval are not lost
    if let Some((_, count)) = sweep(scanner, &events).await {
        found += count;
    }
    debug!("Result watcher stopped after {} pairs", found);
    found
}

/// Runs one scan on the blocking pool and publishes what it found.
async fn sweep(
    mut scanner: ResultScanner,
    events: &EventSink,
) -> Option<(ResultScanner, usize)> {
    let joined = tokio::task::spawn_blocking(move || {
        let pairs = scanner.scan();
        (scanner, pairs)
    })
    .await;

    match joined {
        Ok((scanner, pairs)) => Some((scanner, publish(events, pairs))),
        Err(e) => {
            warn!("Detection result scan did not finish: {}", e);
            None
        }
    }
}

fn publish(events: &EventSink, pairs: Vec<DetectionPair>) -> usize {
    let count = pairs.len();
    for pair in pairs {
        debug!(
            "Detection pair: {} -> {}",
            pair.source_artifact.display(),
            pair.result_artifact.display()
        );
        events.emit(PipelineEvent::DetectionPairFound(pair));
    }
    count
}
