use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::pipeline::frame_analysis_controller::FrameDisposition;

/// Cross-cutting logger for frame analysis events.
///
/// Decouples the controller from specific output mechanisms so callers can
/// observe admission decisions and stage timings without changing the
/// orchestration code.
pub trait PipelineLogger: Send {
    /// Record what happened to one delivered frame.
    fn disposition(&mut self, disposition: FrameDisposition);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces found in a frame).
    fn metric(&mut self, name: &str, value: f64);

    /// Log a human-readable status message.
    fn info(&mut self, message: &str);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Logger shared between the frame-delivery side and the analysis worker.
pub type SharedLogger = Arc<Mutex<dyn PipelineLogger>>;

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl NullPipelineLogger {
    pub fn shared() -> SharedLogger {
        Arc::new(Mutex::new(NullPipelineLogger))
    }
}

impl PipelineLogger for NullPipelineLogger {
    fn disposition(&mut self, _disposition: FrameDisposition) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// CLI-oriented logger that counts frame dispositions, tracks per-stage
/// timing and metrics, and reports a summary at the end of a run.
pub struct StdoutPipelineLogger {
    dispositions: HashMap<FrameDisposition, usize>,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    start_time: Instant,
    messages: Vec<String>,
}

impl StdoutPipelineLogger {
    pub fn new() -> Self {
        Self {
            dispositions: HashMap::new(),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            messages: Vec::new(),
        }
    }

    /// Frames seen so far with the given disposition.
    pub fn count(&self, disposition: FrameDisposition) -> usize {
        self.dispositions.get(&disposition).copied().unwrap_or(0)
    }

    pub fn total_frames(&self) -> usize {
        self.dispositions.values().sum()
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.dispositions.is_empty() && self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.total_frames();
        let mut lines = Vec::new();

        lines.push(format!(
            "Analysis summary ({frames} frames, {:.1}s total):",
            elapsed_ms / 1000.0
        ));

        for disposition in FrameDisposition::ALL {
            let n = self.count(*disposition);
            if n > 0 {
                lines.push(format!("  {:12}: {n}", disposition.label()));
            }
        }

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = if durations.is_empty() {
                0.0
            } else {
                total_ms / durations.len() as f64
            };
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        let admitted = self.count(FrameDisposition::Admitted);
        if admitted > 0 && elapsed_ms > 0.0 {
            let fps = admitted as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Analyzed: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn disposition(&mut self, disposition: FrameDisposition) {
        *self.dispositions.entry(disposition).or_default() += 1;
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn info(&mut self, message: &str) {
        self.messages.push(message.to_string());
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
