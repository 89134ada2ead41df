//! Tag analysis.
//!
//! Converts raw samples into annotated samples: threshold alarm evaluation,
//! streaming baseline statistics and outlier classification, one runtime
//! state per tag.

use crate::config::AnalysisConfig;
use crate::types::{AlarmState, AnnotatedSample, Sample};
use std::collections::HashMap;
use std::collections::VecDeque;
use tracing::debug;

/// Standard deviations below this are treated as zero for outlier purposes.
const STDDEV_EPSILON: f64 = 1e-9;

// =============================================================================
// Baseline
// =============================================================================

/// Sliding window of recent numeric samples with exact running sums.
#[derive(Debug, Clone)]
pub struct Baseline {
    capacity: usize,
    window: VecDeque<f64>,
    sum: f64,
    sum_of_squares: f64,
    established: bool,
}

impl Baseline {
    /// Creates an empty baseline with the given window capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            window: VecDeque::with_capacity(capacity),
            sum: 0.0,
            sum_of_squares: 0.0,
            established: false,
        }
    }

    /// Pushes a value, evicting the oldest once the window is full.
    pub fn push(&mut self, value: f64) {
        if self.window.len() == self.capacity {
            if let Some(oldest) = self.window.pop_front() {
                self.sum -= oldest;
                self.sum_of_squares -= oldest * oldest;
            }
        }
        self.window.push_back(value);
        self.sum += value;
        self.sum_of_squares += value * value;
        if self.window.len() == self.capacity {
            self.established = true;
        }
    }

    /// Number of samples currently in the window.
    pub fn count(&self) -> usize {
        self.window.len()
    }

    /// Mean over the window, 0 when empty.
    pub fn mean(&self) -> f64 {
        if self.window.is_empty() {
            0.0
        } else {
            self.sum / self.window.len() as f64
        }
    }

    /// Population standard deviation over the window.
    pub fn stddev(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let variance = (self.sum_of_squares / self.window.len() as f64 - mean * mean).max(0.0);
        variance.sqrt()
    }

    /// True once the window has been filled to capacity.
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Running sum over the window.
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Running sum of squares over the window.
    pub fn sum_of_squares(&self) -> f64 {
        self.sum_of_squares
    }

    /// Clears the window and all running sums.
    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.sum_of_squares = 0.0;
        self.established = false;
    }
}

// =============================================================================
// Tag Runtime State
// =============================================================================

/// Per-tag analysis state, owned by the analyzer.
#[derive(Debug, Clone)]
pub struct TagRuntimeState {
    analysis: AnalysisConfig,
    baseline: Baseline,
    current_alarm_state: AlarmState,
}

impl TagRuntimeState {
    fn new(analysis: AnalysisConfig) -> Self {
        let capacity = analysis.baseline_sample_size as usize;
        Self {
            analysis,
            baseline: Baseline::new(capacity),
            current_alarm_state: AlarmState::Normal,
        }
    }

    /// The tag's baseline window.
    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    /// The alarm state after the most recent observation.
    pub fn current_alarm_state(&self) -> AlarmState {
        self.current_alarm_state
    }
}

// =============================================================================
// Tag Analyzer
// =============================================================================

/// Annotates samples and maintains per-tag streaming statistics.
///
/// One analyzer serves one connection; tags are keyed by name. The analyzer
/// is exclusively owned by its connection's routing task, so no locking is
/// involved.
#[derive(Debug, Default)]
pub struct TagAnalyzer {
    tags: HashMap<String, TagRuntimeState>,
}

impl TagAnalyzer {
    /// Creates an empty analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tag with fresh runtime state.
    ///
    /// Called when monitoring starts; any previous state for the tag is
    /// discarded.
    pub fn register_tag(&mut self, tag_name: &str, analysis: &AnalysisConfig) {
        self.tags
            .insert(tag_name.to_string(), TagRuntimeState::new(analysis.clone()));
    }

    /// Applies a changed analysis configuration to a registered tag.
    ///
    /// The baseline is cleared when `outlier_enabled` toggles or
    /// `baseline_sample_size` changes; other edits keep the window.
    pub fn update_config(&mut self, tag_name: &str, analysis: &AnalysisConfig) {
        match self.tags.get_mut(tag_name) {
            Some(state) => {
                let reset = state.analysis.outlier_enabled != analysis.outlier_enabled
                    || state.analysis.baseline_sample_size != analysis.baseline_sample_size;
                state.analysis = analysis.clone();
                if reset {
                    debug!(tag_name, "analysis settings changed, clearing baseline");
                    state.baseline = Baseline::new(analysis.baseline_sample_size as usize);
                }
            }
            None => self.register_tag(tag_name, analysis),
        }
    }

    /// Clears the runtime state of a tag.
    pub fn reset(&mut self, tag_name: &str) {
        if let Some(state) = self.tags.get_mut(tag_name) {
            state.baseline.reset();
            state.current_alarm_state = AlarmState::Normal;
        }
    }

    /// Returns the runtime state of a tag.
    pub fn state(&self, tag_name: &str) -> Option<&TagRuntimeState> {
        self.tags.get(tag_name)
    }

    /// Observes a sample and returns it annotated.
    ///
    /// Mutates only the matching tag's runtime state.
    pub fn observe(&mut self, sample: Sample) -> AnnotatedSample {
        let state = self
            .tags
            .entry(sample.tag_name.clone())
            .or_insert_with(|| TagRuntimeState::new(AnalysisConfig::default()));

        // Bad quality short-circuits everything, statistics untouched
        if !sample.is_good_quality {
            let changed = state.current_alarm_state != AlarmState::Error;
            state.current_alarm_state = AlarmState::Error;
            let alarm_message = sample.error_message.clone();
            return AnnotatedSample {
                sample,
                alarm_state: AlarmState::Error,
                mean: None,
                stddev: None,
                alarm_message,
                state_changed: changed,
            };
        }

        let numeric = sample.value.as_f64();
        let analysis = &state.analysis;
        let is_bool = matches!(sample.value, crate::types::TagValue::Bool(_));

        // Non-numeric where analysis expects numbers is an error state;
        // booleans simply pass through
        if numeric.is_none()
            && !is_bool
            && (analysis.alarming_enabled || analysis.outlier_enabled)
        {
            let changed = state.current_alarm_state != AlarmState::Error;
            state.current_alarm_state = AlarmState::Error;
            let message = format!("NonNumericValue: {}", sample.tag_name);
            let mut sample = sample;
            sample.is_good_quality = false;
            sample.error_message = Some(message.clone());
            return AnnotatedSample {
                sample,
                alarm_state: AlarmState::Error,
                mean: None,
                stddev: None,
                alarm_message: Some(message),
                state_changed: changed,
            };
        }

        let mut alarm_state = AlarmState::Normal;
        let mut mean = None;
        let mut stddev = None;

        if let Some(value) = numeric {
            if analysis.alarming_enabled {
                alarm_state = classify_thresholds(value, analysis);
            }

            if analysis.outlier_enabled {
                // Classify against the established baseline, then fold the
                // new value into the window
                let established = state.baseline.is_established();
                let baseline_mean = state.baseline.mean();
                let baseline_stddev = state.baseline.stddev();

                state.baseline.push(value);

                if established
                    && baseline_stddev > STDDEV_EPSILON
                    && (value - baseline_mean).abs()
                        > analysis.outlier_sigma_factor * baseline_stddev
                {
                    alarm_state = AlarmState::Outlier;
                }

                mean = Some(state.baseline.mean());
                stddev = Some(state.baseline.stddev());
            }
        }

        let alarm_message = if alarm_state != AlarmState::Normal {
            Some(render_alarm_message(
                &analysis.alarm_message_format,
                &sample,
                alarm_state,
            ))
        } else {
            None
        };

        let changed = state.current_alarm_state != alarm_state;
        state.current_alarm_state = alarm_state;

        AnnotatedSample {
            sample,
            alarm_state,
            mean,
            stddev,
            alarm_message,
            state_changed: changed,
        }
    }
}

/// Picks the highest-priority matching threshold band.
fn classify_thresholds(value: f64, analysis: &AnalysisConfig) -> AlarmState {
    if analysis.high_high.is_some_and(|t| value >= t) {
        AlarmState::HighHigh
    } else if analysis.low_low.is_some_and(|t| value <= t) {
        AlarmState::LowLow
    } else if analysis.high.is_some_and(|t| value >= t) {
        AlarmState::High
    } else if analysis.low.is_some_and(|t| value <= t) {
        AlarmState::Low
    } else {
        AlarmState::Normal
    }
}

/// Renders an alarm message from the configured template.
fn render_alarm_message(format: &str, sample: &Sample, state: AlarmState) -> String {
    format
        .replace("{TagName}", &sample.tag_name)
        .replace("{AlarmState}", &state.to_string())
        .replace("{Value}", &sample.value.to_string())
}
