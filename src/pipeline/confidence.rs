//! Honest confidence aggregation.
//!
//! The tracker only ever stores real measurements from completed steps.
//! Skipped and failed steps contribute nothing; no value is synthesised to
//! fill a gap, so the reported means are exactly the means of what ran.

use rustc_hash::FxHashMap;

use crate::types::ConfidenceEntry;

use super::steps::{PipelinePhase, PipelineStep};

/// Append-only collection of per-step confidence measurements.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceTracker {
    entries: Vec<ConfidenceEntry>,
}

impl ConfidenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a real measurement for a completed step.
    pub fn record(&mut self, step: PipelineStep, value: f64) {
        debug_assert!(
            (0.0..=1.0).contains(&value),
            "confidence must be in [0.0, 1.0], got {value}",
        );
        self.entries.push(ConfidenceEntry {
            step: step.number(),
            phase: step.phase().label().to_string(),
            value: value.clamp(0.0, 1.0),
        });
    }

    /// All recorded entries, in execution order.
    #[must_use]
    pub fn entries(&self) -> &[ConfidenceEntry] {
        &self.entries
    }

    /// Mean of the entries recorded for one phase, if any ran.
    #[must_use]
    pub fn phase_mean(&self, phase: PipelinePhase) -> Option<f64> {
        let values: Vec<f64> = self
            .entries
            .iter()
            .filter(|e| e.phase == phase.label())
            .map(|e| e.value)
            .collect();
        mean(&values)
    }

    /// Per-phase means for every phase with at least one entry.
    #[must_use]
    pub fn phase_means(&self) -> FxHashMap<String, f64> {
        let mut sums: FxHashMap<&str, (f64, usize)> = FxHashMap::default();
        for entry in &self.entries {
            let slot = sums.entry(entry.phase.as_str()).or_insert((0.0, 0));
            slot.0 += entry.value;
            slot.1 += 1;
        }
        sums.into_iter()
            .map(|(phase, (sum, n))| (phase.to_string(), sum / n as f64))
            .collect()
    }

    /// Mean of all recorded entries; 0 when nothing completed.
    #[must_use]
    pub fn overall(&self) -> f64 {
        let values: Vec<f64> = self.entries.iter().map(|e| e.value).collect();
        mean(&values).unwrap_or(0.0)
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overall_is_mean_of_real_entries() {
        let mut tracker = ConfidenceTracker::new();
        tracker.record(PipelineStep::Reconnaissance, 0.8);
        tracker.record(PipelineStep::CharacterCleaning, 0.6);
        assert!((tracker.overall() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn skipped_steps_contribute_nothing() {
        let tracker = ConfidenceTracker::new();
        assert_eq!(tracker.overall(), 0.0);
        assert!(tracker.phase_mean(PipelinePhase::Reflow).is_none());
        assert!(tracker.phase_means().is_empty());
    }

    #[test]
    fn phase_means_group_by_phase() {
        let mut tracker = ConfidenceTracker::new();
        tracker.record(PipelineStep::PageNumbers, 0.9);
        tracker.record(PipelineStep::HeadersFooters, 0.7);
        tracker.record(PipelineStep::FinalReview, 0.5);
        let means = tracker.phase_means();
        assert!((means["page_cleanup"] - 0.8).abs() < 1e-9);
        assert!((means["review"] - 0.5).abs() < 1e-9);
        assert_eq!(means.len(), 2);
    }
}
