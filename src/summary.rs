//! Summary statistics over a detection report.

use crate::output::DetectionReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate view of one report at one threshold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Images submitted to the run.
    pub image_count: usize,
    /// Detections at or above the threshold.
    pub detection_count: usize,
    /// Mean confidence of those detections, 0 when there are none.
    pub mean_confidence: f64,
    /// Lowest confidence, 0 when there are none.
    pub min_confidence: f64,
    /// Highest confidence, 0 when there are none.
    pub max_confidence: f64,
    /// Sorted distinct label names.
    pub labels: Vec<String>,
    /// Detections per label.
    pub label_counts: BTreeMap<String, usize>,
}

/// Reduce a report at `threshold` (`confidence >= threshold` survives).
pub fn summarize(report: &DetectionReport, threshold: f32) -> Summary {
    let survivors: Vec<_> = report
        .detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .collect();

    let mut label_counts = BTreeMap::new();
    for detection in &survivors {
        *label_counts.entry(detection.label.clone()).or_insert(0) += 1;
    }

    let confidences = survivors.iter().map(|d| f64::from(d.confidence));
    let (mean_confidence, min_confidence, max_confidence) = if survivors.is_empty() {
        (0.0, 0.0, 0.0)
    } else {
        #[allow(clippy::cast_precision_loss)]
        let mean = confidences.clone().sum::<f64>() / survivors.len() as f64;
        (
            mean,
            confidences.clone().fold(f64::MAX, f64::min),
            confidences.fold(f64::MIN, f64::max),
        )
    };

    Summary {
        image_count: report.run.image_count,
        detection_count: survivors.len(),
        mean_confidence,
        min_confidence,
        max_confidence,
        labels: label_counts.keys().cloned().collect(),
        label_counts,
    }
}

impl Summary {
    /// Human-readable multi-line rendering.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Images:          {}\nDetections:      {}\nMean confidence: {:.1}%\n",
            self.image_count,
            self.detection_count,
            self.mean_confidence * 100.0
        );
        if self.detection_count > 0 {
            out.push_str(&format!(
                "Confidence range: {:.1}% - {:.1}%\n",
                self.min_confidence * 100.0,
                self.max_confidence * 100.0
            ));
        }
        if self.labels.is_empty() {
            out.push_str("Labels:          none\n");
        } else {
            out.push_str("Labels:\n");
            for (label, count) in &self.label_counts {
                out.push_str(&format!("  {label:<14} {count}\n"));
            }
        }
        out
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::inference::BBox;
    use crate::output::{DetectionRecord, RunInfo};

    fn report(scores: &[(f32, &str)]) -> DetectionReport {
        let mut report = DetectionReport::empty(RunInfo::now(0.0, 3, "rdd"));
        report.detections = scores
            .iter()
            .enumerate()
            .map(|(i, (confidence, label))| DetectionRecord {
                image_id: format!("img{i}"),
                image: format!("img{i}.jpg"),
                bbox: BBox::new(0.0, 0.0, 5.0, 5.0),
                class_id: 1,
                label: (*label).to_string(),
                confidence: *confidence,
            })
            .collect();
        report
    }

    #[test]
    fn test_threshold_filters_and_averages() {
        let report = report(&[(0.9, "Crack"), (0.5, "Pothole"), (0.8, "Manhole")]);
        let summary = summarize(&report, 0.74);

        assert_eq!(summary.image_count, 3);
        assert_eq!(summary.detection_count, 2);
        assert!((summary.mean_confidence - 0.85).abs() < 1e-6);
        assert_eq!(summary.labels, vec!["Crack", "Manhole"]);
        assert_eq!(summary.label_counts["Crack"], 1);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let report = report(&[(0.74, "Crack")]);
        assert_eq!(summarize(&report, 0.74).detection_count, 1);
    }

    #[test]
    fn test_no_survivors_gives_zero_mean() {
        let report = report(&[(0.2, "Crack")]);
        let summary = summarize(&report, 0.5);

        assert_eq!(summary.detection_count, 0);
        assert_eq!(summary.mean_confidence, 0.0);
        assert_eq!(summary.min_confidence, 0.0);
        assert!(summary.labels.is_empty());
    }

    #[test]
    fn test_higher_threshold_never_adds_detections() {
        let report = report(&[
            (0.95, "Crack"),
            (0.5, "Pothole"),
            (0.74, "Manhole"),
            (0.1, "Crack"),
        ]);
        let thresholds = [0.0, 0.1, 0.5, 0.74, 0.9, 1.0];
        let counts: Vec<usize> = thresholds
            .iter()
            .map(|t| summarize(&report, *t).detection_count)
            .collect();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(counts, vec![4, 4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_render_lists_labels() {
        let text = summarize(&report(&[(0.9, "Crack")]), 0.5).render();
        assert!(text.contains("Detections:      1"));
        assert!(text.contains("Crack"));
        assert!(text.contains("90.0%"));
    }
}
