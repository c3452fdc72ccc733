use serde::Serialize;

use crate::{
    bounding_box::{BoundingBox, iou},
    error::YoloV1Error,
};

/// Candidate detection decoded from a single predictor slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Bounding box relative to the full image.
    pub bbox: BoundingBox,
    /// Objectness reported by the predictor slot.
    pub confidence: f32,
    /// Class probabilities of the cell the slot belongs to.
    pub class_probs: Vec<f32>,
}

/// Detection surviving non-maximum suppression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
    /// Bounding box relative to the full image.
    pub bbox: BoundingBox,
    /// Class-specific confidence score of the detection.
    pub confidence: f32,
    /// 0-based class index of the detection.
    pub class: u32,
}

impl Detection {
    /// Turn the detection back into a candidate with a one-hot class distribution.
    ///
    /// Running [`non_maximum_suppression`] over the converted output with the same thresholds
    /// yields the same detections only if every detection survived through the column of its own
    /// class. A detection kept alive by another class column is moved into its label's column and
    /// may then be suppressed.
    pub fn to_candidate(&self, num_classes: usize) -> Candidate {
        let mut class_probs = vec![0.0; num_classes];
        if let Some(p) = class_probs.get_mut(self.class as usize) {
            *p = 1.0;
        }
        Candidate {
            bbox: self.bbox,
            confidence: self.confidence,
            class_probs,
        }
    }
}

/// Index of the first maximum value.
fn argmax(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Class-wise non-maximum suppression.
///
/// Scores every candidate per class as `confidence * class_prob`, discards scores at or below
/// `confidence_threshold`, and for each class independently zeroes the score of any candidate
/// overlapping a higher ranked one by more than `nms_threshold`. Ranking uses a stable sort, so
/// equal scores keep their candidate order.
///
/// A candidate survives if any of its class scores does. Its reported confidence is the best
/// surviving score, while its class is the argmax of the raw class probabilities.
///
/// # Arguments
///
/// * `candidates` - The candidates, each carrying the same number of classes.
/// * `confidence_threshold` - The class-specific confidence threshold.
/// * `nms_threshold` - The IoU threshold for suppression.
pub fn non_maximum_suppression(
    candidates: &[Candidate],
    confidence_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>, YoloV1Error> {
    let Some(first) = candidates.first() else {
        return Ok(vec![]);
    };
    let nclasses = first.class_probs.len();
    if let Some(c) = candidates.iter().find(|c| c.class_probs.len() != nclasses) {
        return Err(YoloV1Error::ShapeMismatch {
            expected: vec![nclasses],
            actual: vec![c.class_probs.len()],
        });
    }

    // class-specific confidence, one row per candidate
    let mut scores: Vec<Vec<f32>> = candidates
        .iter()
        .map(|c| {
            c.class_probs
                .iter()
                .map(|&p| {
                    let score = c.confidence * p;
                    if score <= confidence_threshold { 0.0 } else { score }
                })
                .collect()
        })
        .collect();

    for class in 0..nclasses {
        let mut rank: Vec<usize> = (0..candidates.len()).collect();
        rank.sort_by(|&a, &b| scores[b][class].total_cmp(&scores[a][class]));

        for (pos, &i) in rank.iter().enumerate() {
            if scores[i][class] == 0.0 {
                continue;
            }
            for &j in &rank[pos + 1..] {
                if scores[j][class] != 0.0
                    && iou(&candidates[i].bbox, &candidates[j].bbox) > nms_threshold
                {
                    scores[j][class] = 0.0;
                }
            }
        }
    }

    let detections: Vec<Detection> = candidates
        .iter()
        .zip(&scores)
        .filter_map(|(candidate, row)| {
            let confidence = row.iter().copied().fold(0.0, f32::max);
            (confidence > 0.0).then(|| Detection {
                bbox: candidate.bbox,
                confidence,
                class: argmax(&candidate.class_probs) as u32,
            })
        })
        .collect();

    tracing::debug!(
        "non-maximum suppression kept {} of {} candidates",
        detections.len(),
        candidates.len()
    );

    Ok(detections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(x: f32, y: f32, confidence: f32, class_probs: &[f32]) -> Candidate {
        Candidate {
            bbox: BoundingBox::new(x, y, 0.2, 0.2),
            confidence,
            class_probs: class_probs.to_vec(),
        }
    }

    #[test]
    fn test_non_maximum_suppression_identical() -> Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            candidate(0.5, 0.5, 0.9, &[0.0, 1.0, 0.0]),
            candidate(0.5, 0.5, 0.9, &[0.0, 1.0, 0.0]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class, 1);
        assert!((detections[0].confidence - 0.9).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_tie_keeps_first() -> Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            candidate(0.50, 0.5, 0.8, &[1.0, 0.0]),
            candidate(0.52, 0.5, 0.8, &[1.0, 0.0]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox.x, 0.50);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_empty() -> Result<(), Box<dyn std::error::Error>> {
        assert!(non_maximum_suppression(&[], 0.1, 0.3)?.is_empty());

        let candidates = vec![candidate(0.5, 0.5, 0.0, &[0.5, 0.5]); 98];
        assert!(non_maximum_suppression(&candidates, 0.1, 0.3)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_threshold() -> Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            candidate(0.2, 0.2, 0.5, &[0.2, 0.8]),
            candidate(0.8, 0.8, 0.2, &[0.5, 0.5]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;

        // 0.2 * 0.5 = 0.1 is not above the threshold
        assert_eq!(detections.len(), 1);
        assert!(detections.iter().all(|d| d.confidence > 0.1));
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_per_class() -> Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            candidate(0.5, 0.5, 1.0, &[0.9, 0.1]),
            candidate(0.5, 0.5, 1.0, &[0.2, 0.8]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;

        // overlapping boxes of different classes both survive
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class, 0);
        assert_eq!(detections[1].class, 1);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_raw_argmax_label() -> Result<(), Box<dyn std::error::Error>> {
        // the second candidate loses class 0 to the first but survives through class 1,
        // yet is still labelled with its raw argmax class 0
        let candidates = vec![
            candidate(0.5, 0.5, 1.0, &[0.9, 0.0]),
            candidate(0.5, 0.5, 1.0, &[0.6, 0.4]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[1].class, 0);
        assert!((detections[1].confidence - 0.4).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_idempotent() -> Result<(), Box<dyn std::error::Error>> {
        let candidates = vec![
            candidate(0.30, 0.30, 0.9, &[1.0, 0.0, 0.0]),
            candidate(0.32, 0.31, 0.7, &[1.0, 0.0, 0.0]),
            candidate(0.70, 0.70, 0.6, &[1.0, 0.0, 0.0]),
            candidate(0.31, 0.30, 0.8, &[0.0, 0.0, 1.0]),
            candidate(0.10, 0.90, 0.05, &[0.0, 1.0, 0.0]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;
        assert_eq!(detections.len(), 3);

        for a in &detections {
            assert!(a.confidence > 0.1);
            for b in &detections {
                if a != b && a.class == b.class {
                    assert!(iou(&a.bbox, &b.bbox) <= 0.3);
                }
            }
        }

        let again: Vec<Candidate> = detections.iter().map(|d| d.to_candidate(3)).collect();
        assert_eq!(non_maximum_suppression(&again, 0.1, 0.3)?, detections);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_rerun_relabels() -> Result<(), Box<dyn std::error::Error>> {
        // the second detection survives through class 1 but is labelled class 0
        let candidates = vec![
            candidate(0.5, 0.5, 1.0, &[0.9, 0.0]),
            candidate(0.5, 0.5, 1.0, &[0.6, 0.4]),
        ];

        let detections = non_maximum_suppression(&candidates, 0.1, 0.3)?;
        assert_eq!(detections.len(), 2);

        // converted back, both land in the class 0 column and the weaker one is suppressed
        let again: Vec<Candidate> = detections.iter().map(|d| d.to_candidate(2)).collect();
        let rerun = non_maximum_suppression(&again, 0.1, 0.3)?;
        assert_eq!(rerun.len(), 1);
        assert_eq!(rerun[0], detections[0]);
        Ok(())
    }

    #[test]
    fn test_non_maximum_suppression_class_mismatch() {
        let candidates = vec![
            candidate(0.5, 0.5, 1.0, &[0.9, 0.1]),
            candidate(0.5, 0.5, 1.0, &[0.9]),
        ];
        let err = non_maximum_suppression(&candidates, 0.1, 0.3).unwrap_err();
        assert!(matches!(err, YoloV1Error::ShapeMismatch { .. }));
    }
}
