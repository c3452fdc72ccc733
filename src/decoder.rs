use candle_core::{DType, Tensor};

use crate::{
    bounding_box::BoundingBox,
    config::YoloV1Config,
    error::YoloV1Error,
    nms::{Candidate, Detection, non_maximum_suppression},
};

/// Flatten a `S x S x (5B + C)` prediction into one candidate per predictor slot.
///
/// Candidates are ordered by cell `(i, j)` and then by slot `k`, so candidate `B * (i * S + j) + k`
/// comes from slot `k` of cell `(i, j)`. All slots of a cell share the cell's class vector.
pub fn flatten_predictions(
    pred: &Tensor,
    config: &YoloV1Config,
) -> Result<Vec<Candidate>, YoloV1Error> {
    config.validate()?;
    let (s, _, depth) = config.grid_shape();
    if pred.dims() != [s, s, depth] {
        return Err(YoloV1Error::ShapeMismatch {
            expected: vec![s, s, depth],
            actual: pred.dims().to_vec(),
        });
    }

    let class_offset = 5 * config.num_boxes;
    let pred = pred.to_dtype(DType::F32)?.to_vec3::<f32>()?;
    let mut candidates = Vec::with_capacity(config.num_candidates());
    for (i, row) in pred.iter().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            let class_probs = &cell[class_offset..];
            for slot in cell[..class_offset].chunks_exact(5) {
                candidates.push(Candidate {
                    bbox: BoundingBox::new(
                        (slot[0] + i as f32) / s as f32,
                        (slot[1] + j as f32) / s as f32,
                        slot[2],
                        slot[3],
                    ),
                    confidence: slot[4],
                    class_probs: class_probs.to_vec(),
                });
            }
        }
    }

    tracing::debug!("decoded {} candidates", candidates.len());

    Ok(candidates)
}

/// Decode a `S x S x (5B + C)` prediction into detections.
///
/// Uses the confidence and non-maximum suppression thresholds of `config`.
pub fn decode(pred: &Tensor, config: &YoloV1Config) -> Result<Vec<Detection>, YoloV1Error> {
    let candidates = flatten_predictions(pred, config)?;
    non_maximum_suppression(
        &candidates,
        config.confidence_threshold,
        config.nms_threshold,
    )
}
