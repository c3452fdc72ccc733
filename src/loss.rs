use candle_core::{DType, Tensor};

use crate::{
    bounding_box::{BoundingBox, iou},
    config::YoloV1Config,
    error::YoloV1Error,
};

/// The five summed loss terms over a batch, before averaging.
#[derive(Debug, Clone)]
pub struct LossTerms {
    /// Weighted squared error of the responsible cell offsets.
    pub coord_xy: Tensor,
    /// Squared error of the square roots of the responsible widths and heights.
    pub coord_wh: Tensor,
    /// Squared error of the responsible confidences against their IoU.
    pub obj: Tensor,
    /// Weighted squared error of the remaining confidences.
    pub noobj: Tensor,
    /// Squared error of the class vectors of the cells holding an object.
    pub class: Tensor,
}

impl LossTerms {
    /// Sum of the five loss terms.
    pub fn total(&self) -> Result<Tensor, YoloV1Error> {
        Ok(self
            .coord_xy
            .add(&self.coord_wh)?
            .add(&self.obj)?
            .add(&self.noobj)?
            .add(&self.class)?)
    }
}

/// Per-slot and per-cell masks describing which predictor answers for which target.
///
/// Built from host copies of the tensors, so everything in here is detached from the graph.
struct Assignment {
    /// 1 for the responsible slot of a cell holding an object, `(N, S, S, B)`.
    responsible: Vec<u8>,
    /// 1 for the other slots of a cell holding an object, `(N, S, S, B)`.
    other: Vec<f32>,
    /// IoU of every slot with the target box, `(N, S, S, B)`.
    ious: Vec<f32>,
    /// 1 for cells holding an object, `(N, S, S, 1)`.
    object: Vec<f32>,
    /// 1 for cells without an object, `(N, S, S, 1)`.
    empty: Vec<f32>,
}

/// YOLOv1 training loss.
#[derive(Debug, Clone)]
pub struct YoloV1Loss {
    config: YoloV1Config,
    lambda_coord: f64,
    lambda_noobj: f64,
}

impl YoloV1Loss {
    /// Create a new loss for the given grid configuration.
    pub fn new(config: YoloV1Config) -> Self {
        Self {
            config,
            lambda_coord: 5.0,
            lambda_noobj: 0.5,
        }
    }

    /// Mean loss per sample of a `(N, S, S, 5B + C)` prediction batch against encoded targets.
    ///
    /// The result is a scalar tensor that back-propagates into `preds`; the IoU regression targets
    /// and the choice of responsible predictor are constants.
    pub fn forward(&self, preds: &Tensor, targets: &Tensor) -> Result<Tensor, YoloV1Error> {
        let batch_size = preds.dims().first().copied().unwrap_or(0);
        let terms = self.terms(preds, targets)?;

        if tracing::enabled!(tracing::Level::DEBUG) {
            let coord_xy = scalar(&terms.coord_xy)?;
            let coord_wh = scalar(&terms.coord_wh)?;
            let obj = scalar(&terms.obj)?;
            let noobj = scalar(&terms.noobj)?;
            let class = scalar(&terms.class)?;
            tracing::debug!(
                coord_xy,
                coord_wh,
                obj,
                noobj,
                class,
                batch_size,
                "yolov1 loss terms"
            );
        }

        Ok(terms.total()?.affine(1.0 / batch_size as f64, 0.0)?)
    }

    /// The five loss terms summed over the batch.
    pub fn terms(&self, preds: &Tensor, targets: &Tensor) -> Result<LossTerms, YoloV1Error> {
        self.config.validate()?;
        let (s, _, depth) = self.config.grid_shape();
        let b = self.config.num_boxes;

        let n = preds.dims().first().copied().unwrap_or(0);
        let expected = [n, s, s, depth];
        for t in [preds, targets] {
            if n == 0 || t.dims() != expected {
                return Err(YoloV1Error::ShapeMismatch {
                    expected: expected.to_vec(),
                    actual: t.dims().to_vec(),
                });
            }
        }

        let assignment = self.assign(preds, targets)?;

        let device = preds.device();
        let dtype = preds.dtype();
        let slot_mask = |values: Vec<f32>| -> Result<Tensor, YoloV1Error> {
            Ok(Tensor::from_vec(values, (n, s, s, b), device)?.to_dtype(dtype)?)
        };
        let cell_mask = |values: Vec<f32>| -> Result<Tensor, YoloV1Error> {
            Ok(Tensor::from_vec(values, (n, s, s, 1), device)?.to_dtype(dtype)?)
        };

        let responsible_u8 = Tensor::from_vec(assignment.responsible, (n, s, s, b, 1), device)?;
        let responsible = responsible_u8.to_dtype(dtype)?;
        let other = slot_mask(assignment.other)?;
        let ious = slot_mask(assignment.ious)?;
        let object = cell_mask(assignment.object)?;
        let empty = cell_mask(assignment.empty)?;

        let pred_boxes = preds.narrow(3, 0, 5 * b)?.reshape((n, s, s, b, 5))?;
        let target_boxes = targets.narrow(3, 0, 5 * b)?.reshape((n, s, s, b, 5))?;
        let pred_conf = pred_boxes.narrow(4, 4, 1)?.squeeze(4)?;

        let coord_xy = pred_boxes
            .narrow(4, 0, 2)?
            .sub(&target_boxes.narrow(4, 0, 2)?)?
            .sqr()?
            .broadcast_mul(&responsible)?
            .sum_all()?
            .affine(self.lambda_coord, 0.0)?;

        // only responsible slots are square rooted, the rest is replaced by ones
        let pred_wh = pred_boxes.narrow(4, 2, 2)?;
        let wh_mask = responsible_u8.broadcast_as(pred_wh.dims())?;
        let ones = Tensor::ones_like(&pred_wh)?;
        let coord_wh = wh_mask
            .where_cond(&pred_wh, &ones)?
            .sqrt()?
            .sub(
                &wh_mask
                    .where_cond(&target_boxes.narrow(4, 2, 2)?, &ones)?
                    .sqrt()?,
            )?
            .sqr()?
            .sum_all()?;

        let conf_error = pred_conf.sub(&ious)?.sqr()?;
        let obj = conf_error.mul(&responsible.squeeze(4)?)?.sum_all()?;
        let noobj = conf_error
            .mul(&other)?
            .sum_all()?
            .add(&pred_conf.sqr()?.broadcast_mul(&empty)?.sum_all()?)?
            .affine(self.lambda_noobj, 0.0)?;

        let class_offset = 5 * b;
        let num_classes = self.config.num_classes;
        let class = preds
            .narrow(3, class_offset, num_classes)?
            .sub(&targets.narrow(3, class_offset, num_classes)?)?
            .sqr()?
            .broadcast_mul(&object)?
            .sum_all()?;

        Ok(LossTerms {
            coord_xy,
            coord_wh,
            obj,
            noobj,
            class,
        })
    }

    /// Pick the responsible slot of every object cell and record the IoU targets.
    fn assign(&self, preds: &Tensor, targets: &Tensor) -> Result<Assignment, YoloV1Error> {
        let (n, s, _, depth) = preds.dims4()?;
        let b = self.config.num_boxes;
        let preds = host_values(preds)?;
        let targets = host_values(targets)?;

        let cells = n * s * s;
        let mut assignment = Assignment {
            responsible: vec![0; cells * b],
            other: vec![0.0; cells * b],
            ious: vec![0.0; cells * b],
            object: vec![0.0; cells],
            empty: vec![0.0; cells],
        };

        let to_box = |values: &[f32], i: usize, j: usize| {
            BoundingBox::new(
                (values[0] + i as f32) / s as f32,
                (values[1] + j as f32) / s as f32,
                values[2],
                values[3],
            )
        };

        for cell in 0..cells {
            let (i, j) = ((cell / s) % s, cell % s);
            let pred = &preds[cell * depth..(cell + 1) * depth];
            let target = &targets[cell * depth..(cell + 1) * depth];

            if target[4] != 1.0 {
                assignment.empty[cell] = 1.0;
                continue;
            }
            assignment.object[cell] = 1.0;

            let target_box = to_box(target, i, j);
            let ious = &mut assignment.ious[cell * b..(cell + 1) * b];
            for (k, iou_k) in ious.iter_mut().enumerate() {
                *iou_k = iou(&to_box(&pred[5 * k..], i, j), &target_box);
            }

            // ties go to the later slot
            let mut best = 0;
            for k in 1..b {
                if ious[k] >= ious[best] {
                    best = k;
                }
            }

            let (pw, ph) = (pred[5 * best + 2], pred[5 * best + 3]);
            let (tw, th) = (target[5 * best + 2], target[5 * best + 3]);
            if pw < 0.0 || ph < 0.0 {
                return Err(YoloV1Error::NegativeDimension { w: pw, h: ph });
            }
            if tw < 0.0 || th < 0.0 {
                return Err(YoloV1Error::NegativeDimension { w: tw, h: th });
            }

            for k in 0..b {
                if k == best {
                    assignment.responsible[cell * b + k] = 1;
                } else {
                    assignment.other[cell * b + k] = 1.0;
                }
            }
        }

        Ok(assignment)
    }
}

fn host_values(t: &Tensor) -> Result<Vec<f32>, YoloV1Error> {
    Ok(t.to_dtype(DType::F32)?.flatten_all()?.to_vec1::<f32>()?)
}

fn scalar(t: &Tensor) -> Result<f32, YoloV1Error> {
    Ok(t.to_dtype(DType::F32)?.to_scalar::<f32>()?)
}
