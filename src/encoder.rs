use candle_core::{Device, Tensor};

use crate::{config::YoloV1Config, error::YoloV1Error};

/// Ground-truth box relative to the full image with a 1-based class label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundTruthBox {
    /// Center x coordinate, in `[0, 1)`.
    pub x: f32,
    /// Center y coordinate, in `[0, 1)`.
    pub y: f32,
    /// Width, in `[0, 1]`.
    pub w: f32,
    /// Height, in `[0, 1]`.
    pub h: f32,
    /// Class label, in `1..=num_classes`.
    pub class: u32,
}

impl GroundTruthBox {
    /// Create a new ground-truth box.
    pub fn new(x: f32, y: f32, w: f32, h: f32, class: u32) -> Self {
        Self { x, y, w, h, class }
    }
}

impl From<(f32, f32, f32, f32, u32)> for GroundTruthBox {
    fn from((x, y, w, h, class): (f32, f32, f32, f32, u32)) -> Self {
        Self::new(x, y, w, h, class)
    }
}

/// Encode ground-truth boxes into a `S x S x (5B + C)` target tensor.
///
/// Each box is written to the cell containing its center: every predictor slot of that cell
/// receives `(offset_x, offset_y, w, h, 1)` and the one-hot class channel is set. When several
/// boxes share a cell, the last one overwrites the slots and sets its class channel as well.
///
/// # Arguments
///
/// * `boxes` - The ground-truth boxes, in order.
/// * `config` - The grid configuration.
/// * `device` - The device to allocate the target tensor on.
pub fn encode(
    boxes: &[GroundTruthBox],
    config: &YoloV1Config,
    device: &Device,
) -> Result<Tensor, YoloV1Error> {
    config.validate()?;
    let s = config.grid_size;
    let depth = config.cell_depth();
    let class_offset = 5 * config.num_boxes;
    let mut target = vec![0f32; s * s * depth];

    for gt in boxes {
        if !(0.0..1.0).contains(&gt.x) || !(0.0..1.0).contains(&gt.y) {
            return Err(YoloV1Error::OutOfRangeCoordinate { x: gt.x, y: gt.y });
        }
        if gt.class == 0 || gt.class as usize > config.num_classes {
            return Err(YoloV1Error::InvalidClassLabel {
                class: gt.class,
                num_classes: config.num_classes,
            });
        }

        let sx = gt.x * s as f32;
        let sy = gt.y * s as f32;
        let (cx, cy) = (sx.floor() as usize, sy.floor() as usize);
        // x * S can round up to S for x just below 1
        if cx >= s || cy >= s {
            return Err(YoloV1Error::OutOfRangeCoordinate { x: gt.x, y: gt.y });
        }

        let cell = (cx * s + cy) * depth;
        let slot = [sx - cx as f32, sy - cy as f32, gt.w, gt.h, 1.0];
        for k in 0..config.num_boxes {
            target[cell + 5 * k..cell + 5 * k + 5].copy_from_slice(&slot);
        }
        target[cell + class_offset + gt.class as usize - 1] = 1.0;
    }

    Ok(Tensor::from_vec(target, config.grid_shape(), device)?)
}
