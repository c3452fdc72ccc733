use serde::Serialize;

/// Bounding box in center form, relative to the full image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    /// Center x coordinate of the bounding box.
    pub x: f32,
    /// Center y coordinate of the bounding box.
    pub y: f32,
    /// Width of the bounding box.
    pub w: f32,
    /// Height of the bounding box.
    pub h: f32,
}

impl BoundingBox {
    /// Create a new bounding box from its center and size.
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    /// Corners of the bounding box as `(xmin, ymin, xmax, ymax)`.
    pub fn corners(&self) -> (f32, f32, f32, f32) {
        (
            self.x - self.w / 2.0,
            self.y - self.h / 2.0,
            self.x + self.w / 2.0,
            self.y + self.h / 2.0,
        )
    }

    /// Area of the bounding box.
    pub fn area(&self) -> f32 {
        self.w * self.h
    }
}

/// Intersection over union of two bounding boxes.
///
/// Boxes that only touch or do not overlap at all have an IoU of exactly zero.
pub fn iou(b1: &BoundingBox, b2: &BoundingBox) -> f32 {
    let (b1_xmin, b1_ymin, b1_xmax, b1_ymax) = b1.corners();
    let (b2_xmin, b2_ymin, b2_xmax, b2_ymax) = b2.corners();

    let i_xmin = b1_xmin.max(b2_xmin);
    let i_xmax = b1_xmax.min(b2_xmax);
    let i_ymin = b1_ymin.max(b2_ymin);
    let i_ymax = b1_ymax.min(b2_ymax);

    if i_xmin >= i_xmax || i_ymin >= i_ymax {
        return 0.0;
    }

    // areas from the same rounded extents as the intersection, so that iou(b, b) == 1
    let b1_area = (b1_xmax - b1_xmin) * (b1_ymax - b1_ymin);
    let b2_area = (b2_xmax - b2_xmin) * (b2_ymax - b2_ymin);
    let i_area = (i_xmax - i_xmin) * (i_ymax - i_ymin);
    (i_area / (b1_area + b2_area - i_area)).min(1.0)
}
