#![deny(missing_docs)]

//! YOLOv1 detection targets, decoding and loss in Rust
//!
//! This crate provides the grid logic of a single-stage YOLOv1 detector: packing ground-truth
//! boxes into a `S x S x (5B + C)` target tensor, decoding raw network output into detections
//! with non-maximum suppression, and the five-term training loss.
//!
//! # Examples
//!
//! ```no_run
//! use candle_core::Device;
//! use kornia_yolov1::{GroundTruthBox, YoloV1Config, YoloV1Loss, decode, encode};
//!
//! let config = YoloV1Config::default();
//!
//! let boxes = [GroundTruthBox::new(0.5, 0.5, 0.2, 0.3, 3)];
//! let target = encode(&boxes, &config, &Device::Cpu).expect("Failed to encode boxes");
//!
//! let detections = decode(&target, &config).expect("Failed to decode prediction");
//! for detection in detections {
//!     println!("Detection: {:?}", detection);
//! }
//!
//! let batch = target.unsqueeze(0).expect("Failed to batch target");
//! let loss = YoloV1Loss::new(config)
//!     .forward(&batch, &batch)
//!     .expect("Failed to compute loss");
//! println!("Loss: {:?}", loss);
//! ```

/// Center-form bounding boxes and intersection over union
mod bounding_box;

/// Grid and threshold configuration
mod config;

/// Prediction tensor decoding
mod decoder;

/// Ground-truth target encoding
mod encoder;

/// Error type shared by all operations
mod error;

/// YOLOv1 training loss
mod loss;

/// Class-wise non-maximum suppression
mod nms;

pub use bounding_box::{BoundingBox, iou};
pub use config::{YoloV1Config, parse_key_values};
pub use decoder::{decode, flatten_predictions};
pub use encoder::{GroundTruthBox, encode};
pub use error::YoloV1Error;
pub use loss::{LossTerms, YoloV1Loss};
pub use nms::{Candidate, Detection, non_maximum_suppression};
