use std::{collections::BTreeMap, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::YoloV1Error;

/// YOLOv1 configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YoloV1Config {
    /// Number of grid cells along each image side (S)
    pub grid_size: usize,
    /// Number of predictor slots per cell (B)
    pub num_boxes: usize,
    /// Number of object classes (C)
    pub num_classes: usize,
    /// Class-specific confidences at or below this value are discarded
    pub confidence_threshold: f32,
    /// The non-maximum suppression IoU threshold
    pub nms_threshold: f32,
}

/// Default configuration for YOLOv1.
impl Default for YoloV1Config {
    fn default() -> Self {
        Self {
            grid_size: 7,
            num_boxes: 2,
            num_classes: 10,
            confidence_threshold: 0.1,
            nms_threshold: 0.3,
        }
    }
}

impl YoloV1Config {
    /// Number of channels per grid cell, `5B + C`.
    pub fn cell_depth(&self) -> usize {
        5 * self.num_boxes + self.num_classes
    }

    /// Number of candidate detections decoded from one prediction, `S * S * B`.
    pub fn num_candidates(&self) -> usize {
        self.grid_size * self.grid_size * self.num_boxes
    }

    /// Shape of a single grid tensor.
    pub fn grid_shape(&self) -> (usize, usize, usize) {
        (self.grid_size, self.grid_size, self.cell_depth())
    }

    /// Check that the dimensions are non-zero and the thresholds lie in `[0, 1]`.
    pub fn validate(&self) -> Result<(), YoloV1Error> {
        let dims = [
            ("S", self.grid_size),
            ("B", self.num_boxes),
            ("num_classes", self.num_classes),
        ];
        for (key, value) in dims {
            if value == 0 {
                return Err(invalid_value(key, value));
            }
        }

        let thresholds = [
            ("conf_thresh", self.confidence_threshold),
            ("iou_thresh", self.nms_threshold),
        ];
        for (key, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid_value(key, value));
            }
        }

        Ok(())
    }

    /// Build a configuration from parsed `key: value` pairs.
    ///
    /// Recognized keys are `S`, `B`, `num_classes`, `conf_thresh` and `iou_thresh`; missing keys
    /// keep their default value and any other key is ignored.
    pub fn from_key_values(values: &BTreeMap<String, String>) -> Result<Self, YoloV1Error> {
        let mut config = Self::default();
        for (key, value) in values {
            match key.as_str() {
                "S" => config.grid_size = parse_value(key, value)?,
                "B" => config.num_boxes = parse_value(key, value)?,
                "num_classes" => config.num_classes = parse_value(key, value)?,
                "conf_thresh" => config.confidence_threshold = parse_value(key, value)?,
                "iou_thresh" => config.nms_threshold = parse_value(key, value)?,
                _ => tracing::trace!("ignoring config key `{key}`"),
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file in the `key: value` format.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, YoloV1Error> {
        std::fs::read_to_string(path)?.parse()
    }
}

impl FromStr for YoloV1Config {
    type Err = YoloV1Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key_values(&parse_key_values(s)?)
    }
}

/// Parse the line-oriented `key: value` configuration format.
///
/// Lines starting with `#` and blank lines are skipped. Every other line is split at its first
/// `:` and both sides are trimmed; a later occurrence of a key overrides an earlier one.
pub fn parse_key_values(text: &str) -> Result<BTreeMap<String, String>, YoloV1Error> {
    let mut values = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            return Err(YoloV1Error::MalformedConfig {
                line: index + 1,
                reason: format!("missing `:` separator in `{line}`"),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(YoloV1Error::MalformedConfig {
                line: index + 1,
                reason: "empty key".to_string(),
            });
        }
        values.insert(key.to_string(), value.trim().to_string());
    }
    Ok(values)
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, YoloV1Error> {
    value.parse().map_err(|_| invalid_value(key, value))
}

fn invalid_value(key: &str, value: impl ToString) -> YoloV1Error {
    YoloV1Error::InvalidConfigValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = YoloV1Config::default();
        assert_eq!(config.cell_depth(), 20);
        assert_eq!(config.num_candidates(), 98);
        assert_eq!(config.grid_shape(), (7, 7, 20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_key_values() -> Result<(), Box<dyn std::error::Error>> {
        let text = "# yolo settings\n\nS: 14\nnum_classes : 20\nweights: ./a:b.pt\n";
        let values = parse_key_values(text)?;
        assert_eq!(values.len(), 3);
        assert_eq!(values["S"], "14");
        assert_eq!(values["num_classes"], "20");
        assert_eq!(values["weights"], "./a:b.pt");
        Ok(())
    }

    #[test]
    fn test_parse_missing_separator() {
        let err = parse_key_values("S: 7\nB 2\n").unwrap_err();
        assert!(matches!(err, YoloV1Error::MalformedConfig { line: 2, .. }));
    }

    #[test]
    fn test_config_from_str() -> Result<(), Box<dyn std::error::Error>> {
        let config: YoloV1Config = "S: 14\nB: 3\nconf_thresh: 0.25\nlr: 0.001\n".parse()?;
        assert_eq!(config.grid_size, 14);
        assert_eq!(config.num_boxes, 3);
        assert_eq!(config.num_classes, 10);
        assert_eq!(config.confidence_threshold, 0.25);
        assert_eq!(config.nms_threshold, 0.3);
        Ok(())
    }

    #[test]
    fn test_config_invalid_values() {
        let err = "S: seven".parse::<YoloV1Config>().unwrap_err();
        assert!(matches!(err, YoloV1Error::InvalidConfigValue { ref key, .. } if key == "S"));

        let err = "B: 0".parse::<YoloV1Config>().unwrap_err();
        assert!(matches!(err, YoloV1Error::InvalidConfigValue { ref key, .. } if key == "B"));

        let err = "iou_thresh: 1.5".parse::<YoloV1Config>().unwrap_err();
        assert!(
            matches!(err, YoloV1Error::InvalidConfigValue { ref key, .. } if key == "iou_thresh")
        );
    }
}
