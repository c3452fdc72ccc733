/// YOLOv1 error enum.
#[derive(thiserror::Error, Debug)]
pub enum YoloV1Error {
    /// A ground-truth box center lies outside of the image.
    #[error("Box center ({x}, {y}) is outside of [0, 1)")]
    OutOfRangeCoordinate {
        /// Center x coordinate of the offending box.
        x: f32,
        /// Center y coordinate of the offending box.
        y: f32,
    },

    /// A ground-truth class label is not in `1..=num_classes`.
    #[error("Class label {class} is outside of [1, {num_classes}]")]
    InvalidClassLabel {
        /// The 1-based class label.
        class: u32,
        /// Number of configured classes.
        num_classes: usize,
    },

    /// A box width or height is negative where the loss takes its square root.
    #[error("Negative box dimension: w={w}, h={h}")]
    NegativeDimension {
        /// Box width.
        w: f32,
        /// Box height.
        h: f32,
    },

    /// A tensor or candidate does not have the configured shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// The expected dimensions.
        expected: Vec<usize>,
        /// The actual dimensions.
        actual: Vec<usize>,
    },

    /// A configuration line could not be split into key and value.
    #[error("Malformed config at line {line}: {reason}")]
    MalformedConfig {
        /// 1-based line number.
        line: usize,
        /// What is wrong with the line.
        reason: String,
    },

    /// A configuration value could not be parsed or is out of range.
    #[error("Invalid value for config key `{key}`: {value}")]
    InvalidConfigValue {
        /// The configuration key.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// Failed to read a configuration file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Internal candle error.
    #[error(transparent)]
    CandleError(#[from] candle_core::Error),
}
