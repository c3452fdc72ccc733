use argh::FromArgs;
use std::path::PathBuf;

use candle_core::{Device, Tensor, Var};
use candle_nn::{Optimizer, SGD};
use kornia_yolov1::{GroundTruthBox, YoloV1Config, YoloV1Loss, decode, encode};

#[derive(FromArgs)]
/// Fit a free YOLOv1 prediction to a few synthetic boxes and decode it
struct Args {
    /// path to a `key: value` config file
    #[argh(option)]
    config: Option<PathBuf>,

    /// number of optimization steps
    #[argh(option, default = "200")]
    steps: usize,

    /// the learning rate
    #[argh(option, default = "0.05")]
    learning_rate: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let args: Args = argh::from_env();

    let config = match &args.config {
        Some(path) => YoloV1Config::from_file(path)?,
        None => YoloV1Config::default(),
    };

    let boxes = [
        GroundTruthBox::new(0.5, 0.5, 0.2, 0.3, 3),
        GroundTruthBox::new(0.15, 0.75, 0.1, 0.2, 1),
        GroundTruthBox::new(0.8, 0.2, 0.3, 0.25, 2),
    ];
    let target = encode(&boxes, &config, &Device::Cpu)?.unsqueeze(0)?;

    // start from small positive values so the square roots stay defined
    let init = Tensor::full(0.1f32, target.dims(), &Device::Cpu)?;
    let pred = Var::from_tensor(&init)?;

    let loss = YoloV1Loss::new(config.clone());
    let mut sgd = SGD::new(vec![pred.clone()], args.learning_rate)?;
    for step in 0..args.steps {
        let value = loss.forward(pred.as_tensor(), &target)?;
        sgd.backward_step(&value)?;
        if step % 20 == 0 {
            println!("step {step}: loss {:.5}", value.to_scalar::<f32>()?);
        }
    }

    let fitted = pred.as_tensor().squeeze(0)?;
    for detection in decode(&fitted, &config)? {
        let (xmin, ymin, xmax, ymax) = detection.bbox.corners();
        println!(
            "class {} conf {:.3} box [{xmin:.3}, {ymin:.3}, {xmax:.3}, {ymax:.3}]",
            detection.class, detection.confidence
        );
    }

    Ok(())
}
