use std::path::PathBuf;

use burn::prelude::Backend;
use volstitch_core::InferenceConfig;

use crate::network::{BurnNetwork, OutputMode, SegmentationModel};

/// Trait for models that can be initialized from user-defined arguments.
pub trait Init<B, InitArgs = ()>: Sized
where
    B: Backend,
    InitArgs: Send + 'static,
{
    type Error;
    /// Initialize the model from the given arguments and device.
    fn init(args: &InitArgs, device: &B::Device) -> Result<Self, Self::Error>;
}

/// Location of the trained weights selected by `model_dir` and `pred_iter`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointArgs {
    pub path: PathBuf,
}

impl CheckpointArgs {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            path: config.checkpoint_path(),
        }
    }
}

/// Restores the configured checkpoint and wraps it for patch inference.
pub fn load_network<B, M>(
    config: &InferenceConfig,
    device: B::Device,
) -> Result<BurnNetwork<B, M>, M::Error>
where
    B: Backend,
    M: SegmentationModel<B> + Init<B, CheckpointArgs>,
{
    let args = CheckpointArgs::from_config(config);
    log::info!("Loading checkpoint {}", args.path.display());
    let model = M::init(&args, &device)?;
    Ok(BurnNetwork::new(model, device, OutputMode::for_config(config)))
}
