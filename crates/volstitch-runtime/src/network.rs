//! Patch networks: anything that maps a batch of image patches to predictions.
//!
//! Arrays cross this boundary channel-last. Images are `[batch, x, y, z, modality]`
//! and predictions `[batch, x, y, z, channel]`, with `z` of size one for planar
//! patches.

use burn::prelude::Backend;
use burn::tensor::activation::softmax;
use burn::tensor::{Tensor, TensorData};
use ndarray::Array5;
use volstitch_core::InferenceConfig;

/// Axis of the class scores in a channel-last prediction.
const CLASS_DIM: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to read network output: {0}")]
    Data(String),
    #[error("Network output has an unexpected shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub trait PatchNetwork {
    fn infer(&mut self, images: Array5<f32>) -> anyhow::Result<Array5<f32>>;
}

impl<F> PatchNetwork for F
where
    F: FnMut(Array5<f32>) -> anyhow::Result<Array5<f32>>,
{
    fn infer(&mut self, images: Array5<f32>) -> anyhow::Result<Array5<f32>> {
        self(images)
    }
}

/// A burn module producing per-voxel class scores from channel-last patches.
pub trait SegmentationModel<B: Backend> {
    fn forward(&self, images: Tensor<B, 5>) -> Tensor<B, 5>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display)]
pub enum OutputMode {
    /// Index of the highest scoring class, one channel.
    #[display("label")]
    Label,
    /// Softmax over classes, one channel per class.
    #[display("probability")]
    Probability,
}

impl OutputMode {
    pub fn for_config(config: &InferenceConfig) -> Self {
        if config.output_prob {
            OutputMode::Probability
        } else {
            OutputMode::Label
        }
    }
}

pub struct BurnNetwork<B: Backend, M> {
    model: M,
    device: B::Device,
    mode: OutputMode,
}

impl<B: Backend, M: SegmentationModel<B>> BurnNetwork<B, M> {
    pub fn new(model: M, device: B::Device, mode: OutputMode) -> Self {
        log::debug!("Network output mode: {mode}");
        Self {
            model,
            device,
            mode,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }
}

impl<B: Backend, M: SegmentationModel<B>> PatchNetwork for BurnNetwork<B, M> {
    fn infer(&mut self, images: Array5<f32>) -> anyhow::Result<Array5<f32>> {
        let shape = images.shape().to_vec();
        let values: Vec<f32> = images.iter().copied().collect();
        let input = Tensor::<B, 5>::from_data(TensorData::new(values, shape), &self.device);

        let scores = self.model.forward(input);
        let output = match self.mode {
            OutputMode::Label => scores.argmax(CLASS_DIM).float(),
            OutputMode::Probability => softmax(scores, CLASS_DIM),
        };

        let dims = output.dims();
        let values = output
            .into_data()
            .convert::<f32>()
            .into_vec::<f32>()
            .map_err(|e| NetworkError::Data(format!("{e:?}")))?;
        let predictions =
            Array5::from_shape_vec((dims[0], dims[1], dims[2], dims[3], dims[4]), values)
                .map_err(NetworkError::from)?;
        Ok(predictions)
    }
}
