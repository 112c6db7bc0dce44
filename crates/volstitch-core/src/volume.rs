use derive_more::{Deref, DerefMut, From};
use ndarray::{Array5, ArrayView5, ArrayViewD, Axis, Ix5};

use crate::error::ReconstructionError;

/// Axis holding per-voxel output components.
pub const CHANNEL_AXIS: usize = 3;
/// Trailing axis of the persisted layout.
pub const MODALITY_AXIS: usize = 4;

/// Full-resolution reconstruction for one subject, laid out
/// `[x, y, z, channel, modality]`.
#[derive(Clone, Debug, PartialEq, Deref, DerefMut, From)]
pub struct OutputVolume(Array5<f32>);

impl OutputVolume {
    pub fn zeros(spatial: [usize; 3], n_channels: usize) -> Self {
        Self(Array5::zeros((
            spatial[0],
            spatial[1],
            spatial[2],
            n_channels,
            1,
        )))
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let shape = self.0.shape();
        [shape[0], shape[1], shape[2]]
    }

    /// Moves multi-component outputs to the trailing axis, the position image
    /// writers expect per-voxel vectors in.
    pub fn normalize_modality_axis(self) -> Self {
        if self.0.shape()[CHANNEL_AXIS] > 1 {
            let mut array = self.0;
            array.swap_axes(CHANNEL_AXIS, MODALITY_AXIS);
            Self(array.as_standard_layout().into_owned())
        } else {
            self
        }
    }

    pub fn into_inner(self) -> Array5<f32> {
        self.0
    }
}

/// Views a prediction patch as `[x, y, z, channel, modality]`, appending singleton
/// trailing axes until it has five dimensions.
pub fn to_volume_layout<'a>(
    prediction: ArrayViewD<'a, f32>,
) -> Result<ArrayView5<'a, f32>, ReconstructionError> {
    if prediction.ndim() > 5 {
        return Err(ReconstructionError::ShapeMismatch(format!(
            "prediction has {} dimensions, at most 5 are supported",
            prediction.ndim()
        )));
    }
    let mut view = prediction;
    while view.ndim() < 5 {
        let last = view.ndim();
        view = view.insert_axis(Axis(last));
    }
    view.into_dimensionality::<Ix5>()
        .map_err(|e| ReconstructionError::ShapeMismatch(e.to_string()))
}
