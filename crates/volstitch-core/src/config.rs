use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::accumulator::{OutputSettings, PartialVolumePolicy};
use crate::error::ConfigError;
use crate::rank::SpatialRank;
use crate::window::PatchWindow;

/// Settings for one inference run.
///
/// Every key except the patch geometry has a default, so a minimal file only needs
/// `spatial_rank`, `image_size` and `label_size`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct InferenceConfig {
    pub spatial_rank: SpatialRank,
    /// Edge length of the sampled image patches.
    pub image_size: usize,
    /// Edge length of the network output.
    pub label_size: usize,
    #[serde(default)]
    pub border: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Capacity of the patch queue, in patches.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
    /// Save class probabilities instead of a label map.
    #[serde(default)]
    pub output_prob: bool,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    #[serde(default)]
    pub output_interp_order: u8,
    #[serde(default = "default_save_seg_dir")]
    pub save_seg_dir: PathBuf,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
    #[serde(default)]
    pub pred_iter: u64,
    /// Save the last subject when the stream ends without a stop signal.
    #[serde(default)]
    pub flush_incomplete: bool,
}

fn default_batch_size() -> usize {
    1
}

fn default_queue_length() -> usize {
    5
}

fn default_num_classes() -> usize {
    2
}

fn default_save_seg_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("model")
}

impl InferenceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }

    /// Checks the geometry and applies the queue length floor.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.output_prob && self.num_classes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "num_classes",
                reason: "probability output needs at least one class".to_string(),
            });
        }
        if self.queue_length < self.batch_size {
            log::debug!(
                "Raising queue_length from {} to batch_size {}",
                self.queue_length,
                self.batch_size
            );
            self.queue_length = self.batch_size;
        }
        self.window()?;
        Ok(self)
    }

    pub fn window(&self) -> Result<PatchWindow, ConfigError> {
        PatchWindow::resolve(self.image_size, self.label_size, self.border)
    }

    /// Channels per output voxel: a single label, or one probability per class.
    pub fn n_channels_out(&self) -> usize {
        if self.output_prob {
            self.num_classes
        } else {
            1
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.model_dir
            .join("models")
            .join(format!("model.ckpt-{}", self.pred_iter))
    }

    pub fn partial_policy(&self) -> PartialVolumePolicy {
        if self.flush_incomplete {
            PartialVolumePolicy::Flush
        } else {
            PartialVolumePolicy::Discard
        }
    }

    pub fn output_settings(&self) -> OutputSettings {
        OutputSettings {
            n_channels: self.n_channels_out(),
            interp_order: self.output_interp_order,
            output_dir: self.save_seg_dir.clone(),
        }
    }
}
