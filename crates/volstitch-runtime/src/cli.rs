use std::path::PathBuf;

use clap::Parser;
use volstitch_core::{ConfigError, InferenceConfig};

#[derive(Parser, Debug)]
#[command(
    name = "volstitch",
    version,
    about = "Sliding-window volume reconstruction"
)]
pub struct InferenceArgs {
    /// TOML file holding the inference settings.
    #[arg(long)]
    pub config: PathBuf,
    #[arg(long)]
    pub save_seg_dir: Option<PathBuf>,
    #[arg(long)]
    pub pred_iter: Option<u64>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Save the last subject even if the stream ends early.
    #[arg(long)]
    pub flush_incomplete: bool,
}

impl InferenceArgs {
    /// Loads the config file and applies command line overrides.
    pub fn resolve(&self) -> Result<InferenceConfig, ConfigError> {
        let mut config = InferenceConfig::load(&self.config)?;
        if let Some(dir) = &self.save_seg_dir {
            config.save_seg_dir = dir.clone();
        }
        if let Some(pred_iter) = self.pred_iter {
            config.pred_iter = pred_iter;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        config.flush_incomplete |= self.flush_incomplete;
        config.validate()
    }
}

pub fn parse_inference_args() -> InferenceArgs {
    InferenceArgs::parse()
}
