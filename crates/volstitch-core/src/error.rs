use thiserror::Error;

/// Setup defects. Never retried: they mean the sampler, network and volume geometry
/// disagree before a single voxel is written.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unsupported spatial rank: {0} (expected 2, 2.5 or 3)")]
    UnsupportedRank(f64),
    #[error(
        "Label size {label_size} cannot be centred in image size {image_size}: offset is not an integer"
    )]
    NonIntegerOffset { image_size: usize, label_size: usize },
    #[error("Label size {label_size} is larger than image size {image_size}")]
    LabelLargerThanImage { image_size: usize, label_size: usize },
    #[error("Border {border} leaves no voxels inside a patch of size {image_size}")]
    BorderTooLarge { image_size: usize, border: usize },
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Subject {0} is not present in the registry")]
    UnknownSubject(i64),
    #[error("Failed to allocate output volume for subject {subject_id}: {source}")]
    AllocationFailed {
        subject_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("Patch network failed: {0}")]
    NetworkFailed(anyhow::Error),
    #[error("Patch sampling failed: {0}")]
    SamplingFailed(String),
    #[error("Producer thread panicked: {0}")]
    ThreadPanicked(String),
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),
}

/// Errors raised while stitching patches into an output volume.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(
        "Patch for subject {subject_id} writes [{start}, {end}) on axis {axis}, outside volume extent {extent}"
    )]
    OutOfBounds {
        subject_id: i64,
        axis: usize,
        start: i64,
        end: i64,
        extent: usize,
    },
    #[error("Spatial info for subject {subject_id} is malformed: {reason}")]
    MalformedInfo { subject_id: i64, reason: String },
    #[error("Prediction shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Failed to save output for subject {subject_id}: {source}")]
    SaveFailed {
        subject_id: i64,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error("Reconstruction panicked: {0}")]
    Panicked(String),
}

impl ReconstructionError {
    /// Whether the error points at inconsistent setup (sizes, ranks, sampler geometry)
    /// rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReconstructionError::Config(_)
                | ReconstructionError::OutOfBounds { .. }
                | ReconstructionError::MalformedInfo { .. }
        )
    }
}
