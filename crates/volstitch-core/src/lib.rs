//! Sliding-window reconstruction of full-resolution volumes from per-patch network
//! predictions.
//!
//! A [`PatchProducer`] emits batches of predictions tagged with [`SpatialInfo`]; the
//! [`ReconstructionDriver`] feeds them to a [`VolumeAccumulator`], which stitches the
//! trustworthy part of every patch into one output volume per subject and saves it
//! through the [`SubjectRegistry`] when the subject changes or the stop signal
//! arrives.

pub mod accumulator;
pub mod config;
pub mod driver;
pub mod error;
pub mod policy;
pub mod producer;
pub mod queue;
pub mod rank;
pub mod registry;
pub mod spatial;
pub mod volume;
pub mod window;

#[cfg(test)]
mod test_support;

pub use accumulator::{
    AccumulatorState, OutputSettings, PartialVolumePolicy, Step, VolumeAccumulator,
};
pub use config::InferenceConfig;
pub use driver::{ReconstructionDriver, RunOutcome, RunReport, panic_message};
pub use error::{ConfigError, ProducerError, ReconstructionError, RegistryError};
pub use policy::{IndexingPolicy, indexing_policy};
pub use producer::{CancelToken, PatchBatch, PatchProducer, Pulled};
pub use queue::{BatchReceiver, BatchSender, QueueClosed, patch_queue};
pub use rank::SpatialRank;
pub use registry::{SubjectRecord, SubjectRegistry};
pub use spatial::{STOP_SUBJECT_ID, SpatialInfo};
pub use volume::OutputVolume;
pub use window::PatchWindow;
