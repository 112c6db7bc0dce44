//! Runtime pieces around the `volstitch-core` reconstruction engine: a grid sampler,
//! a threaded producer running the patch network, a burn network adapter and the
//! [`run_inference`] entry point.

#[cfg(feature = "cli")]
pub mod cli;
pub mod init;
pub mod logging;
pub mod network;
pub mod pipeline;
pub mod producer;
pub mod sampler;
pub mod subject;


pub use init::{CheckpointArgs, Init, load_network};
pub use network::{BurnNetwork, NetworkError, OutputMode, PatchNetwork, SegmentationModel};
pub use pipeline::run_inference;
pub use producer::ThreadedProducer;
pub use sampler::{GridSampler, PatchLocation};
pub use subject::{MemoryRegistry, MemorySubject, OutputStore, SavedOutput};
