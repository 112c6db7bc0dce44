use volstitch_core::{
    CancelToken, ConfigError, InferenceConfig, ReconstructionDriver, RunReport, SubjectRegistry,
    VolumeAccumulator, indexing_policy,
};

use crate::network::PatchNetwork;
use crate::producer::ThreadedProducer;
use crate::sampler::GridSampler;
use crate::subject::MemoryRegistry;

/// Runs sliding-window inference over every subject in `registry`.
///
/// Only setup problems are returned as errors; everything that goes wrong once
/// patches flow is reported through [`RunReport::outcome`]. Saved volumes land in
/// the registry's output store.
pub fn run_inference<N>(
    config: &InferenceConfig,
    registry: MemoryRegistry,
    network: N,
    cancel: CancelToken,
) -> Result<RunReport, ConfigError>
where
    N: PatchNetwork + Send + 'static,
{
    let config = config.clone().validate()?;
    let window = config.window()?;
    log::info!("Found {} subjects", registry.len());
    log::debug!(
        "{} sampling: image {}, label {}, border {}, batch {}",
        config.spatial_rank,
        config.image_size,
        config.label_size,
        config.border,
        config.batch_size
    );

    let sampler = GridSampler::new(config.spatial_rank, config.image_size, window);
    let mut producer = ThreadedProducer::run_threads(
        registry.clone(),
        sampler,
        network,
        config.batch_size,
        config.queue_length,
    );
    let mut accumulator = VolumeAccumulator::new(
        registry,
        indexing_policy(config.spatial_rank, window),
        config.output_settings(),
    );
    let driver = ReconstructionDriver::new(cancel).with_partial_policy(config.partial_policy());

    Ok(driver.run(&mut producer, &mut accumulator))
}
