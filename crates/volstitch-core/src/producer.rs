use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ndarray::{ArrayD, ArrayViewD};

use crate::error::ProducerError;
use crate::spatial::SpatialInfo;

/// A token that can be used to cancel an ongoing reconstruction.
#[derive(Clone, Debug)]
pub struct CancelToken(Arc<AtomicBool>);

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Network outputs for a batch of patches, with one [`SpatialInfo`] per entry of the
/// leading batch axis.
#[derive(Clone, Debug)]
pub struct PatchBatch {
    predictions: ArrayD<f32>,
    info: Vec<SpatialInfo>,
}

impl PatchBatch {
    pub fn new(predictions: ArrayD<f32>, info: Vec<SpatialInfo>) -> Result<Self, ProducerError> {
        let entries = predictions.shape().first().copied().unwrap_or(0);
        if predictions.ndim() < 2 || entries != info.len() {
            return Err(ProducerError::MalformedBatch(format!(
                "{} spatial info rows for predictions of shape {:?}",
                info.len(),
                predictions.shape()
            )));
        }
        Ok(Self { predictions, info })
    }

    pub fn len(&self) -> usize {
        self.info.len()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
    }

    pub fn info(&self) -> &[SpatialInfo] {
        &self.info
    }

    /// Iterates `(prediction, spatial info)` pairs in emission order.
    pub fn records(&self) -> impl Iterator<Item = (ArrayViewD<'_, f32>, &SpatialInfo)> {
        self.predictions.outer_iter().zip(self.info.iter())
    }
}

/// Result of one blocking pull from a producer.
#[derive(Debug)]
pub enum Pulled {
    Batch(PatchBatch),
    /// The producer closed without further data.
    EndOfStream,
    Cancelled,
}

/// The sending side of the reconstruction pipeline: something that samples subjects,
/// scores patches and hands them over in emission order.
///
/// Implementations must emit all patches of one subject as a contiguous run.
pub trait PatchProducer {
    /// Blocks until a batch is available, the producer finishes or `cancel` fires.
    fn pop_batch(&mut self, cancel: &CancelToken) -> Result<Pulled, ProducerError>;

    /// Whether the producer has been asked to shut down.
    fn should_stop(&self) -> bool;

    /// Closes the queue and joins background work. Safe to call any number of times.
    fn close_all(&mut self);
}
