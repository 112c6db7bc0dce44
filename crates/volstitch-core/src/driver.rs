//! The reconstruction control loop.
//!
//! Pulls batches from a [`PatchProducer`], feeds them record by record into a
//! [`VolumeAccumulator`] and turns every way the run can end into a [`RunOutcome`].
//! The producer is shut down on every exit path.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use crate::accumulator::{PartialVolumePolicy, Step, VolumeAccumulator};
use crate::error::ReconstructionError;
use crate::producer::{CancelToken, PatchProducer, Pulled};
use crate::registry::SubjectRegistry;

#[derive(Debug)]
pub enum RunOutcome {
    /// The stop signal was reached and every subject was saved.
    Completed,
    /// The producer ran dry before sending the stop signal.
    Incomplete,
    Cancelled,
    ConfigurationError(ReconstructionError),
    Failed(ReconstructionError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }

    pub fn error(&self) -> Option<&ReconstructionError> {
        match self {
            RunOutcome::ConfigurationError(e) | RunOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn from_error(error: ReconstructionError) -> Self {
        if error.is_configuration() {
            RunOutcome::ConfigurationError(error)
        } else {
            RunOutcome::Failed(error)
        }
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Subject ids saved during the run, in flush order.
    pub saved_subjects: Vec<i64>,
    pub patches: usize,
    pub batches: usize,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn all_saved(&self) -> bool {
        self.outcome.is_success()
    }
}

enum Exit {
    StopSignal,
    ProducerStopped,
    EndOfStream,
    Cancelled,
}

#[derive(Default)]
struct Progress {
    patches: usize,
    batches: usize,
}

pub struct ReconstructionDriver {
    cancel: CancelToken,
    partial_policy: PartialVolumePolicy,
}

impl ReconstructionDriver {
    pub fn new(cancel: CancelToken) -> Self {
        Self {
            cancel,
            partial_policy: PartialVolumePolicy::default(),
        }
    }

    pub fn with_partial_policy(mut self, policy: PartialVolumePolicy) -> Self {
        self.partial_policy = policy;
        self
    }

    pub fn run<P, R>(&self, producer: &mut P, accumulator: &mut VolumeAccumulator<R>) -> RunReport
    where
        P: PatchProducer,
        R: SubjectRegistry,
    {
        let start = Instant::now();
        let mut progress = Progress::default();

        let result = catch_unwind(AssertUnwindSafe(|| {
            self.drive(producer, accumulator, &mut progress)
        }))
        .unwrap_or_else(|panic| Err(ReconstructionError::Panicked(panic_message(&*panic))));

        let outcome = match result {
            Ok(Exit::StopSignal) => RunOutcome::Completed,
            Ok(Exit::ProducerStopped) => {
                log::warn!("Producer requested shutdown before the stop signal");
                accumulator.abort();
                RunOutcome::Incomplete
            }
            Ok(Exit::EndOfStream) => match accumulator.finish_stream(self.partial_policy) {
                Ok(_) => RunOutcome::Incomplete,
                Err(e) => self.fail(producer, accumulator, e),
            },
            Ok(Exit::Cancelled) => {
                log::info!("User cancelled inference");
                producer.close_all();
                accumulator.abort();
                RunOutcome::Cancelled
            }
            Err(e) => self.fail(producer, accumulator, e),
        };

        if !outcome.is_success() {
            log::warn!("Stopped early, incomplete predictions");
        }
        let elapsed = start.elapsed();
        log::info!("Inference time: {:.3} seconds", elapsed.as_secs_f64());
        producer.close_all();

        RunReport {
            outcome,
            saved_subjects: accumulator.saved().to_vec(),
            patches: progress.patches,
            batches: progress.batches,
            elapsed,
        }
    }

    fn drive<P, R>(
        &self,
        producer: &mut P,
        accumulator: &mut VolumeAccumulator<R>,
        progress: &mut Progress,
    ) -> Result<Exit, ReconstructionError>
    where
        P: PatchProducer,
        R: SubjectRegistry,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Exit::Cancelled);
            }
            if producer.should_stop() {
                return Ok(Exit::ProducerStopped);
            }

            let batch_start = Instant::now();
            let batch = match producer.pop_batch(&self.cancel)? {
                Pulled::Batch(batch) => batch,
                Pulled::EndOfStream => return Ok(Exit::EndOfStream),
                Pulled::Cancelled => return Ok(Exit::Cancelled),
            };
            progress.batches += 1;

            let mut stopped = false;
            for (index, (prediction, info)) in batch.records().enumerate() {
                match accumulator.accept(prediction, info)? {
                    Step::Continue => progress.patches += 1,
                    Step::Stopped => {
                        log::debug!(
                            "Stop signal at record {index}, dropping {} trailing records",
                            batch.len() - index - 1
                        );
                        producer.close_all();
                        stopped = true;
                        break;
                    }
                }
            }

            log::info!(
                "Processed {} image patches ({:.3}s)",
                batch.len(),
                batch_start.elapsed().as_secs_f64()
            );

            if stopped {
                return Ok(Exit::StopSignal);
            }
        }
    }

    fn fail<P, R>(
        &self,
        producer: &mut P,
        accumulator: &mut VolumeAccumulator<R>,
        error: ReconstructionError,
    ) -> RunOutcome
    where
        P: PatchProducer,
        R: SubjectRegistry,
    {
        log::error!("Reconstruction failed: {error:?}");
        producer.close_all();
        accumulator.abort();
        RunOutcome::from_error(error)
    }
}

/// Text of a panic payload caught by `catch_unwind` or a thread join.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
