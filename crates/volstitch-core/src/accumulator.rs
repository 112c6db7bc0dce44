//! Per-subject accumulation of prediction patches.
//!
//! The accumulator keeps at most one output volume alive. A change of subject id in
//! the patch stream is the only boundary marker: it flushes the current subject and
//! allocates storage for the next one, until the stop signal arrives.

use std::path::PathBuf;

use ndarray::ArrayViewD;

use crate::error::{ReconstructionError, RegistryError};
use crate::policy::IndexingPolicy;
use crate::registry::{SubjectRecord, SubjectRegistry};
use crate::spatial::SpatialInfo;
use crate::volume::OutputVolume;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccumulatorState {
    Empty,
    Accumulating { subject_id: i64 },
    Flushing { subject_id: i64 },
    Stopped,
}

/// What the caller should do after feeding a patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The stop signal was reached; no further patches will be used.
    Stopped,
}

/// What happens to a partially reconstructed subject when the stream ends without a
/// stop signal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PartialVolumePolicy {
    #[default]
    Discard,
    Flush,
}

#[derive(Clone, Debug)]
pub struct OutputSettings {
    pub n_channels: usize,
    pub interp_order: u8,
    pub output_dir: PathBuf,
}

struct ActiveSubject<S> {
    id: i64,
    record: S,
    volume: OutputVolume,
    patches: usize,
}

pub struct VolumeAccumulator<R: SubjectRegistry> {
    registry: R,
    policy: Box<dyn IndexingPolicy>,
    settings: OutputSettings,
    state: AccumulatorState,
    current: Option<ActiveSubject<R::Subject>>,
    saved: Vec<i64>,
}

impl<R: SubjectRegistry> VolumeAccumulator<R> {
    pub fn new(registry: R, policy: Box<dyn IndexingPolicy>, settings: OutputSettings) -> Self {
        Self {
            registry,
            policy,
            settings,
            state: AccumulatorState::Empty,
            current: None,
            saved: Vec::new(),
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Subject ids flushed so far, in flush order.
    pub fn saved(&self) -> &[i64] {
        &self.saved
    }

    /// Feeds one prediction patch.
    pub fn accept(
        &mut self,
        prediction: ArrayViewD<'_, f32>,
        info: &SpatialInfo,
    ) -> Result<Step, ReconstructionError> {
        if self.state == AccumulatorState::Stopped {
            log::debug!(
                "Ignoring patch for subject {} received after the stop signal",
                info.subject_id
            );
            return Ok(Step::Stopped);
        }

        if self.current.as_ref().map(|active| active.id) != Some(info.subject_id) {
            self.flush()?;

            if info.is_stopping_signal() {
                log::info!("Received finishing batch");
                self.state = AccumulatorState::Stopped;
                return Ok(Step::Stopped);
            }

            self.begin(info.subject_id)?;
        }

        let Some(active) = self.current.as_mut() else {
            return Err(ReconstructionError::Panicked(
                "no output volume allocated for the current subject".to_string(),
            ));
        };
        self.policy.write(&mut active.volume, prediction, info)?;
        active.patches += 1;
        Ok(Step::Continue)
    }

    /// Handles a stream that ended without a stop signal.
    pub fn finish_stream(
        &mut self,
        policy: PartialVolumePolicy,
    ) -> Result<Option<i64>, ReconstructionError> {
        let flushed = match policy {
            PartialVolumePolicy::Flush => self.flush()?,
            PartialVolumePolicy::Discard => {
                self.discard();
                None
            }
        };
        self.state = AccumulatorState::Stopped;
        Ok(flushed)
    }

    /// Drops the in-progress volume without saving it.
    pub fn discard(&mut self) -> Option<i64> {
        let active = self.current.take()?;
        log::warn!(
            "Discarding incomplete output for subject {} after {} patches",
            active.id,
            active.patches
        );
        self.state = AccumulatorState::Empty;
        Some(active.id)
    }

    /// Terminal transition after a fatal error or cancellation.
    pub fn abort(&mut self) {
        self.discard();
        self.state = AccumulatorState::Stopped;
    }

    fn begin(&mut self, subject_id: i64) -> Result<(), ReconstructionError> {
        let record = self.registry.get_subject(subject_id)?;
        let volume = record
            .allocate_output(
                self.policy.rank(),
                self.settings.n_channels,
                self.settings.interp_order,
            )
            .map_err(|source| RegistryError::AllocationFailed { subject_id, source })?;
        log::debug!(
            "Allocated output volume {:?} for subject {} ({})",
            volume.shape(),
            subject_id,
            record.name()
        );
        self.current = Some(ActiveSubject {
            id: subject_id,
            record,
            volume,
            patches: 0,
        });
        self.state = AccumulatorState::Accumulating { subject_id };
        Ok(())
    }

    fn flush(&mut self) -> Result<Option<i64>, ReconstructionError> {
        let Some(active) = self.current.take() else {
            return Ok(None);
        };
        self.state = AccumulatorState::Flushing {
            subject_id: active.id,
        };

        let volume = active.volume.normalize_modality_axis();
        active
            .record
            .save_network_output(volume, &self.settings.output_dir, self.settings.interp_order)
            .map_err(|source| ReconstructionError::SaveFailed {
                subject_id: active.id,
                source,
            })?;
        log::info!(
            "Saved output for subject {} ({}) from {} patches",
            active.id,
            active.record.name(),
            active.patches
        );

        self.saved.push(active.id);
        self.state = AccumulatorState::Empty;
        Ok(Some(active.id))
    }
}
