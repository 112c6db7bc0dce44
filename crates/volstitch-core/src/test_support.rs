use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::{Array, Array5, ArrayD, IxDyn};

use crate::accumulator::{OutputSettings, VolumeAccumulator};
use crate::error::{ProducerError, RegistryError};
use crate::policy::indexing_policy;
use crate::producer::{CancelToken, PatchBatch, PatchProducer, Pulled};
use crate::rank::SpatialRank;
use crate::registry::{SubjectRecord, SubjectRegistry};
use crate::volume::OutputVolume;
use crate::window::PatchWindow;

pub(crate) type SavedLog = Rc<RefCell<Vec<(i64, Array5<f32>)>>>;

#[derive(Clone)]
pub(crate) struct FakeSubject {
    pub id: i64,
    pub shape: [usize; 3],
    pub saved: SavedLog,
    pub fail_save: bool,
}

impl SubjectRecord for FakeSubject {
    fn name(&self) -> String {
        format!("subject-{}", self.id)
    }

    fn allocate_output(
        &self,
        _rank: SpatialRank,
        n_channels: usize,
        _interp_order: u8,
    ) -> anyhow::Result<OutputVolume> {
        Ok(OutputVolume::zeros(self.shape, n_channels))
    }

    fn save_network_output(
        &self,
        volume: OutputVolume,
        _output_dir: &Path,
        _interp_order: u8,
    ) -> anyhow::Result<()> {
        if self.fail_save {
            anyhow::bail!("disk full");
        }
        self.saved.borrow_mut().push((self.id, volume.into_inner()));
        Ok(())
    }
}

pub(crate) struct FakeRegistry {
    pub subjects: BTreeMap<i64, FakeSubject>,
}

impl FakeRegistry {
    pub fn new(shapes: &[(i64, [usize; 3])]) -> (Self, SavedLog) {
        let saved = SavedLog::default();
        let subjects = shapes
            .iter()
            .map(|&(id, shape)| {
                let subject = FakeSubject {
                    id,
                    shape,
                    saved: saved.clone(),
                    fail_save: false,
                };
                (id, subject)
            })
            .collect();
        (Self { subjects }, saved)
    }
}

impl SubjectRegistry for FakeRegistry {
    type Subject = FakeSubject;

    fn get_subject(&self, subject_id: i64) -> Result<FakeSubject, RegistryError> {
        self.subjects
            .get(&subject_id)
            .cloned()
            .ok_or(RegistryError::UnknownSubject(subject_id))
    }

    fn len(&self) -> usize {
        self.subjects.len()
    }
}

pub(crate) fn accumulator(
    rank: SpatialRank,
    window: PatchWindow,
    registry: FakeRegistry,
) -> VolumeAccumulator<FakeRegistry> {
    let settings = OutputSettings {
        n_channels: 1,
        interp_order: 0,
        output_dir: PathBuf::from("out"),
    };
    VolumeAccumulator::new(registry, indexing_policy(rank, window), settings)
}

pub(crate) fn ones(shape: &[usize]) -> ArrayD<f32> {
    Array::ones(IxDyn(shape))
}

/// Replays a fixed list of pulls and counts shutdown requests.
pub(crate) struct ScriptedProducer {
    pulls: VecDeque<Result<PatchBatch, ProducerError>>,
    pub close_calls: Rc<Cell<usize>>,
    pub cancel_after: Option<(usize, CancelToken)>,
    pub panic_on_pop: bool,
    popped: usize,
    closed: bool,
}

impl ScriptedProducer {
    pub fn new(pulls: impl IntoIterator<Item = Result<PatchBatch, ProducerError>>) -> Self {
        Self {
            pulls: pulls.into_iter().collect(),
            close_calls: Rc::default(),
            cancel_after: None,
            panic_on_pop: false,
            popped: 0,
            closed: false,
        }
    }
}

impl PatchProducer for ScriptedProducer {
    fn pop_batch(&mut self, cancel: &CancelToken) -> Result<Pulled, ProducerError> {
        if self.panic_on_pop {
            panic!("sampler exploded");
        }
        if let Some((after, token)) = &self.cancel_after {
            if self.popped >= *after {
                token.cancel();
            }
        }
        if cancel.is_cancelled() {
            return Ok(Pulled::Cancelled);
        }
        if self.closed {
            return Ok(Pulled::EndOfStream);
        }
        self.popped += 1;
        match self.pulls.pop_front() {
            Some(Ok(batch)) => Ok(Pulled::Batch(batch)),
            Some(Err(e)) => Err(e),
            None => Ok(Pulled::EndOfStream),
        }
    }

    fn should_stop(&self) -> bool {
        self.closed
    }

    fn close_all(&mut self) {
        self.close_calls.set(self.close_calls.get() + 1);
        self.closed = true;
    }
}
