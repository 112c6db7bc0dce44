//! In-memory subjects and the store their reconstructions are saved into.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::Array4;
use volstitch_core::{OutputVolume, RegistryError, SpatialRank, SubjectRecord, SubjectRegistry};

#[derive(Clone, Debug)]
pub struct SavedOutput {
    pub subject_id: i64,
    /// Where an image writer would place the file.
    pub path: PathBuf,
    pub volume: OutputVolume,
}

/// Shared sink for saved reconstructions, readable after the run.
#[derive(Clone, Debug, Default)]
pub struct OutputStore(Arc<Mutex<Vec<SavedOutput>>>);

impl OutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, output: SavedOutput) -> anyhow::Result<()> {
        let mut outputs = self
            .0
            .lock()
            .map_err(|_| anyhow::anyhow!("output store lock poisoned"))?;
        outputs.push(output);
        Ok(())
    }

    /// Saved outputs in save order.
    pub fn outputs(&self) -> Vec<SavedOutput> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, subject_id: i64) -> Option<SavedOutput> {
        self.outputs()
            .into_iter()
            .find(|output| output.subject_id == subject_id)
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A subject image held in memory, laid out `[x, y, z, modality]`.
#[derive(Clone, Debug)]
pub struct MemorySubject {
    id: i64,
    name: String,
    image: Arc<Array4<f32>>,
    store: OutputStore,
}

impl MemorySubject {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn image(&self) -> &Array4<f32> {
        &self.image
    }

    pub fn spatial_shape(&self) -> [usize; 3] {
        let shape = self.image.shape();
        [shape[0], shape[1], shape[2]]
    }

    pub fn modalities(&self) -> usize {
        self.image.shape()[3]
    }
}

impl SubjectRecord for MemorySubject {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn allocate_output(
        &self,
        rank: SpatialRank,
        n_channels: usize,
        _interp_order: u8,
    ) -> anyhow::Result<OutputVolume> {
        let shape = self.spatial_shape();
        if rank == SpatialRank::TwoD && shape[2] != 1 {
            anyhow::bail!(
                "subject '{}' has {} slices, a 2D output needs exactly one",
                self.name,
                shape[2]
            );
        }
        Ok(OutputVolume::zeros(shape, n_channels))
    }

    fn save_network_output(
        &self,
        volume: OutputVolume,
        output_dir: &Path,
        _interp_order: u8,
    ) -> anyhow::Result<()> {
        let path = output_dir.join(format!("{}_seg.nii.gz", self.name));
        log::info!("Saved {}", path.display());
        self.store.push(SavedOutput {
            subject_id: self.id,
            path,
            volume,
        })
    }
}

/// Subjects addressed by their position, the id the sampler writes into the stream.
#[derive(Clone, Debug, Default)]
pub struct MemoryRegistry {
    subjects: Arc<Vec<MemorySubject>>,
    store: OutputStore,
}

impl MemoryRegistry {
    pub fn new(store: OutputStore) -> Self {
        Self {
            subjects: Arc::default(),
            store,
        }
    }

    pub fn with_subject(mut self, name: impl Into<String>, image: Array4<f32>) -> Self {
        let subjects = Arc::make_mut(&mut self.subjects);
        subjects.push(MemorySubject {
            id: subjects.len() as i64,
            name: name.into(),
            image: Arc::new(image),
            store: self.store.clone(),
        });
        self
    }

    pub fn subjects(&self) -> impl Iterator<Item = &MemorySubject> {
        self.subjects.iter()
    }
}

impl SubjectRegistry for MemoryRegistry {
    type Subject = MemorySubject;

    fn get_subject(&self, subject_id: i64) -> Result<MemorySubject, RegistryError> {
        usize::try_from(subject_id)
            .ok()
            .and_then(|index| self.subjects.get(index))
            .cloned()
            .ok_or(RegistryError::UnknownSubject(subject_id))
    }

    fn len(&self) -> usize {
        self.subjects.len()
    }
}
