use std::path::Path;

use crate::error::RegistryError;
use crate::rank::SpatialRank;
use crate::volume::OutputVolume;

/// A subject whose reconstruction is being assembled.
pub trait SubjectRecord {
    /// Human readable identifier used in logs and output names.
    fn name(&self) -> String;

    /// Allocates zeroed storage matching the subject's (resampled) geometry.
    fn allocate_output(
        &self,
        rank: SpatialRank,
        n_channels: usize,
        interp_order: u8,
    ) -> anyhow::Result<OutputVolume>;

    /// Persists a finished reconstruction.
    fn save_network_output(
        &self,
        volume: OutputVolume,
        output_dir: &Path,
        interp_order: u8,
    ) -> anyhow::Result<()>;
}

/// Resolves subject ids found in the patch stream.
pub trait SubjectRegistry {
    type Subject: SubjectRecord;

    fn get_subject(&self, subject_id: i64) -> Result<Self::Subject, RegistryError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
