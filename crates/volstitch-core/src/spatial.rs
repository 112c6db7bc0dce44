//! Per-patch spatial metadata.
//!
//! Every prediction patch travels with a [`SpatialInfo`] telling the reconstruction
//! stage which subject it belongs to and where it was sampled.

use crate::rank::SpatialRank;

/// Subject id used by the canonical stop-signal record.
pub const STOP_SUBJECT_ID: i64 = -1;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpatialInfo {
    pub subject_id: i64,
    /// Anchor of the sampled image patch in the subject's padded volume space.
    pub origin: Vec<i64>,
    /// Output z slice, 2.5D mode only.
    pub extra_slice_index: Option<i64>,
}

impl SpatialInfo {
    pub fn new(subject_id: i64, origin: impl Into<Vec<i64>>) -> Self {
        Self {
            subject_id,
            origin: origin.into(),
            extra_slice_index: None,
        }
    }

    pub fn with_slice(mut self, slice: i64) -> Self {
        self.extra_slice_index = Some(slice);
        self
    }

    /// The canonical end-of-run record for the given rank.
    pub fn stop(rank: SpatialRank) -> Self {
        Self {
            subject_id: STOP_SUBJECT_ID,
            origin: vec![-1; rank.origin_len()],
            extra_slice_index: rank.has_extra_slice().then_some(-1),
        }
    }

    /// Any negative subject id marks the end of the whole run.
    pub fn is_stopping_signal(&self) -> bool {
        self.subject_id < 0
    }
}
