//! Rank-aware mapping from patch metadata to output-volume slices.
//!
//! One strategy per spatial mode, picked once by [`indexing_policy`]. All of them
//! describe a write as three half-open destination ranges (checked against the
//! volume before anything is copied) and three source ranges into the prediction.

use std::ops::Range;

use ndarray::{ArrayViewD, s};

use crate::error::ReconstructionError;
use crate::rank::SpatialRank;
use crate::spatial::SpatialInfo;
use crate::volume::{CHANNEL_AXIS, MODALITY_AXIS, OutputVolume, to_volume_layout};
use crate::window::PatchWindow;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AxisRegion {
    /// Destination range in volume coordinates; may be out of bounds until checked.
    /// `None` when the range overflows.
    pub dest: Option<(i64, i64)>,
    pub src: Range<usize>,
}

impl AxisRegion {
    fn singleton(dest: i64) -> Self {
        Self {
            dest: dest.checked_add(1).map(|end| (dest, end)),
            src: 0..1,
        }
    }
}

pub trait IndexingPolicy: Send + Sync {
    fn rank(&self) -> SpatialRank;

    /// Destination and source ranges for `x`, `y` and `z`.
    fn regions(&self, info: &SpatialInfo) -> Result<[AxisRegion; 3], ReconstructionError>;

    /// Copies the trustworthy part of `prediction` into `volume`.
    fn write(
        &self,
        volume: &mut OutputVolume,
        prediction: ArrayViewD<'_, f32>,
        info: &SpatialInfo,
    ) -> Result<(), ReconstructionError> {
        let regions = self.regions(info)?;
        write_regions(volume, prediction, info.subject_id, regions)
    }
}

pub fn indexing_policy(rank: SpatialRank, window: PatchWindow) -> Box<dyn IndexingPolicy> {
    match rank {
        SpatialRank::TwoD => Box::new(Planar { window }),
        SpatialRank::TwoAndHalfD => Box::new(SliceStack { window }),
        SpatialRank::ThreeD => Box::new(Volumetric { window }),
    }
}

pub struct Volumetric {
    window: PatchWindow,
}

impl IndexingPolicy for Volumetric {
    fn rank(&self) -> SpatialRank {
        SpatialRank::ThreeD
    }

    fn regions(&self, info: &SpatialInfo) -> Result<[AxisRegion; 3], ReconstructionError> {
        let [x, y, z] = origin::<3>(info)?;
        Ok([
            window_region(&self.window, x),
            window_region(&self.window, y),
            window_region(&self.window, z),
        ])
    }
}

/// 2D patches into a volume whose z axis is a singleton.
pub struct Planar {
    window: PatchWindow,
}

impl IndexingPolicy for Planar {
    fn rank(&self) -> SpatialRank {
        SpatialRank::TwoD
    }

    fn regions(&self, info: &SpatialInfo) -> Result<[AxisRegion; 3], ReconstructionError> {
        let [x, y] = origin::<2>(info)?;
        Ok([
            window_region(&self.window, x),
            window_region(&self.window, y),
            AxisRegion::singleton(0),
        ])
    }
}

/// 2D patches stacked into a 3D volume, one slice per patch.
pub struct SliceStack {
    window: PatchWindow,
}

impl IndexingPolicy for SliceStack {
    fn rank(&self) -> SpatialRank {
        SpatialRank::TwoAndHalfD
    }

    fn regions(&self, info: &SpatialInfo) -> Result<[AxisRegion; 3], ReconstructionError> {
        let [x, y] = origin::<2>(info)?;
        let z = info
            .extra_slice_index
            .ok_or_else(|| ReconstructionError::MalformedInfo {
                subject_id: info.subject_id,
                reason: "2.5D patch without a slice index".to_string(),
            })?;
        Ok([
            window_region(&self.window, x),
            window_region(&self.window, y),
            AxisRegion::singleton(z),
        ])
    }
}

fn window_region(window: &PatchWindow, origin: i64) -> AxisRegion {
    AxisRegion {
        dest: window.dest_range(origin),
        src: window.src_range(),
    }
}

fn origin<const N: usize>(info: &SpatialInfo) -> Result<[i64; N], ReconstructionError> {
    <[i64; N]>::try_from(info.origin.as_slice()).map_err(|_| ReconstructionError::MalformedInfo {
        subject_id: info.subject_id,
        reason: format!(
            "expected {N} origin coordinates, got {}",
            info.origin.len()
        ),
    })
}

fn write_regions(
    volume: &mut OutputVolume,
    prediction: ArrayViewD<'_, f32>,
    subject_id: i64,
    regions: [AxisRegion; 3],
) -> Result<(), ReconstructionError> {
    let extents = volume.spatial_shape();
    let mut dest: [Range<usize>; 3] = Default::default();
    for (axis, region) in regions.iter().enumerate() {
        let extent = extents[axis];
        let (start, end) = region.dest.unwrap_or((i64::MAX, i64::MAX));
        if start < 0 || end < start || end > extent as i64 {
            return Err(ReconstructionError::OutOfBounds {
                subject_id,
                axis,
                start,
                end,
                extent,
            });
        }
        dest[axis] = start as usize..end as usize;
    }

    let prediction = to_volume_layout(prediction)?;
    let pred_shape = prediction.shape();
    for (axis, region) in regions.iter().enumerate() {
        if region.src.end > pred_shape[axis] {
            return Err(ReconstructionError::ShapeMismatch(format!(
                "prediction axis {axis} has {} voxels, patch window needs {:?}",
                pred_shape[axis], region.src
            )));
        }
    }
    for axis in [CHANNEL_AXIS, MODALITY_AXIS] {
        if pred_shape[axis] != volume.shape()[axis] {
            return Err(ReconstructionError::ShapeMismatch(format!(
                "prediction has {} entries on axis {axis}, output volume has {}",
                pred_shape[axis],
                volume.shape()[axis]
            )));
        }
    }

    let [rx, ry, rz] = regions;
    let source = prediction.slice(s![rx.src, ry.src, rz.src, .., ..]);
    let [dx, dy, dz] = dest;
    volume.slice_mut(s![dx, dy, dz, .., ..]).assign(&source);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, Array3, IxDyn};
    use rstest::rstest;

    fn patch(shape: &[usize], fill: f32) -> ndarray::ArrayD<f32> {
        Array::from_elem(IxDyn(shape), fill)
    }

    #[test]
    fn test_volumetric_border_write() {
        let window = PatchWindow::resolve(8, 8, 2).unwrap();
        let policy = indexing_policy(SpatialRank::ThreeD, window);
        let mut volume = OutputVolume::zeros([4, 4, 8], 1);

        let mut prediction = Array3::<f32>::zeros((8, 8, 8));
        let mut value = 1.0;
        for x in 2..6 {
            for y in 2..6 {
                for z in 2..6 {
                    prediction[[x, y, z]] = value;
                    value += 1.0;
                }
            }
        }

        let info = SpatialInfo::new(0, [-2, -2, 2]);
        policy
            .write(&mut volume, prediction.view().into_dyn(), &info)
            .unwrap();

        for x in 0..4 {
            for y in 0..4 {
                for z in 0..8 {
                    let expected = if (4..8).contains(&z) {
                        prediction[[x + 2, y + 2, z - 2]]
                    } else {
                        0.0
                    };
                    assert_eq!(volume[[x, y, z, 0, 0]], expected);
                }
            }
        }
    }

    #[test]
    fn test_planar_shrink_write() {
        let window = PatchWindow::resolve(6, 4, 0).unwrap();
        let policy = indexing_policy(SpatialRank::TwoD, window);
        let mut volume = OutputVolume::zeros([6, 6, 1], 2);

        let prediction = patch(&[4, 4, 1, 2], 3.0);
        policy
            .write(&mut volume, prediction.view(), &SpatialInfo::new(1, [1, 0]))
            .unwrap();

        assert_eq!(volume[[2, 1, 0, 1, 0]], 3.0);
        assert_eq!(volume[[5, 4, 0, 0, 0]], 3.0);
        assert_eq!(volume[[1, 1, 0, 0, 0]], 0.0);
        assert_eq!(volume[[2, 5, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_slice_stack_requires_slice_index() {
        let window = PatchWindow::resolve(4, 4, 0).unwrap();
        let policy = indexing_policy(SpatialRank::TwoAndHalfD, window);
        let mut volume = OutputVolume::zeros([4, 4, 3], 1);
        let prediction = patch(&[4, 4, 1], 1.0);

        let result = policy.write(&mut volume, prediction.view(), &SpatialInfo::new(0, [0, 0]));
        assert!(matches!(
            result,
            Err(ReconstructionError::MalformedInfo { subject_id: 0, .. })
        ));
    }

    #[rstest]
    #[case(SpatialRank::TwoD, SpatialInfo::new(0, [3, 0]), 0)]
    #[case(SpatialRank::TwoD, SpatialInfo::new(0, [0, -1]), 1)]
    #[case(SpatialRank::TwoAndHalfD, SpatialInfo::new(0, [0, 0]).with_slice(3), 2)]
    #[case(SpatialRank::TwoAndHalfD, SpatialInfo::new(0, [0, 0]).with_slice(-1), 2)]
    #[case(SpatialRank::ThreeD, SpatialInfo::new(0, [0, 0, 1]), 2)]
    fn test_out_of_bounds_is_fatal(
        #[case] rank: SpatialRank,
        #[case] info: SpatialInfo,
        #[case] failing_axis: usize,
    ) {
        let window = PatchWindow::resolve(4, 4, 0).unwrap();
        let policy = indexing_policy(rank, window);
        let (depth, patch_depth) = match rank {
            SpatialRank::TwoD => (1, 1),
            SpatialRank::TwoAndHalfD => (3, 1),
            SpatialRank::ThreeD => (4, 4),
        };
        let mut volume = OutputVolume::zeros([6, 4, depth], 1);
        let prediction = patch(&[4, 4, patch_depth], 1.0);

        let error = policy
            .write(&mut volume, prediction.view(), &info)
            .unwrap_err();
        assert!(error.is_configuration());
        match error {
            ReconstructionError::OutOfBounds { axis, .. } => assert_eq!(axis, failing_axis),
            other => panic!("unexpected error: {other}"),
        }
        assert!(volume.iter().all(|v| *v == 0.0));
    }

    #[rstest]
    #[case(SpatialRank::ThreeD, SpatialInfo::new(0, [i64::MAX - 1, 0, 0]), 0)]
    #[case(SpatialRank::ThreeD, SpatialInfo::new(0, [0, i64::MAX - 5, 0]), 1)]
    #[case(SpatialRank::TwoAndHalfD, SpatialInfo::new(0, [0, 0]).with_slice(i64::MAX), 2)]
    fn test_overflowing_origin_is_out_of_bounds(
        #[case] rank: SpatialRank,
        #[case] info: SpatialInfo,
        #[case] failing_axis: usize,
    ) {
        let window = PatchWindow::resolve(8, 8, 2).unwrap();
        let policy = indexing_policy(rank, window);
        let (depth, patch_depth) = match rank {
            SpatialRank::ThreeD => (8, 8),
            _ => (3, 1),
        };
        let mut volume = OutputVolume::zeros([8, 8, depth], 1);
        let prediction = patch(&[8, 8, patch_depth], 1.0);

        let error = policy
            .write(&mut volume, prediction.view(), &info)
            .unwrap_err();
        match error {
            ReconstructionError::OutOfBounds { axis, .. } => assert_eq!(axis, failing_axis),
            other => panic!("unexpected error: {other}"),
        }
        assert!(volume.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_channel_mismatch_is_reported() {
        let window = PatchWindow::resolve(4, 4, 0).unwrap();
        let policy = indexing_policy(SpatialRank::ThreeD, window);
        let mut volume = OutputVolume::zeros([4, 4, 4], 3);
        let prediction = patch(&[4, 4, 4, 2], 1.0);

        let result = policy.write(&mut volume, prediction.view(), &SpatialInfo::new(0, [0, 0, 0]));
        assert!(matches!(result, Err(ReconstructionError::ShapeMismatch(_))));
    }

    #[test]
    fn test_short_prediction_is_reported() {
        let window = PatchWindow::resolve(8, 8, 2).unwrap();
        let policy = indexing_policy(SpatialRank::ThreeD, window);
        let mut volume = OutputVolume::zeros([8, 8, 8], 1);
        let prediction = patch(&[4, 4, 4], 1.0);

        let result = policy.write(&mut volume, prediction.view(), &SpatialInfo::new(0, [0, 0, 0]));
        assert!(matches!(result, Err(ReconstructionError::ShapeMismatch(_))));
    }
}
