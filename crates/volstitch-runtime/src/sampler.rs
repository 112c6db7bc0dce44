//! Regular grid sampling of subject images into network-sized patches.

use std::ops::Range;

use ndarray::{Array4, ArrayView4, s};
use volstitch_core::{PatchWindow, ProducerError, SpatialInfo, SpatialRank};

/// One sampled patch: its stream metadata and the image corner it is cut from.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchLocation {
    pub info: SpatialInfo,
    /// First image voxel on `x`, `y` and `z`. May be negative at the borders.
    pub corner: [i64; 3],
}

/// Places patches so that the regions they write tile every subject volume.
///
/// Written regions are `extent` wide and step by `extent`; the last region on an
/// axis is pulled back to end at the volume edge, overlapping its neighbour.
#[derive(Clone, Copy, Debug)]
pub struct GridSampler {
    rank: SpatialRank,
    image_size: usize,
    window: PatchWindow,
}

impl GridSampler {
    pub fn new(rank: SpatialRank, image_size: usize, window: PatchWindow) -> Self {
        Self {
            rank,
            image_size,
            window,
        }
    }

    pub fn rank(&self) -> SpatialRank {
        self.rank
    }

    /// `[x, y, z, modality]` shape of every extracted patch.
    pub fn patch_shape(&self, modalities: usize) -> [usize; 4] {
        let depth = match self.rank {
            SpatialRank::ThreeD => self.image_size,
            SpatialRank::TwoD | SpatialRank::TwoAndHalfD => 1,
        };
        [self.image_size, self.image_size, depth, modalities]
    }

    pub fn locations(
        &self,
        subject_id: i64,
        shape: [usize; 3],
    ) -> Result<Vec<PatchLocation>, ProducerError> {
        let xs = self.axis_starts(shape[0], 0)?;
        let ys = self.axis_starts(shape[1], 1)?;
        let offset = self.window.dest_offset as i64;
        let mut locations = Vec::new();

        match self.rank {
            SpatialRank::ThreeD => {
                let zs = self.axis_starts(shape[2], 2)?;
                for &x in &xs {
                    for &y in &ys {
                        for &z in &zs {
                            let corner = [x - offset, y - offset, z - offset];
                            locations.push(PatchLocation {
                                info: SpatialInfo::new(subject_id, corner),
                                corner,
                            });
                        }
                    }
                }
            }
            SpatialRank::TwoD => {
                if shape[2] != 1 {
                    return Err(ProducerError::SamplingFailed(format!(
                        "subject {subject_id} has {} slices, 2D sampling needs exactly one",
                        shape[2]
                    )));
                }
                for &x in &xs {
                    for &y in &ys {
                        let origin = [x - offset, y - offset];
                        locations.push(PatchLocation {
                            info: SpatialInfo::new(subject_id, origin),
                            corner: [origin[0], origin[1], 0],
                        });
                    }
                }
            }
            SpatialRank::TwoAndHalfD => {
                for z in 0..shape[2] as i64 {
                    for &x in &xs {
                        for &y in &ys {
                            let origin = [x - offset, y - offset];
                            locations.push(PatchLocation {
                                info: SpatialInfo::new(subject_id, origin).with_slice(z),
                                corner: [origin[0], origin[1], z],
                            });
                        }
                    }
                }
            }
        }
        Ok(locations)
    }

    /// Cuts the patch at `corner` out of a `[x, y, z, modality]` image, zero filling
    /// whatever lies outside it.
    pub fn extract(&self, image: ArrayView4<'_, f32>, corner: [i64; 3]) -> Array4<f32> {
        let shape = self.patch_shape(image.shape()[3]);
        let mut patch = Array4::zeros(shape);

        let overlaps = [
            overlap(corner[0], shape[0], image.shape()[0]),
            overlap(corner[1], shape[1], image.shape()[1]),
            overlap(corner[2], shape[2], image.shape()[2]),
        ];
        if let [Some((sx, dx)), Some((sy, dy)), Some((sz, dz))] = overlaps {
            patch
                .slice_mut(s![dx, dy, dz, ..])
                .assign(&image.slice(s![sx, sy, sz, ..]));
        }
        patch
    }

    /// Start of every written region along an axis of `length` voxels.
    fn axis_starts(&self, length: usize, axis: usize) -> Result<Vec<i64>, ProducerError> {
        let extent = self.window.extent;
        if length < extent {
            return Err(ProducerError::SamplingFailed(format!(
                "axis {axis} has {length} voxels, fewer than the {extent} written per patch"
            )));
        }
        let last = length - extent;
        let mut starts: Vec<usize> = (0..=last).step_by(extent).collect();
        if starts.last() != Some(&last) {
            starts.push(last);
        }
        Ok(starts.into_iter().map(|start| start as i64).collect())
    }
}

/// Image and patch ranges shared by a patch of `len` voxels at `start` and an image
/// axis of `extent` voxels.
fn overlap(start: i64, len: usize, extent: usize) -> Option<(Range<usize>, Range<usize>)> {
    let lo = start.max(0);
    let hi = (start + len as i64).min(extent as i64);
    if lo >= hi {
        return None;
    }
    let src = lo as usize..hi as usize;
    let dst = (lo - start) as usize..(hi - start) as usize;
    Some((src, dst))
}
