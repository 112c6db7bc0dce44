use crate::error::ConfigError;

/// Where the trustworthy part of a prediction lands relative to the patch origin.
///
/// Resolved once per run from the sampled patch size (`image_size`), the network
/// output size (`label_size`) and the configured `border`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatchWindow {
    /// Offset added to the patch origin to get the first written output voxel.
    pub dest_offset: usize,
    /// First prediction voxel copied on each patch axis.
    pub src_offset: usize,
    /// Number of voxels copied on each patch axis.
    pub extent: usize,
}

impl PatchWindow {
    pub fn resolve(
        image_size: usize,
        label_size: usize,
        border: usize,
    ) -> Result<Self, ConfigError> {
        if image_size == 0 || label_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "image_size",
                reason: "patch sizes must be positive".to_string(),
            });
        }

        if border > 0 && label_size == image_size {
            if 2 * border >= image_size {
                return Err(ConfigError::BorderTooLarge { image_size, border });
            }
            return Ok(Self {
                dest_offset: border,
                src_offset: border,
                extent: image_size - 2 * border,
            });
        }

        if label_size > image_size {
            return Err(ConfigError::LabelLargerThanImage {
                image_size,
                label_size,
            });
        }
        let shrink = image_size - label_size;
        if shrink % 2 != 0 {
            return Err(ConfigError::NonIntegerOffset {
                image_size,
                label_size,
            });
        }
        Ok(Self {
            dest_offset: shrink / 2,
            src_offset: 0,
            extent: label_size,
        })
    }

    /// Half-open destination range on one axis for a patch anchored at `origin`, or
    /// `None` when it does not fit in `i64`.
    pub fn dest_range(&self, origin: i64) -> Option<(i64, i64)> {
        let start = origin.checked_add(i64::try_from(self.dest_offset).ok()?)?;
        let end = start.checked_add(i64::try_from(self.extent).ok()?)?;
        Some((start, end))
    }

    pub fn src_range(&self) -> std::ops::Range<usize> {
        self.src_offset..self.src_offset + self.extent
    }
}
