use crate::error::ConfigError;
use serde::Deserialize;

/// Spatial mode of a run, chosen once from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, strum::Display)]
#[serde(try_from = "f64")]
pub enum SpatialRank {
    #[strum(serialize = "2D")]
    TwoD,
    /// 2D patches written one slice at a time into a 3D volume.
    #[strum(serialize = "2.5D")]
    TwoAndHalfD,
    #[strum(serialize = "3D")]
    ThreeD,
}

impl SpatialRank {
    /// Number of origin coordinates carried by each patch.
    pub fn origin_len(self) -> usize {
        match self {
            SpatialRank::TwoD | SpatialRank::TwoAndHalfD => 2,
            SpatialRank::ThreeD => 3,
        }
    }

    pub fn has_extra_slice(self) -> bool {
        matches!(self, SpatialRank::TwoAndHalfD)
    }

    pub fn as_f64(self) -> f64 {
        match self {
            SpatialRank::TwoD => 2.0,
            SpatialRank::TwoAndHalfD => 2.5,
            SpatialRank::ThreeD => 3.0,
        }
    }
}

impl TryFrom<f64> for SpatialRank {
    type Error = ConfigError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 2.0 {
            Ok(SpatialRank::TwoD)
        } else if value == 2.5 {
            Ok(SpatialRank::TwoAndHalfD)
        } else if value == 3.0 {
            Ok(SpatialRank::ThreeD)
        } else {
            Err(ConfigError::UnsupportedRank(value))
        }
    }
}

impl std::str::FromStr for SpatialRank {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_end_matches(['d', 'D']);
        let value: f64 = trimmed.parse().map_err(|_| ConfigError::InvalidValue {
            key: "spatial_rank",
            reason: format!("'{s}' is not a number"),
        })?;
        SpatialRank::try_from(value)
    }
}
