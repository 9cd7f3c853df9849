//! Stage factors and resample modes.
//!
//! A job is an ordered pipeline of scale stages. Each stage applies one
//! [`ScaleFactor`]; the whole pipeline shares one [`ResampleMode`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Upper bound on the number of stages in one job.
pub const MAX_STAGES: usize = 5;

pub const FACTOR_X2: &str = "x2";
pub const FACTOR_X4: &str = "x4";
pub const FACTOR_X8: &str = "x8";

/// All valid factor labels, in display order.
pub const VALID_FACTORS: &[&str] = &[FACTOR_X2, FACTOR_X4, FACTOR_X8];

pub const MODE_NEAREST: &str = "nearest";
pub const MODE_BILINEAR: &str = "bilinear";
pub const MODE_BICUBIC: &str = "bicubic";
pub const MODE_AREA: &str = "area";
pub const MODE_NEAREST_EXACT: &str = "nearest-exact";

/// All valid resample mode strings.
pub const VALID_RESAMPLE_MODES: &[&str] = &[
    MODE_NEAREST,
    MODE_BILINEAR,
    MODE_BICUBIC,
    MODE_AREA,
    MODE_NEAREST_EXACT,
];

// ---------------------------------------------------------------------------
// ScaleFactor
// ---------------------------------------------------------------------------

/// Scale factor applied by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScaleFactor {
    #[serde(rename = "x2")]
    X2,
    #[serde(rename = "x4")]
    X4,
    #[serde(rename = "x8")]
    X8,
}

impl ScaleFactor {
    pub const ALL: [ScaleFactor; 3] = [Self::X2, Self::X4, Self::X8];

    /// Display label, e.g. `"x4"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X2 => FACTOR_X2,
            Self::X4 => FACTOR_X4,
            Self::X8 => FACTOR_X8,
        }
    }

    /// Wire form sent to the backend, without the unit prefix (`"4"`).
    pub fn wire_value(&self) -> &'static str {
        &self.as_str()[1..]
    }

    pub fn multiplier(&self) -> u32 {
        match self {
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }
}

impl FromStr for ScaleFactor {
    type Err = ValidationError;

    /// Accepts both the labelled (`"x4"`) and bare (`"4"`) spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let bare = normalized.strip_prefix('x').unwrap_or(&normalized);
        match bare {
            "2" => Ok(Self::X2),
            "4" => Ok(Self::X4),
            "8" => Ok(Self::X8),
            _ => Err(ValidationError::InvalidFactor(s.to_string())),
        }
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResampleMode
// ---------------------------------------------------------------------------

/// Interpolation used between model stages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleMode {
    Nearest,
    Bilinear,
    Bicubic,
    Area,
    #[default]
    NearestExact,
}

impl ResampleMode {
    pub const ALL: [ResampleMode; 5] = [
        Self::Nearest,
        Self::Bilinear,
        Self::Bicubic,
        Self::Area,
        Self::NearestExact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => MODE_NEAREST,
            Self::Bilinear => MODE_BILINEAR,
            Self::Bicubic => MODE_BICUBIC,
            Self::Area => MODE_AREA,
            Self::NearestExact => MODE_NEAREST_EXACT,
        }
    }

    /// Human-readable description for selection lists.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Nearest => "Nearest Neighbor - Fast and sharp lines",
            Self::Bilinear => "Bilinear - Smooth interpolation",
            Self::Bicubic => "Bicubic - High quality, smooth (recommended)",
            Self::Area => "Area - Good for downsampling",
            Self::NearestExact => "Nearest Neighbor Exact - Newer nearest neighbor algorithm",
        }
    }
}

impl FromStr for ResampleMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            MODE_NEAREST => Ok(Self::Nearest),
            MODE_BILINEAR => Ok(Self::Bilinear),
            MODE_BICUBIC => Ok(Self::Bicubic),
            MODE_AREA => Ok(Self::Area),
            MODE_NEAREST_EXACT => Ok(Self::NearestExact),
            _ => Err(ValidationError::InvalidResampleMode(s.to_string())),
        }
    }
}

impl fmt::Display for ResampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
