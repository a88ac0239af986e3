use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Encoder parameters for one compression run.
///
/// Presets hand out frozen instances of this value; the encoder only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// Background fidelity in `[0, 1]`.
    pub quality: f32,
    pub target_resolution_dpi: u32,
    /// Stronger background blur.
    pub aggressive_mode: bool,
    pub use_layer_separation: bool,
    /// Floor for background downscaling.
    pub min_image_dpi: u32,
    /// Choose background scale/quality from text coverage instead of the
    /// fixed values above.
    pub adaptive_background: bool,
}

impl CompressionConfig {
    /// JPEG quality (1-100) derived from `quality`.
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality.clamp(0.0, 1.0) * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

/// Named size/fidelity trade-off points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Id,
    Archive,
    Smart,
    Document,
    Receipt,
}

const ID: CompressionConfig = CompressionConfig {
    quality: 0.85,
    target_resolution_dpi: 300,
    aggressive_mode: false,
    use_layer_separation: true,
    min_image_dpi: 200,
    adaptive_background: false,
};

const ARCHIVE: CompressionConfig = CompressionConfig {
    quality: 0.70,
    target_resolution_dpi: 200,
    aggressive_mode: false,
    use_layer_separation: true,
    min_image_dpi: 150,
    adaptive_background: false,
};

const SMART: CompressionConfig = CompressionConfig {
    quality: 0.60,
    target_resolution_dpi: 150,
    aggressive_mode: false,
    use_layer_separation: true,
    min_image_dpi: 120,
    adaptive_background: true,
};

const DOCUMENT: CompressionConfig = CompressionConfig {
    quality: 0.50,
    target_resolution_dpi: 150,
    aggressive_mode: true,
    use_layer_separation: true,
    min_image_dpi: 100,
    adaptive_background: false,
};

const RECEIPT: CompressionConfig = CompressionConfig {
    quality: 0.40,
    target_resolution_dpi: 120,
    aggressive_mode: true,
    use_layer_separation: true,
    min_image_dpi: 72,
    adaptive_background: false,
};

impl Preset {
    /// Every preset, most expensive first.
    pub const ALL: [Preset; 5] = [
        Preset::Id,
        Preset::Archive,
        Preset::Smart,
        Preset::Document,
        Preset::Receipt,
    ];

    pub fn config(self) -> CompressionConfig {
        match self {
            Preset::Id => ID,
            Preset::Archive => ARCHIVE,
            Preset::Smart => SMART,
            Preset::Document => DOCUMENT,
            Preset::Receipt => RECEIPT,
        }
    }

    /// The next cheaper preset. `Receipt` is the floor and maps to itself.
    pub fn degraded(self) -> Preset {
        match self {
            Preset::Id => Preset::Archive,
            Preset::Archive => Preset::Smart,
            Preset::Smart => Preset::Document,
            Preset::Document => Preset::Receipt,
            Preset::Receipt => Preset::Receipt,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Preset::Id => "id",
            Preset::Archive => "archive",
            Preset::Smart => "smart",
            Preset::Document => "document",
            Preset::Receipt => "receipt",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = crate::error::SqueezeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.name() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| crate::error::SqueezeError::config(format!("Unknown preset: '{s}'")))
    }
}
