// Post-hoc comparison of a compression result against its original.
//
// Size regressions roll back (the candidate file is removed); quality
// regressions are reported but the candidate is kept.

use std::fmt;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::preset::Preset;
use crate::error::SqueezeError;
use crate::pdf::reader::page_pixel_counts;

/// Minimum reduction, as `1 / MINIMAL_GAIN_DIVISOR` of the original, for a
/// full success (5%).
pub const MINIMAL_GAIN_DIVISOR: u64 = 20;

/// Candidate pixel count below `original / PIXEL_LOSS_DIVISOR` is a loss.
pub const PIXEL_LOSS_DIVISOR: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    Pdf,
    Raster(ImageFormat),
    Other,
}

impl ArtifactFormat {
    fn detect(head: &[u8]) -> Self {
        if head.starts_with(b"%PDF-") {
            ArtifactFormat::Pdf
        } else if let Ok(format) = image::guess_format(head) {
            ArtifactFormat::Raster(format)
        } else {
            ArtifactFormat::Other
        }
    }

    pub fn is_visual(&self) -> bool {
        !matches!(self, ArtifactFormat::Other)
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactFormat::Pdf => f.write_str("pdf"),
            ArtifactFormat::Raster(format) => {
                let ext = format.extensions_str().first().copied().unwrap_or("image");
                f.write_str(ext)
            }
            ArtifactFormat::Other => f.write_str("other"),
        }
    }
}

impl Serialize for ArtifactFormat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A file on disk, with the size and format it had when opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub size: u64,
    pub format: ArtifactFormat,
}

impl Artifact {
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SqueezeError::from_open_error(path, e))?;
        Ok(Self::from_bytes(path, &bytes))
    }

    /// Describe `bytes` as the content of `path` without touching the disk.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            size: bytes.len() as u64,
            format: ArtifactFormat::detect(bytes),
        }
    }

    /// Pixels carried by the artifact, when it can be measured.
    ///
    /// Rasters report their decoded dimensions, read with the format detected
    /// from the content; PDFs the sum over pages of each page's largest image.
    pub fn pixel_count(&self) -> Option<u64> {
        match self.format {
            ArtifactFormat::Raster(format) => {
                let file = std::fs::File::open(&self.path).ok()?;
                let mut reader = image::ImageReader::new(std::io::BufReader::new(file));
                reader.set_format(format);
                let (w, h) = reader.into_dimensions().ok()?;
                Some(w as u64 * h as u64)
            }
            ArtifactFormat::Pdf => {
                let doc = lopdf::Document::load(&self.path).ok()?;
                let total: u64 = page_pixel_counts(&doc).ok()?.iter().sum();
                (total > 0).then_some(total)
            }
            ArtifactFormat::Other => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Improvement {
    pub original_size: u64,
    pub compressed_size: u64,
    pub bytes_saved: u64,
    /// Whole percent, truncated.
    pub percentage_reduction: u32,
}

impl Improvement {
    /// Only meaningful when `compressed_size < original_size`.
    pub fn between(original_size: u64, compressed_size: u64) -> Self {
        let bytes_saved = original_size.saturating_sub(compressed_size);
        let percentage_reduction = if original_size == 0 {
            0
        } else {
            (bytes_saved as u128 * 100 / original_size as u128) as u32
        };
        Self {
            original_size,
            compressed_size,
            bytes_saved,
            percentage_reduction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoImprovementReason {
    FileBecameLarger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuaranteeWarning {
    /// Less than 5% smaller.
    MinimalGain,
    /// Candidate holds under half the original's pixels.
    PixelLoss,
    /// Original was measurable, candidate was not.
    UnverifiableCandidate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuaranteeResult {
    Success {
        artifact: Artifact,
        improvement: Improvement,
    },
    NoImprovement {
        original: Artifact,
        reason: NoImprovementReason,
    },
    PartialSuccess {
        artifact: Artifact,
        warning: GuaranteeWarning,
        improvement: Improvement,
    },
    QualityCompromised {
        artifact: Artifact,
        warning: GuaranteeWarning,
        improvement: Improvement,
    },
}

impl GuaranteeResult {
    /// The file a consumer should use.
    pub fn artifact(&self) -> &Artifact {
        match self {
            GuaranteeResult::Success { artifact, .. }
            | GuaranteeResult::PartialSuccess { artifact, .. }
            | GuaranteeResult::QualityCompromised { artifact, .. } => artifact,
            GuaranteeResult::NoImprovement { original, .. } => original,
        }
    }

    pub fn improvement(&self) -> Option<&Improvement> {
        match self {
            GuaranteeResult::Success { improvement, .. }
            | GuaranteeResult::PartialSuccess { improvement, .. }
            | GuaranteeResult::QualityCompromised { improvement, .. } => Some(improvement),
            GuaranteeResult::NoImprovement { .. } => None,
        }
    }

    pub fn warning(&self) -> Option<GuaranteeWarning> {
        match self {
            GuaranteeResult::PartialSuccess { warning, .. }
            | GuaranteeResult::QualityCompromised { warning, .. } => Some(*warning),
            _ => None,
        }
    }

    pub fn outcome(&self) -> &'static str {
        match self {
            GuaranteeResult::Success { .. } => "success",
            GuaranteeResult::NoImprovement { .. } => "no_improvement",
            GuaranteeResult::PartialSuccess { .. } => "partial_success",
            GuaranteeResult::QualityCompromised { .. } => "quality_compromised",
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QualityGuarantee;

impl QualityGuarantee {
    pub fn new() -> Self {
        Self
    }

    /// Decide what to keep. Never fails; when the candidate is not smaller
    /// it is deleted from disk and the original is returned.
    pub fn verify(&self, original: &Artifact, candidate: &Artifact, preset: Preset) -> GuaranteeResult {
        if candidate.size >= original.size {
            warn!(
                original = original.size,
                candidate = candidate.size,
                %preset,
                "compressed file is not smaller, keeping original"
            );
            if candidate.path != original.path {
                remove_candidate(&candidate.path);
            }
            return GuaranteeResult::NoImprovement {
                original: original.clone(),
                reason: NoImprovementReason::FileBecameLarger,
            };
        }

        let improvement = Improvement::between(original.size, candidate.size);
        if improvement.bytes_saved * MINIMAL_GAIN_DIVISOR < original.size {
            return GuaranteeResult::PartialSuccess {
                artifact: candidate.clone(),
                warning: GuaranteeWarning::MinimalGain,
                improvement,
            };
        }

        if original.format.is_visual()
            && let Some(warning) = pixel_check(original, candidate)
        {
            warn!(?warning, %preset, path = %candidate.path.display(), "quality compromised");
            return GuaranteeResult::QualityCompromised {
                artifact: candidate.clone(),
                warning,
                improvement,
            };
        }

        debug!(
            saved = improvement.bytes_saved,
            percent = improvement.percentage_reduction,
            "compression verified"
        );
        GuaranteeResult::Success {
            artifact: candidate.clone(),
            improvement,
        }
    }
}

fn pixel_check(original: &Artifact, candidate: &Artifact) -> Option<GuaranteeWarning> {
    let original_pixels = original.pixel_count()?;
    match candidate.pixel_count() {
        Some(pixels) if pixels * PIXEL_LOSS_DIVISOR < original_pixels => {
            Some(GuaranteeWarning::PixelLoss)
        }
        Some(_) => None,
        None => Some(GuaranteeWarning::UnverifiableCandidate),
    }
}

fn remove_candidate(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove candidate"),
    }
}
