// Page raster -> foreground text mask + blurred background + text coverage.

use std::sync::Arc;

use image::{DynamicImage, GrayImage, imageops::FilterType};
use serde::Deserialize;
use tracing::{debug, warn};

use super::filters::{FilterSpec, ProcessingContext};
use super::{LayerSet, Page};
use crate::config::preset::CompressionConfig;

/// Upper bound on mask pixels inspected for `text_coverage`.
pub const MAX_COVERAGE_SAMPLES: usize = 10_000;

/// Luma below this counts as text when sampling coverage.
pub const COVERAGE_DARK_CUTOFF: u8 = 128;

/// Tunables for the separation filters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SeparatorParams {
    pub denoise_radius: u32,
    pub sharpen_sigma: f32,
    pub sharpen_amount: f32,
    pub contrast_boost: f32,
    pub binarize_gain: f32,
    pub brightness_shift: i32,
    pub blur_sigma: f32,
    pub blur_sigma_aggressive: f32,
    pub mask_contrast: f32,
    pub mask_sharpen_sigma: f32,
    pub mask_sharpen_amount: f32,
}

impl Default for SeparatorParams {
    fn default() -> Self {
        SeparatorParams {
            denoise_radius: 1,
            sharpen_sigma: 1.0,
            sharpen_amount: 1.5,
            contrast_boost: 30.0,
            binarize_gain: 8.0,
            brightness_shift: 20,
            blur_sigma: 10.0,
            blur_sigma_aggressive: 20.0,
            mask_contrast: 20.0,
            mask_sharpen_sigma: 0.8,
            mask_sharpen_amount: 1.0,
        }
    }
}

pub struct LayerSeparator {
    context: Arc<ProcessingContext>,
    params: SeparatorParams,
}

impl LayerSeparator {
    pub fn new(context: Arc<ProcessingContext>, params: SeparatorParams) -> Self {
        Self { context, params }
    }

    pub fn params(&self) -> &SeparatorParams {
        &self.params
    }

    /// Split `page` into layers. Never fails: any transform that cannot be
    /// built or applied is skipped and recorded in `LayerSet::fallbacks`.
    pub fn separate(&self, page: &Page, config: &CompressionConfig) -> LayerSet {
        let p = &self.params;
        let mut fallbacks = Vec::new();
        let (width, height) = (page.image.width(), page.image.height());

        // 1. denoise
        let denoised = self.run(
            FilterSpec::Median {
                radius: p.denoise_radius,
            },
            &page.image,
            &mut fallbacks,
        );

        // 2. foreground mask
        let mut mask = self.run(FilterSpec::Grayscale, &denoised, &mut fallbacks);
        mask = self.run(
            FilterSpec::Sharpen {
                sigma: p.sharpen_sigma,
                amount: p.sharpen_amount,
            },
            &mask,
            &mut fallbacks,
        );
        mask = self.run(
            FilterSpec::Contrast {
                amount: p.contrast_boost,
            },
            &mask,
            &mut fallbacks,
        );
        mask = self.run(
            FilterSpec::Binarize {
                gain: p.binarize_gain,
                shift: p.brightness_shift,
            },
            &mask,
            &mut fallbacks,
        );

        // 3. background
        let sigma = if config.aggressive_mode {
            p.blur_sigma_aggressive
        } else {
            p.blur_sigma
        };
        let blurred = self.run(FilterSpec::GaussianBlur { sigma }, &denoised, &mut fallbacks);
        let background = fit_to_extent(blurred, width, height);

        // 4. crispen mask edges
        mask = self.run(
            FilterSpec::Contrast {
                amount: p.mask_contrast,
            },
            &mask,
            &mut fallbacks,
        );
        mask = self.run(
            FilterSpec::Sharpen {
                sigma: p.mask_sharpen_sigma,
                amount: p.mask_sharpen_amount,
            },
            &mask,
            &mut fallbacks,
        );
        let foreground = fit_to_extent(mask, width, height).to_luma8();

        // 5. coverage
        let text_coverage = sample_text_coverage(&foreground);

        if !fallbacks.is_empty() {
            warn!(
                page = page.index,
                fallbacks = ?fallbacks,
                "layer separation ran with identity fallbacks"
            );
        }
        debug!(page = page.index, text_coverage, "page separated");

        LayerSet {
            page_index: page.index,
            bounds: page.bounds,
            foreground,
            background,
            text_coverage,
            fallbacks,
        }
    }

    fn run(
        &self,
        spec: FilterSpec,
        image: &DynamicImage,
        fallbacks: &mut Vec<String>,
    ) -> DynamicImage {
        let cached = self.context.filter(&spec);
        if cached.fallback {
            fallbacks.push(spec.key());
        }
        match cached.filter.apply(image) {
            Ok(out) => out,
            Err(e) => {
                warn!(filter = %spec.key(), error = %e, "filter failed, passing image through");
                fallbacks.push(spec.key());
                image.clone()
            }
        }
    }
}

/// Crop (or, if it shrank, stretch) `image` back to `width` x `height`.
fn fit_to_extent(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() == width && image.height() == height {
        image
    } else if image.width() >= width && image.height() >= height {
        image.crop_imm(0, 0, width, height)
    } else {
        image.resize_exact(width, height, FilterType::Triangle)
    }
}

/// Fraction of dark pixels in `mask`, sampled at a fixed stride over the
/// row-major pixel sequence so at most [`MAX_COVERAGE_SAMPLES`] are read.
pub fn sample_text_coverage(mask: &GrayImage) -> f32 {
    let raw = mask.as_raw();
    let total = raw.len();
    if total == 0 {
        return 0.0;
    }
    let stride = total.div_ceil(MAX_COVERAGE_SAMPLES).max(1);

    let mut sampled = 0usize;
    let mut dark = 0usize;
    for &v in raw.iter().step_by(stride) {
        sampled += 1;
        if v < COVERAGE_DARK_CUTOFF {
            dark += 1;
        }
    }
    dark as f32 / sampled as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_coverage_sample_count_is_bounded() {
        // 1000 x 1000 = 1,000,000 pixels -> stride 100 -> 10,000 samples.
        let mask = GrayImage::from_pixel(1000, 1000, Luma([0]));
        assert_eq!(sample_text_coverage(&mask), 1.0);

        let raw_len = mask.as_raw().len();
        let stride = raw_len.div_ceil(MAX_COVERAGE_SAMPLES);
        assert!(raw_len.div_ceil(stride) <= MAX_COVERAGE_SAMPLES);
    }

    #[test]
    fn test_coverage_of_empty_mask_is_zero() {
        assert_eq!(sample_text_coverage(&GrayImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_fit_to_extent_crops_larger_image() {
        let img = DynamicImage::new_luma8(12, 10);
        let fitted = fit_to_extent(img, 8, 6);
        assert_eq!((fitted.width(), fitted.height()), (8, 6));
    }
}
