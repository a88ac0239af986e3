// LayerSet -> encoded page bytes.
//
// Foreground: lossless zlib grayscale at full resolution.
// Background: downscaled JPEG, (scale, quality) from the preset or from
// text coverage.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use tracing::debug;

use super::jpeg::encode_jpeg;
use super::{Codec, EncodedImage, EncodedLayers, EncodedPage, LayerSet, Page, effective_dpi};
use crate::config::preset::CompressionConfig;
use crate::error::SqueezeError;

/// Downscale factor and JPEG quality for a background layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackgroundParams {
    pub scale: f32,
    pub quality: u8,
}

/// Coverage above this gets the most aggressive background treatment.
pub const HIGH_COVERAGE: f32 = 0.3;
/// Coverage below this gets the mildest background treatment.
pub const LOW_COVERAGE: f32 = 0.1;

/// Text-heavy pages tolerate a smaller, blurrier background.
pub fn adaptive_background_params(text_coverage: f32) -> BackgroundParams {
    if text_coverage > HIGH_COVERAGE {
        BackgroundParams {
            scale: 0.25,
            quality: 30,
        }
    } else if text_coverage >= LOW_COVERAGE {
        BackgroundParams {
            scale: 0.35,
            quality: 45,
        }
    } else {
        BackgroundParams {
            scale: 0.5,
            quality: 60,
        }
    }
}

/// Scale toward `target_resolution_dpi`, never below `min_image_dpi` and
/// never up.
pub fn fixed_background_params(source_dpi: f32, config: &CompressionConfig) -> BackgroundParams {
    let source_dpi = source_dpi.max(1.0);
    let target = config.target_resolution_dpi as f32 / source_dpi;
    let floor = config.min_image_dpi as f32 / source_dpi;
    BackgroundParams {
        scale: target.max(floor).clamp(0.01, 1.0),
        quality: config.jpeg_quality(),
    }
}

/// Resize by `scale`, keeping at least one pixel per axis.
pub(crate) fn scale_image(image: &DynamicImage, scale: f32) -> DynamicImage {
    if scale >= 1.0 {
        return image.clone();
    }
    let w = ((image.width() as f32 * scale).round() as u32).max(1);
    let h = ((image.height() as f32 * scale).round() as u32).max(1);
    image.resize_exact(w, h, FilterType::Triangle)
}

/// Lossless zlib stream of 8-bit gray samples (PDF `FlateDecode`).
pub fn encode_foreground(mask: &GrayImage) -> crate::error::Result<EncodedImage> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(mask.as_raw())?;
    let data = encoder
        .finish()
        .map_err(|e| SqueezeError::encode(format!("foreground deflate failed: {e}")))?;
    Ok(EncodedImage {
        data,
        width: mask.width(),
        height: mask.height(),
        codec: Codec::FlateGray,
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AdaptiveEncoder;

impl AdaptiveEncoder {
    pub fn new() -> Self {
        AdaptiveEncoder
    }

    pub fn background_params(&self, layers: &LayerSet, config: &CompressionConfig) -> BackgroundParams {
        if config.adaptive_background {
            adaptive_background_params(layers.text_coverage)
        } else {
            fixed_background_params(layers.source_dpi(), config)
        }
    }

    /// Encode both layers of a page.
    pub fn encode(
        &self,
        layers: &LayerSet,
        config: &CompressionConfig,
    ) -> crate::error::Result<EncodedPage> {
        let foreground = encode_foreground(&layers.foreground)?;

        let params = self.background_params(layers, config);
        let scaled = scale_image(&layers.background, params.scale);
        let background = encode_jpeg(&scaled, params.quality)?;

        debug!(
            page = layers.page_index,
            coverage = layers.text_coverage,
            scale = params.scale,
            quality = params.quality,
            fg_bytes = foreground.data.len(),
            bg_bytes = background.data.len(),
            "page layers encoded"
        );

        Ok(EncodedPage {
            index: layers.page_index,
            bounds: layers.bounds,
            text_coverage: Some(layers.text_coverage),
            layers: EncodedLayers::Mrc {
                foreground,
                background,
            },
        })
    }

    /// Encode the whole page as a single JPEG, for configs that skip layer
    /// separation.
    pub fn encode_flat(
        &self,
        page: &Page,
        config: &CompressionConfig,
    ) -> crate::error::Result<EncodedPage> {
        let params = fixed_background_params(effective_dpi(page.image.width(), &page.bounds), config);
        let image = encode_jpeg(&scale_image(&page.image, params.scale), params.quality)?;
        Ok(EncodedPage {
            index: page.index,
            bounds: page.bounds,
            text_coverage: None,
            layers: EncodedLayers::Flat(image),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::preset::Preset;

    #[test]
    fn test_fixed_params_respect_min_dpi() {
        let config = Preset::Receipt.config();
        // 600 dpi scan, target 120, floor 72 -> 0.2
        let params = fixed_background_params(600.0, &config);
        assert!((params.scale - 0.2).abs() < 1e-6);
        assert_eq!(params.quality, 40);
    }

    #[test]
    fn test_fixed_params_never_upscale() {
        let config = Preset::Id.config();
        let params = fixed_background_params(150.0, &config);
        assert_eq!(params.scale, 1.0);
    }

    #[test]
    fn test_scale_image_keeps_one_pixel() {
        let img = DynamicImage::new_rgb8(3, 3);
        let scaled = scale_image(&img, 0.01);
        assert_eq!((scaled.width(), scaled.height()), (1, 1));
    }
}
