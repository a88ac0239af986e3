// Flattened output: multiply the full-resolution text mask over the reduced
// background and run one final lossy pass.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Rgb, RgbImage};

use super::encoder::{AdaptiveEncoder, scale_image};
use super::jpeg::encode_jpeg;
use super::{EncodedLayers, EncodedPage, LayerSet};
use crate::config::preset::CompressionConfig;

/// Multiply-blend `layers.foreground` over `layers.background`.
///
/// White mask pixels leave the background untouched, black ones produce
/// black; the result has the mask's extent.
pub fn blend_layers(layers: &LayerSet) -> DynamicImage {
    multiply(&layers.foreground, &layers.background)
}

fn multiply(mask: &GrayImage, background: &DynamicImage) -> DynamicImage {
    let (w, h) = mask.dimensions();
    let rgb = if background.width() == w && background.height() == h {
        background.to_rgb8()
    } else {
        background.resize_exact(w, h, FilterType::Triangle).to_rgb8()
    };

    let out = RgbImage::from_fn(w, h, |x, y| {
        let m = mask.get_pixel(x, y).0[0] as u16;
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        let mul = |c: u8| ((c as u16 * m + 127) / 255) as u8;
        Rgb([mul(r), mul(g), mul(b)])
    });

    if background.color().has_color() {
        DynamicImage::ImageRgb8(out)
    } else {
        DynamicImage::ImageLuma8(DynamicImage::ImageRgb8(out).to_luma8())
    }
}

/// Blend and encode a page as a single JPEG at the mask's resolution.
///
/// Only the background is reduced, with the same parameters the layered
/// encoder would pick (coverage-adaptive or fixed); the final pass uses the
/// preset's quality.
pub fn recompose(
    layers: &LayerSet,
    config: &CompressionConfig,
) -> crate::error::Result<EncodedPage> {
    let params = AdaptiveEncoder::new().background_params(layers, config);
    let background = scale_image(&layers.background, params.scale);
    let blended = multiply(&layers.foreground, &background);
    let image = encode_jpeg(&blended, config.jpeg_quality())?;

    Ok(EncodedPage {
        index: layers.page_index,
        bounds: layers.bounds,
        text_coverage: Some(layers.text_coverage),
        layers: EncodedLayers::Flat(image),
    })
}
