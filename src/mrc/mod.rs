pub mod compositor;
pub mod encoder;
pub mod filters;
pub mod jpeg;
pub mod separator;

use image::{DynamicImage, GrayImage};

/// Page placement in PDF user space (points, 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageBounds {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PageBounds {
    /// Bounds for a raster of `width_px` x `height_px` scanned at `dpi`.
    pub fn from_pixels(width_px: u32, height_px: u32, dpi: u32) -> Self {
        let dpi = dpi.max(1) as f32;
        PageBounds {
            x: 0.0,
            y: 0.0,
            width: width_px as f32 * 72.0 / dpi,
            height: height_px as f32 * 72.0 / dpi,
        }
    }
}

/// One page read from a source document.
#[derive(Debug, Clone)]
pub struct Page {
    /// 0-based.
    pub index: usize,
    pub image: DynamicImage,
    pub bounds: PageBounds,
}

impl Page {
    pub fn new(index: usize, image: DynamicImage, bounds: PageBounds) -> Self {
        Page {
            index,
            image,
            bounds,
        }
    }

    /// Horizontal scan resolution implied by the raster width and the page box.
    pub fn effective_dpi(&self) -> f32 {
        effective_dpi(self.image.width(), &self.bounds)
    }
}

pub(crate) fn effective_dpi(width_px: u32, bounds: &PageBounds) -> f32 {
    if bounds.width > 0.0 && width_px > 0 {
        width_px as f32 * 72.0 / bounds.width
    } else {
        72.0
    }
}

/// Foreground/background split of a single page.
#[derive(Debug, Clone)]
pub struct LayerSet {
    pub page_index: usize,
    pub bounds: PageBounds,
    /// High-contrast text mask; dark pixels are text.
    pub foreground: GrayImage,
    /// Blurred, colour-preserving background at the page's pixel extent.
    pub background: DynamicImage,
    /// Fraction of sampled mask pixels classified as text, in `[0, 1]`.
    pub text_coverage: f32,
    /// Transforms that were replaced by an identity pass-through.
    pub fallbacks: Vec<String>,
}

impl LayerSet {
    pub fn is_degraded(&self) -> bool {
        !self.fallbacks.is_empty()
    }

    pub fn source_dpi(&self) -> f32 {
        effective_dpi(self.foreground.width(), &self.bounds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Baseline JPEG; `color` false means single-channel.
    Jpeg { color: bool },
    /// zlib-compressed 8-bit grayscale samples.
    FlateGray,
}

#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub codec: Codec,
}

#[derive(Debug, Clone)]
pub enum EncodedLayers {
    Mrc {
        foreground: EncodedImage,
        background: EncodedImage,
    },
    Flat(EncodedImage),
}

#[derive(Debug, Clone)]
pub struct EncodedPage {
    pub index: usize,
    pub bounds: PageBounds,
    pub text_coverage: Option<f32>,
    pub layers: EncodedLayers,
}

impl EncodedPage {
    pub fn byte_len(&self) -> usize {
        match &self.layers {
            EncodedLayers::Mrc {
                foreground,
                background,
            } => foreground.data.len() + background.data.len(),
            EncodedLayers::Flat(image) => image.data.len(),
        }
    }
}

/// What the scheduler hands to a document sink for one page.
#[derive(Debug, Clone)]
pub enum PageOutput {
    Encoded(EncodedPage),
    /// Keep the source page unmodified.
    Original(usize),
}

impl PageOutput {
    pub fn index(&self) -> usize {
        match self {
            PageOutput::Encoded(page) => page.index,
            PageOutput::Original(index) => *index,
        }
    }
}
