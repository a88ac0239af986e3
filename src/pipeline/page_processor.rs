// Per-page work: separate -> encode (or recompose).

use crate::config::preset::CompressionConfig;
use crate::mrc::compositor::recompose;
use crate::mrc::encoder::AdaptiveEncoder;
use crate::mrc::separator::LayerSeparator;
use crate::mrc::{EncodedPage, Page};

/// Turns one source page into encoded output. Errors are page failures; the
/// scheduler substitutes the original page for them.
pub trait PageTransformer: Send + Sync {
    fn transform(&self, page: &Page, config: &CompressionConfig)
    -> crate::error::Result<EncodedPage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputLayout {
    /// Separate foreground/background images (PDF pages).
    Layered,
    /// One blended image per page (raster outputs).
    Flattened,
}

pub struct MrcTransformer {
    separator: LayerSeparator,
    encoder: AdaptiveEncoder,
    layout: OutputLayout,
}

impl MrcTransformer {
    pub fn new(separator: LayerSeparator, layout: OutputLayout) -> Self {
        Self {
            separator,
            encoder: AdaptiveEncoder::new(),
            layout,
        }
    }
}

impl PageTransformer for MrcTransformer {
    fn transform(
        &self,
        page: &Page,
        config: &CompressionConfig,
    ) -> crate::error::Result<EncodedPage> {
        if !config.use_layer_separation {
            return self.encoder.encode_flat(page, config);
        }

        // The layer set is dropped when this function returns.
        let layers = self.separator.separate(page, config);
        match self.layout {
            OutputLayout::Layered => self.encoder.encode(&layers, config),
            OutputLayout::Flattened => recompose(&layers, config),
        }
    }
}
