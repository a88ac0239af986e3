// Single raster image files as one-page documents.

use std::path::{Path, PathBuf};

use image::ImageFormat;

use super::{DocumentSink, PageSource};
use crate::error::SqueezeError;
use crate::mrc::{EncodedLayers, Page, PageBounds, PageOutput};

pub struct ImageSource {
    path: PathBuf,
    bytes: Vec<u8>,
    format: ImageFormat,
    assumed_dpi: u32,
}

impl ImageSource {
    pub fn open(path: impl AsRef<Path>, assumed_dpi: u32) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SqueezeError::from_open_error(path, e))?;
        Self::from_bytes(path, bytes, assumed_dpi)
    }

    pub fn from_bytes(
        path: impl Into<PathBuf>,
        bytes: Vec<u8>,
        assumed_dpi: u32,
    ) -> crate::error::Result<Self> {
        let path = path.into();
        if bytes.is_empty() {
            return Err(SqueezeError::invalid_input(format!(
                "{} is empty",
                path.display()
            )));
        }
        let format = image::guess_format(&bytes).map_err(|e| {
            SqueezeError::invalid_input(format!("{}: unrecognised image: {e}", path.display()))
        })?;
        Ok(Self {
            path,
            bytes,
            format,
            assumed_dpi,
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn original_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PageSource for ImageSource {
    fn page_count(&self) -> crate::error::Result<usize> {
        Ok(1)
    }

    fn page(&self, index: usize) -> crate::error::Result<Page> {
        if index != 0 {
            return Err(SqueezeError::invalid_input(format!(
                "{} has a single page, requested index {index}",
                self.path.display()
            )));
        }
        let image = image::load_from_memory_with_format(&self.bytes, self.format)?;
        let bounds = PageBounds::from_pixels(image.width(), image.height(), self.assumed_dpi);
        Ok(Page::new(0, image, bounds))
    }
}

/// Collects the flattened JPEG for a one-page raster document, or keeps the
/// original file bytes when the page was substituted.
pub struct ImageSink {
    original: Vec<u8>,
    output: Option<Vec<u8>>,
    appended: usize,
}

impl ImageSink {
    pub fn for_source(source: &ImageSource) -> Self {
        Self {
            original: source.original_bytes().to_vec(),
            output: None,
            appended: 0,
        }
    }
}

impl DocumentSink for ImageSink {
    fn append_page(&mut self, output: PageOutput) -> crate::error::Result<()> {
        if self.appended > 0 || output.index() != 0 {
            return Err(SqueezeError::pdf_write(format!(
                "raster output holds one page, got page {}",
                output.index()
            )));
        }
        self.output = match output {
            PageOutput::Original(_) => Some(self.original.clone()),
            PageOutput::Encoded(page) => match page.layers {
                EncodedLayers::Flat(image) => Some(image.data),
                EncodedLayers::Mrc { .. } => {
                    return Err(SqueezeError::encode(
                        "raster output needs a flattened page",
                    ));
                }
            },
        };
        self.appended += 1;
        Ok(())
    }

    fn pages_appended(&self) -> usize {
        self.appended
    }

    fn finish(&mut self) -> crate::error::Result<Vec<u8>> {
        self.output
            .take()
            .ok_or_else(|| SqueezeError::pdf_write("no page was appended"))
    }
}
