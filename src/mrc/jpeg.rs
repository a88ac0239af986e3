// image crate: background / flattened page -> JPEG bytes

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, RgbImage};

use super::{Codec, EncodedImage};
use crate::error::SqueezeError;

/// Encode `image` as JPEG at `quality` (1-100).
///
/// Colour images are written as RGB, everything else as single-channel
/// luma so grayscale scans carry no chroma.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> crate::error::Result<EncodedImage> {
    if !(1..=100).contains(&quality) {
        return Err(SqueezeError::encode(format!(
            "JPEG quality must be 1-100, got {}",
            quality
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(SqueezeError::encode("cannot JPEG-encode an empty image"));
    }

    let color = image.color().has_color();
    let data = if color {
        encode_rgb_to_jpeg(&image.to_rgb8(), quality)?
    } else {
        encode_gray_to_jpeg(&image.to_luma8(), quality)?
    };

    Ok(EncodedImage {
        data,
        width: image.width(),
        height: image.height(),
        codec: Codec::Jpeg { color },
    })
}

pub(crate) fn encode_rgb_to_jpeg(rgb: &RgbImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

pub(crate) fn encode_gray_to_jpeg(gray: &GrayImage, quality: u8) -> crate::error::Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    gray.write_with_encoder(encoder)?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_quality() {
        let img = DynamicImage::new_rgb8(4, 4);
        assert!(encode_jpeg(&img, 0).is_err());
        assert!(encode_jpeg(&img, 101).is_err());
    }

    #[test]
    fn test_gray_input_stays_single_channel() {
        let img = DynamicImage::new_luma8(8, 8);
        let encoded = encode_jpeg(&img, 50).unwrap();
        assert_eq!(encoded.codec, Codec::Jpeg { color: false });
        assert_eq!(&encoded.data[..2], &[0xFF, 0xD8]);
    }
}
