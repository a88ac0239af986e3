// 画像XObjectのメタデータ読み取りとDynamicImageへのデコード。

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use lopdf::Object;

use crate::error::SqueezeError;

/// 画像XObjectのメタデータ。
#[derive(Debug, Clone)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub bits_per_component: u8,
    pub color_space: String,
    pub filter: Option<String>,
    pub image_mask: bool,
}

impl ImageMeta {
    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// XObjectストリームの辞書から画像メタデータを読み取る。
pub fn read_image_meta(stream: &lopdf::Stream) -> crate::error::Result<ImageMeta> {
    let dict = &stream.dict;

    let width = dict_get_u32(dict, b"Width")?;
    let height = dict_get_u32(dict, b"Height")?;
    let bits_per_component = match dict.get(b"BitsPerComponent") {
        Ok(_) => dict_get_u32(dict, b"BitsPerComponent")? as u8,
        Err(_) => 8,
    };

    // Indexed / ICCBased などの配列は先頭のファミリー名で扱う
    let color_space = match dict.get(b"ColorSpace") {
        Ok(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
        Ok(Object::Array(arr)) => match arr.first() {
            Some(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
            _ => "Unknown".to_string(),
        },
        _ => "DeviceRGB".to_string(),
    };

    let filter = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => Some(String::from_utf8_lossy(name).to_string()),
        Ok(Object::Array(arr)) if arr.len() == 1 => match &arr[0] {
            Object::Name(name) => Some(String::from_utf8_lossy(name).to_string()),
            _ => None,
        },
        Ok(Object::Array(arr)) if arr.len() > 1 => Some("Chained".to_string()),
        _ => None,
    };

    let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));

    Ok(ImageMeta {
        width,
        height,
        bits_per_component,
        color_space,
        filter,
        image_mask,
    })
}

/// `u32` に収まる必要がある整数値を辞書から取得する。
fn dict_get_u32(dict: &lopdf::Dictionary, key: &[u8]) -> crate::error::Result<u32> {
    match dict.get(key) {
        Ok(Object::Integer(i)) => u32::try_from(*i).map_err(|_| {
            SqueezeError::pdf_read(format!(
                "Value out of u32 range for {:?}: {}",
                String::from_utf8_lossy(key),
                i
            ))
        }),
        Ok(Object::Real(f)) if *f >= 0.0 && *f <= u32::MAX as f32 => Ok(*f as u32),
        Ok(other) => Err(SqueezeError::pdf_read(format!(
            "Expected integer for {:?}, got {:?}",
            String::from_utf8_lossy(key),
            other
        ))),
        Err(_) => Err(SqueezeError::pdf_read(format!(
            "Missing required key: {:?}",
            String::from_utf8_lossy(key),
        ))),
    }
}

/// 画像XObjectをデコードする。
///
/// 対応形式:
/// - DCTDecode (JPEG)
/// - FlateDecode および非圧縮サンプル: 8bpc の DeviceRGB/DeviceGray/DeviceCMYK、
///   1bpc の DeviceGray
pub fn decode_image_stream(
    stream: &lopdf::Stream,
    meta: &ImageMeta,
) -> crate::error::Result<DynamicImage> {
    match meta.filter.as_deref() {
        Some("DCTDecode") => decode_jpeg(&stream.content),
        Some("FlateDecode") => {
            let raw = stream
                .decompressed_content()
                .map_err(|e| SqueezeError::invalid_input(format!("FlateDecode error: {e}")))?;
            decode_raw(&raw, meta)
        }
        None => decode_raw(&stream.content, meta),
        Some(other) => Err(SqueezeError::invalid_input(format!(
            "Unsupported image filter: {}",
            other
        ))),
    }
}

fn decode_jpeg(data: &[u8]) -> crate::error::Result<DynamicImage> {
    image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
        .map_err(|e| SqueezeError::invalid_input(format!("JPEG decode error: {}", e)))
}

fn expect_len(data: &[u8], expected: usize, what: &str) -> crate::error::Result<()> {
    if data.len() < expected {
        return Err(SqueezeError::invalid_input(format!(
            "{what} data too short: expected {}, got {}",
            expected,
            data.len()
        )));
    }
    Ok(())
}

/// フィルタ適用前の生サンプルからDynamicImageを組み立てる。
fn decode_raw(data: &[u8], meta: &ImageMeta) -> crate::error::Result<DynamicImage> {
    let w = meta.width;
    let h = meta.height;
    let pixels = (w as usize) * (h as usize);

    match (meta.color_space.as_str(), meta.bits_per_component) {
        ("DeviceRGB", 8) => {
            expect_len(data, pixels * 3, "RGB")?;
            let img = RgbImage::from_raw(w, h, data[..pixels * 3].to_vec())
                .ok_or_else(|| SqueezeError::invalid_input("Failed to build RGB image"))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        ("DeviceGray", 8) => {
            expect_len(data, pixels, "Gray")?;
            let img = GrayImage::from_raw(w, h, data[..pixels].to_vec())
                .ok_or_else(|| SqueezeError::invalid_input("Failed to build Gray image"))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        ("DeviceCMYK", 8) => {
            expect_len(data, pixels * 4, "CMYK")?;
            let img = RgbImage::from_fn(w, h, |x, y| {
                let o = ((y as usize) * (w as usize) + x as usize) * 4;
                let k = data[o + 3] as u16;
                let channel = |c: u8| (255 - (c as u16 + k).min(255)) as u8;
                Rgb([channel(data[o]), channel(data[o + 1]), channel(data[o + 2])])
            });
            Ok(DynamicImage::ImageRgb8(img))
        }
        ("DeviceGray", 1) => {
            // 各行はバイト境界までパディングされる。0 = 黒
            let row_bytes = (w as usize).div_ceil(8);
            expect_len(data, row_bytes * h as usize, "1-bit Gray")?;
            let img = GrayImage::from_fn(w, h, |x, y| {
                let byte = data[y as usize * row_bytes + (x as usize) / 8];
                let bit = (byte >> (7 - (x % 8))) & 1;
                Luma([if bit == 1 { 255 } else { 0 }])
            });
            Ok(DynamicImage::ImageLuma8(img))
        }
        (cs, bpc) => Err(SqueezeError::invalid_input(format!(
            "Unsupported color space / BPC combination: {} / {}",
            cs, bpc
        ))),
    }
}
