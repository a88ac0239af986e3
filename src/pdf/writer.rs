// 処理済みページを、エンコードしたレイヤーで元ドキュメント上に書き換える。
//
// 背景XObjectをページ全体に描画し、その上にグレーの前景をMultiplyで重ねる。
// マスクの白画素では背景がそのまま見える。置き換えなかったページは元のまま残す。

use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use tracing::debug;

use super::reader::PdfSource;
use crate::document::DocumentSink;
use crate::error::SqueezeError;
use crate::mrc::{Codec, EncodedImage, EncodedLayers, EncodedPage, PageBounds, PageOutput};

pub struct PdfSink {
    doc: Document,
    page_ids: Vec<ObjectId>,
    appended: usize,
}

impl PdfSink {
    /// 元ドキュメントのコピーから開始する。
    pub fn for_source(source: &PdfSource) -> Self {
        Self {
            doc: source.document().clone(),
            page_ids: source.page_ids().to_vec(),
            appended: 0,
        }
    }

    /// `image` の画像XObjectを追加し、そのオブジェクトIDを返す。
    pub fn add_image_xobject(&mut self, image: &EncodedImage) -> ObjectId {
        let (color_space, filter) = match image.codec {
            Codec::Jpeg { color: true } => ("DeviceRGB", "DCTDecode"),
            Codec::Jpeg { color: false } => ("DeviceGray", "DCTDecode"),
            Codec::FlateGray => ("DeviceGray", "FlateDecode"),
        };
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => image.width as i64,
            "Height" => image.height as i64,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => filter,
        };
        let stream = Stream::new(dict, image.data.clone()).with_compression(false);
        self.doc.add_object(Object::Stream(stream))
    }

    /// 各XObjectをページ全体に描画するコンテンツストリーム。
    ///
    /// `q w 0 0 h x y cm /Bg Do Q q /Mul gs w 0 0 h x y cm /Fg Do Q`
    pub fn build_content_stream(bounds: &PageBounds, layered: bool) -> Vec<u8> {
        let PageBounds {
            x,
            y,
            width,
            height,
        } = *bounds;
        let mut content = format!("q {width} 0 0 {height} {x} {y} cm /Bg Do Q");
        if layered {
            content.push_str(&format!(
                " q /Mul gs {width} 0 0 {height} {x} {y} cm /Fg Do Q"
            ));
        }
        content.into_bytes()
    }

    fn replace_page(&mut self, page_id: ObjectId, page: &EncodedPage) -> crate::error::Result<()> {
        let mut xobjects = lopdf::Dictionary::new();
        let mut resources = lopdf::Dictionary::new();

        let layered = match &page.layers {
            EncodedLayers::Mrc {
                foreground,
                background,
            } => {
                let bg_id = self.add_image_xobject(background);
                let fg_id = self.add_image_xobject(foreground);
                xobjects.set("Bg", Object::Reference(bg_id));
                xobjects.set("Fg", Object::Reference(fg_id));

                let gs_id = self.doc.add_object(dictionary! {
                    "Type" => "ExtGState",
                    "BM" => "Multiply",
                });
                resources.set(
                    "ExtGState",
                    Object::Dictionary(dictionary! { "Mul" => Object::Reference(gs_id) }),
                );
                true
            }
            EncodedLayers::Flat(image) => {
                let id = self.add_image_xobject(image);
                xobjects.set("Bg", Object::Reference(id));
                false
            }
        };
        resources.set("XObject", Object::Dictionary(xobjects));
        let resources_id = self.doc.add_object(Object::Dictionary(resources));

        let content = Self::build_content_stream(&page.bounds, layered);
        let content_id = self
            .doc
            .add_object(Object::Stream(Stream::new(dictionary! {}, content)));

        let page_dict = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| SqueezeError::pdf_write(e.to_string()))?;
        page_dict.set("Resources", Object::Reference(resources_id));
        page_dict.set("Contents", Object::Reference(content_id));
        Ok(())
    }
}

impl DocumentSink for PdfSink {
    fn append_page(&mut self, output: PageOutput) -> crate::error::Result<()> {
        let expected = self.appended;
        if output.index() != expected {
            return Err(SqueezeError::pdf_write(format!(
                "pages out of order: expected page {expected}, got {}",
                output.index()
            )));
        }
        let page_id = *self.page_ids.get(expected).ok_or_else(|| {
            SqueezeError::pdf_write(format!("page {expected} is beyond the source document"))
        })?;

        if let PageOutput::Encoded(page) = &output {
            self.replace_page(page_id, page)?;
            debug!(page = expected, bytes = page.byte_len(), "page rewritten");
        }
        self.appended += 1;
        Ok(())
    }

    fn pages_appended(&self) -> usize {
        self.appended
    }

    fn finish(&mut self) -> crate::error::Result<Vec<u8>> {
        if self.appended != self.page_ids.len() {
            return Err(SqueezeError::pdf_write(format!(
                "document incomplete: {} of {} pages appended",
                self.appended,
                self.page_ids.len()
            )));
        }

        // 置き換え済みのスキャン画像を削除し、新しいコンテンツストリームを圧縮
        self.doc.prune_objects();
        self.doc.compress();

        let mut buf = Vec::new();
        self.doc
            .save_to(&mut buf)
            .map_err(|e| SqueezeError::pdf_write(e.to_string()))?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_stream_layered() {
        let bounds = PageBounds {
            x: 0.0,
            y: 0.0,
            width: 612.0,
            height: 792.0,
        };
        let content = String::from_utf8(PdfSink::build_content_stream(&bounds, true)).unwrap();
        assert_eq!(
            content,
            "q 612 0 0 792 0 0 cm /Bg Do Q q /Mul gs 612 0 0 792 0 0 cm /Fg Do Q"
        );
    }

    #[test]
    fn test_content_stream_flat_has_no_blend() {
        let bounds = PageBounds {
            x: 10.0,
            y: 20.0,
            width: 100.5,
            height: 50.0,
        };
        let content = String::from_utf8(PdfSink::build_content_stream(&bounds, false)).unwrap();
        assert_eq!(content, "q 100.5 0 0 50 10 20 cm /Bg Do Q");
    }
}
