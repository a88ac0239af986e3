use std::path::{Path, PathBuf};

use lopdf::{Document, Object, ObjectId};

use super::content_stream::sole_xobject_placement;
use super::image_xobject::{ImageMeta, decode_image_stream, read_image_meta};
use crate::document::PageSource;
use crate::error::SqueezeError;
use crate::mrc::{Page, PageBounds};

/// 各ページにスキャン画像を持つPDF。
pub struct PdfSource {
    path: PathBuf,
    doc: Document,
    page_ids: Vec<ObjectId>,
}

impl PdfSource {
    pub fn open(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| SqueezeError::from_open_error(path, e))?;
        Self::from_bytes(path, &bytes)
    }

    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> crate::error::Result<Self> {
        let path = path.into();
        if bytes.is_empty() {
            return Err(SqueezeError::invalid_input(format!(
                "{} is empty",
                path.display()
            )));
        }

        let doc = match Document::load_mem(bytes) {
            Ok(doc) => doc,
            Err(_) if has_encrypt_marker(bytes) => return Err(SqueezeError::Encrypted),
            Err(e) => {
                return Err(SqueezeError::invalid_input(format!(
                    "{}: {e}",
                    path.display()
                )));
            }
        };
        if doc.trailer.get(b"Encrypt").is_ok() {
            return Err(SqueezeError::Encrypted);
        }

        let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        if page_ids.is_empty() {
            return Err(SqueezeError::invalid_input(format!(
                "{} has no pages",
                path.display()
            )));
        }

        Ok(Self {
            path,
            doc,
            page_ids,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 内部のlopdfドキュメント。
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn page_ids(&self) -> &[ObjectId] {
        &self.page_ids
    }

    fn page_id(&self, index: usize) -> crate::error::Result<ObjectId> {
        self.page_ids
            .get(index)
            .copied()
            .ok_or_else(|| SqueezeError::pdf_read(format!("page {} not found", index)))
    }

    /// ページ `index` のMediaBox。Parentからの継承も辿る。
    pub fn page_bounds(&self, index: usize) -> crate::error::Result<PageBounds> {
        page_bounds(&self.doc, self.page_id(index)?)
    }
}

fn has_encrypt_marker(bytes: &[u8]) -> bool {
    bytes.windows(8).any(|w| w == b"/Encrypt")
}

fn media_box(doc: &Document, dict: &lopdf::Dictionary) -> crate::error::Result<Vec<Object>> {
    if let Ok(obj) = dict.get(b"MediaBox") {
        let obj = match obj {
            Object::Reference(id) => doc.get_object(*id)?,
            other => other,
        };
        return Ok(obj.as_array()?.clone());
    }

    if let Ok(Object::Reference(parent_id)) = dict.get(b"Parent") {
        let parent_dict = doc.get_dictionary(*parent_id)?;
        return media_box(doc, parent_dict);
    }

    Err(SqueezeError::pdf_read("MediaBox not found"))
}

pub(crate) fn page_bounds(doc: &Document, page_id: ObjectId) -> crate::error::Result<PageBounds> {
    let page_dict = doc.get_dictionary(page_id)?;
    let media_box = media_box(doc, page_dict)?;
    if media_box.len() < 4 {
        return Err(SqueezeError::pdf_read("Invalid MediaBox"));
    }

    let to_f32 = |obj: &Object| -> crate::error::Result<f32> {
        match obj {
            Object::Integer(i) => Ok(*i as f32),
            Object::Real(f) => Ok(*f),
            _ => Err(SqueezeError::pdf_read("Invalid MediaBox value")),
        }
    };

    let x0 = to_f32(&media_box[0])?;
    let y0 = to_f32(&media_box[1])?;
    let x1 = to_f32(&media_box[2])?;
    let y1 = to_f32(&media_box[3])?;

    let width = (x1 - x0).abs();
    let height = (y1 - y0).abs();
    if width <= 0.0 || height <= 0.0 {
        return Err(SqueezeError::pdf_read(
            "Invalid MediaBox: non-positive page dimensions",
        ));
    }

    Ok(PageBounds {
        x: x0.min(x1),
        y: y0.min(y1),
        width,
        height,
    })
}

/// 画像XObjectと、そのリソース名。
pub(crate) struct PageImage<'a> {
    pub name: Vec<u8>,
    pub meta: ImageMeta,
    pub stream: &'a lopdf::Stream,
}

/// ページのリソースから辿れる画像XObject(ステンシルマスクは除く)。
pub(crate) fn page_images(
    doc: &Document,
    page_id: ObjectId,
) -> crate::error::Result<Vec<PageImage<'_>>> {
    let (resource_dict, resource_ids) = doc.get_page_resources(page_id)?;

    let mut images = Vec::new();
    if let Some(dict) = resource_dict {
        collect_images(doc, dict, &mut images)?;
    }
    for res_id in resource_ids {
        let dict = doc.get_dictionary(res_id)?;
        collect_images(doc, dict, &mut images)?;
    }
    Ok(images)
}

fn collect_images<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    out: &mut Vec<PageImage<'a>>,
) -> crate::error::Result<()> {
    let xobject_dict = match dict.get(b"XObject") {
        Ok(Object::Dictionary(d)) => d,
        Ok(Object::Reference(id)) => doc.get_object(*id).and_then(Object::as_dict)?,
        _ => return Ok(()),
    };

    for (name, value) in xobject_dict.iter() {
        let stream = match value {
            Object::Reference(id) => match doc.get_object(*id).and_then(Object::as_stream) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Object::Stream(s) => s,
            _ => continue,
        };

        if let Ok(subtype) = stream.dict.get(b"Subtype").and_then(Object::as_name)
            && subtype == b"Image"
        {
            let meta = read_image_meta(stream)?;
            if !meta.image_mask {
                out.push(PageImage {
                    name: name.clone(),
                    meta,
                    stream,
                });
            }
        }
    }
    Ok(())
}

fn largest_image(doc: &Document, page_id: ObjectId) -> crate::error::Result<Option<PageImage<'_>>> {
    Ok(page_images(doc, page_id)?
        .into_iter()
        .max_by_key(|image| image.meta.pixel_count()))
}

/// ページごとの最大画像のピクセル数(画像のないページは0)。
pub fn page_pixel_counts(doc: &Document) -> crate::error::Result<Vec<u64>> {
    doc.get_pages()
        .values()
        .map(|&page_id| {
            Ok(largest_image(doc, page_id)?
                .map(|image| image.meta.pixel_count())
                .unwrap_or(0))
        })
        .collect()
}

impl PageSource for PdfSource {
    fn page_count(&self) -> crate::error::Result<usize> {
        Ok(self.page_ids.len())
    }

    /// ページのスキャン画像をデコードする。
    ///
    /// 対象はコンテンツが画像XObjectを1つだけページ全体に描画するページのみ。
    /// OCRテキスト層やベクター描画、複数画像、部分配置のスキャンを含むページは
    /// InvalidInputとして扱い、元のページのまま出力される。
    fn page(&self, index: usize) -> crate::error::Result<Page> {
        let page_id = self.page_id(index)?;
        let bounds = page_bounds(&self.doc, page_id)?;

        let content = self.doc.get_page_content(page_id)?;
        let placement = sole_xobject_placement(&content)?.ok_or_else(|| {
            SqueezeError::invalid_input(format!("page {index} has content besides a single scan"))
        })?;
        if !placement.covers(&bounds) {
            return Err(SqueezeError::invalid_input(format!(
                "page {index}: scan does not cover the page"
            )));
        }

        let scan = page_images(&self.doc, page_id)?
            .into_iter()
            .find(|image| image.name == placement.name)
            .ok_or_else(|| {
                SqueezeError::invalid_input(format!(
                    "page {index}: /{} is not a raster image",
                    String::from_utf8_lossy(&placement.name)
                ))
            })?;
        let image = decode_image_stream(scan.stream, &scan.meta)?;
        Ok(Page::new(index, image, bounds))
    }
}
