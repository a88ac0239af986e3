// ページのコンテンツを解析し、スキャン画像だけのページかどうかを判定する。
//
// 対象になるのは q/Q と cm、そして1回の Do だけからなるコンテンツストリーム。
// テキスト(不可視のOCRテキストを含む)やパス、追加の画像、インライン画像が
// あるページを書き換えると内容が失われる。

use lopdf::content::Content;
use lopdf::Object;

use crate::error::SqueezeError;
use crate::mrc::PageBounds;

/// スキャンがページ全体を覆っているかを判定する際の許容誤差(pt)。
const COVER_TOLERANCE: f64 = 1.0;

/// 6要素アフィン変換行列 `[a b c d e f]`。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self × other`。先に `self`、次に `other` で変換する。
    /// cmオペレータは `operand.then(&ctm)` として適用する。
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// 単位正方形を変換したときのBBox `(x_min, y_min, x_max, y_max)`。
    fn unit_square_bbox(&self) -> (f64, f64, f64, f64) {
        let corners = [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0), (1.0, 1.0)]
            .map(|(x, y)| (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f));
        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(x0, y0, x1, y1), &(x, y)| (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        )
    }
}

/// ページ唯一のXObjectの配置。
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlacement {
    pub name: Vec<u8>,
    pub ctm: Matrix,
}

impl ScanPlacement {
    /// 描画された画像が `bounds` を覆っているか(誤差1pt以内)。
    pub fn covers(&self, bounds: &PageBounds) -> bool {
        let (x0, y0, x1, y1) = self.ctm.unit_square_bbox();
        let (bx0, by0) = (bounds.x as f64, bounds.y as f64);
        let (bx1, by1) = (bx0 + bounds.width as f64, by0 + bounds.height as f64);
        x0 <= bx0 + COVER_TOLERANCE
            && y0 <= by0 + COVER_TOLERANCE
            && x1 >= bx1 - COVER_TOLERANCE
            && y1 >= by1 - COVER_TOLERANCE
    }
}

/// スキャンのみのページなら唯一のXObjectの配置を返す。
/// XObjectを1つ描画する以外の処理があれば `None`。
pub fn sole_xobject_placement(content: &[u8]) -> crate::error::Result<Option<ScanPlacement>> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let content = Content::decode(content).map_err(|e| SqueezeError::pdf_read(e.to_string()))?;

    let mut ctm_stack = vec![Matrix::IDENTITY];
    let mut placement = None;
    for op in &content.operations {
        match op.operator.as_str() {
            "q" => {
                let current = ctm_stack.last().copied().unwrap_or(Matrix::IDENTITY);
                ctm_stack.push(current);
            }
            "Q" => {
                if ctm_stack.len() > 1 {
                    ctm_stack.pop();
                }
            }
            "cm" => {
                let [a, b, c, d, e, f] = match op.operands.as_slice() {
                    [a, b, c, d, e, f] => [a, b, c, d, e, f].map(number),
                    _ => return Ok(None),
                };
                let (Some(a), Some(b), Some(c), Some(d), Some(e), Some(f)) = (a, b, c, d, e, f)
                else {
                    return Ok(None);
                };
                if let Some(current) = ctm_stack.last_mut() {
                    *current = Matrix { a, b, c, d, e, f }.then(current);
                }
            }
            "Do" => {
                let Some(Ok(name)) = op.operands.first().map(Object::as_name) else {
                    return Ok(None);
                };
                if placement.is_some() {
                    return Ok(None);
                }
                placement = Some(ScanPlacement {
                    name: name.to_vec(),
                    ctm: ctm_stack.last().copied().unwrap_or(Matrix::IDENTITY),
                });
            }
            _ => return Ok(None),
        }
    }
    Ok(placement)
}

fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(width: f32, height: f32) -> PageBounds {
        PageBounds {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }
    }

    #[test]
    fn test_full_page_scan_is_accepted() {
        let placement = sole_xobject_placement(b"q 144 0 0 180 0 0 cm /Im0 Do Q")
            .unwrap()
            .expect("scan-only page");
        assert_eq!(placement.name, b"Im0");
        assert!(placement.covers(&bounds(144.0, 180.0)));
    }

    #[test]
    fn test_nested_matrices_compose() {
        let placement = sole_xobject_placement(b"q 2 0 0 2 0 0 cm q 72 0 0 90 0 0 cm /Im0 Do Q Q")
            .unwrap()
            .unwrap();
        assert_eq!(placement.ctm.a, 144.0);
        assert_eq!(placement.ctm.d, 180.0);
        assert!(placement.covers(&bounds(144.0, 180.0)));
    }

    #[test]
    fn test_text_layer_is_rejected() {
        let content = b"q 144 0 0 180 0 0 cm /Im0 Do Q BT 3 Tr /F1 12 Tf (SEARCHABLE) Tj ET";
        assert_eq!(sole_xobject_placement(content).unwrap(), None);
    }

    #[test]
    fn test_second_image_is_rejected() {
        let content = b"q 144 0 0 180 0 0 cm /Im0 Do Q q 10 0 0 10 0 0 cm /Im1 Do Q";
        assert_eq!(sole_xobject_placement(content).unwrap(), None);
    }

    #[test]
    fn test_empty_content_has_no_scan() {
        assert_eq!(sole_xobject_placement(b"").unwrap(), None);
        assert_eq!(sole_xobject_placement(b" \n").unwrap(), None);
    }

    #[test]
    fn test_partial_placement_does_not_cover() {
        let placement = sole_xobject_placement(b"q 72 0 0 90 36 45 cm /Im0 Do Q")
            .unwrap()
            .unwrap();
        assert!(!placement.covers(&bounds(144.0, 180.0)));
    }
}
