use std::cell::Cell;
use std::sync::Arc;

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use pdf_squeeze::config::preset::Preset;
use pdf_squeeze::error::SqueezeError;
use pdf_squeeze::mrc::filters::{FilterCache, FilterSpec, ImageFilter, ProcessingContext};
use pdf_squeeze::mrc::separator::{LayerSeparator, SeparatorParams, sample_text_coverage};
use pdf_squeeze::mrc::{Page, PageBounds};

/// White page with a black block covering `block_w` x `block_h` pixels.
fn page_with_block(width: u32, height: u32, block_w: u32, block_h: u32) -> Page {
    let x0 = (width - block_w) / 2;
    let y0 = (height - block_h) / 2;
    let img = RgbImage::from_fn(width, height, |x, y| {
        if (x0..x0 + block_w).contains(&x) && (y0..y0 + block_h).contains(&y) {
            Rgb([0, 0, 0])
        } else {
            Rgb([255, 255, 255])
        }
    });
    Page::new(
        0,
        DynamicImage::ImageRgb8(img),
        PageBounds::from_pixels(width, height, 150),
    )
}

fn separator(params: SeparatorParams) -> (LayerSeparator, Arc<ProcessingContext>) {
    let context = Arc::new(ProcessingContext::new());
    (LayerSeparator::new(context.clone(), params), context)
}

// ============================================================
// 1. Layer separation
// ============================================================

#[test]
fn test_separate_preserves_extent_and_measures_coverage() {
    let page = page_with_block(200, 200, 60, 40);
    let (sep, _) = separator(SeparatorParams::default());
    let layers = sep.separate(&page, &Preset::Smart.config());

    assert_eq!(layers.page_index, 0);
    assert_eq!(layers.foreground.dimensions(), (200, 200));
    assert_eq!(
        (layers.background.width(), layers.background.height()),
        (200, 200)
    );
    // 2400 of 40000 pixels are dark.
    assert!(
        layers.text_coverage > 0.03 && layers.text_coverage < 0.12,
        "coverage {} should be near 0.06",
        layers.text_coverage
    );
    assert!(!layers.is_degraded(), "fallbacks: {:?}", layers.fallbacks);
}

#[test]
fn test_blank_page_has_zero_coverage() {
    let page = page_with_block(120, 80, 0, 0);
    let (sep, _) = separator(SeparatorParams::default());
    let layers = sep.separate(&page, &Preset::Document.config());
    assert_eq!(layers.text_coverage, 0.0);
    assert!(layers.foreground.pixels().all(|p| p.0[0] == 255));
}

#[test]
fn test_text_pixels_are_dark_in_mask() {
    let page = page_with_block(100, 100, 40, 40);
    let (sep, _) = separator(SeparatorParams::default());
    let layers = sep.separate(&page, &Preset::Archive.config());
    assert!(layers.foreground.get_pixel(50, 50).0[0] < 128);
    assert!(layers.foreground.get_pixel(5, 5).0[0] >= 128);
}

#[test]
fn test_broken_filter_falls_back_to_identity() {
    let params = SeparatorParams {
        blur_sigma: 0.0,
        ..SeparatorParams::default()
    };
    let page = page_with_block(64, 64, 16, 16);
    let (sep, _) = separator(params);
    let layers = sep.separate(&page, &Preset::Smart.config());

    assert!(layers.is_degraded());
    assert_eq!(layers.fallbacks.len(), 1);
    assert!(layers.fallbacks[0].contains("blur"), "{:?}", layers.fallbacks);
    assert_eq!(
        (layers.background.width(), layers.background.height()),
        (64, 64)
    );
}

#[test]
fn test_filters_are_cached_across_pages() {
    let (sep, context) = separator(SeparatorParams::default());
    let config = Preset::Smart.config();

    sep.separate(&page_with_block(50, 50, 10, 10), &config);
    let after_first = context.cached_filters();
    assert!(after_first > 0);

    sep.separate(&page_with_block(70, 30, 10, 10), &config);
    assert_eq!(context.cached_filters(), after_first);
}

// ============================================================
// 2. Filter cache
// ============================================================

#[test]
fn test_cache_failure_yields_cached_identity() {
    let mut cache = FilterCache::new();
    let calls = Cell::new(0);

    let first = cache.get_or_create("broken", || {
        calls.set(calls.get() + 1);
        Err(SqueezeError::config("no such filter"))
    });
    assert!(first.fallback);

    let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(3, 3, Luma([77])));
    let out = first.filter.apply(&img).unwrap();
    assert_eq!(out.to_luma8().get_pixel(1, 1).0[0], 77);

    let second = cache.get_or_create("broken", || {
        calls.set(calls.get() + 1);
        Err(SqueezeError::config("no such filter"))
    });
    assert!(second.fallback);
    assert_eq!(calls.get(), 1, "factory should run once");
    assert!(cache.contains("broken"));
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_cache_returns_built_filter() {
    let mut cache = FilterCache::new();
    let spec = FilterSpec::Grayscale;
    let cached = cache.get_or_create(&spec.key(), || spec.build());
    assert!(!cached.fallback);

    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])));
    let out = cached.filter.apply(&img).unwrap();
    assert!(!out.color().has_color());
}

// ============================================================
// 3. Coverage sampling
// ============================================================

#[test]
fn test_coverage_sampling_half_dark() {
    // Left half black, right half white, on a large image that needs striding.
    let mask = GrayImage::from_fn(2000, 1000, |x, _| Luma([if x < 1000 { 0 } else { 255 }]));
    let coverage = sample_text_coverage(&mask);
    assert!((coverage - 0.5).abs() < 0.02, "coverage {coverage}");
}
