// Named image transforms and the cache that hands them out.
//
// A transform that cannot be constructed is replaced by `Identity` so the
// separator always produces a layer set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use image::{DynamicImage, GrayImage, Luma};
use tracing::warn;

use crate::error::SqueezeError;

pub trait ImageFilter: Send + Sync {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage>;
}

/// Pass-through used in place of any transform that is unavailable.
pub struct Identity;

impl ImageFilter for Identity {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        Ok(image.clone())
    }
}

/// Parameterised description of a transform; also its cache key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterSpec {
    Median { radius: u32 },
    Grayscale,
    Sharpen { sigma: f32, amount: f32 },
    Contrast { amount: f32 },
    Binarize { gain: f32, shift: i32 },
    GaussianBlur { sigma: f32 },
}

impl FilterSpec {
    pub fn key(&self) -> String {
        match self {
            FilterSpec::Median { radius } => format!("median:{radius}"),
            FilterSpec::Grayscale => "grayscale".to_string(),
            FilterSpec::Sharpen { sigma, amount } => format!("sharpen:{sigma}:{amount}"),
            FilterSpec::Contrast { amount } => format!("contrast:{amount}"),
            FilterSpec::Binarize { gain, shift } => format!("binarize:{gain}:{shift}"),
            FilterSpec::GaussianBlur { sigma } => format!("blur:{sigma}"),
        }
    }

    /// Build the transform, rejecting parameters the backend cannot take.
    pub fn build(&self) -> crate::error::Result<Arc<dyn ImageFilter>> {
        match *self {
            FilterSpec::Median { radius } => {
                if radius == 0 || radius > 16 {
                    return Err(invalid(self, "radius must be 1-16"));
                }
                Ok(Arc::new(Median { radius }))
            }
            FilterSpec::Grayscale => Ok(Arc::new(Grayscale)),
            FilterSpec::Sharpen { sigma, amount } => {
                if !(sigma.is_finite() && sigma > 0.0) || !(amount.is_finite() && amount >= 0.0) {
                    return Err(invalid(self, "sigma must be > 0 and amount >= 0"));
                }
                Ok(Arc::new(Sharpen { sigma, amount }))
            }
            FilterSpec::Contrast { amount } => {
                if !amount.is_finite() {
                    return Err(invalid(self, "amount must be finite"));
                }
                Ok(Arc::new(Contrast { amount }))
            }
            FilterSpec::Binarize { gain, shift } => {
                if !(gain.is_finite() && gain > 0.0) {
                    return Err(invalid(self, "gain must be > 0"));
                }
                Ok(Arc::new(Binarize { gain, shift }))
            }
            FilterSpec::GaussianBlur { sigma } => {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(invalid(self, "sigma must be > 0"));
                }
                Ok(Arc::new(GaussianBlur { sigma }))
            }
        }
    }
}

fn invalid(spec: &FilterSpec, msg: &str) -> SqueezeError {
    SqueezeError::config(format!("filter {}: {msg}", spec.key()))
}

fn ensure_non_empty(image: &DynamicImage) -> crate::error::Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(SqueezeError::invalid_input("cannot filter an empty image"));
    }
    Ok(())
}

struct Median {
    radius: u32,
}

impl ImageFilter for Median {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        ensure_non_empty(image)?;
        let out = if image.color().has_color() {
            DynamicImage::ImageRgb8(imageproc::filter::median_filter(
                &image.to_rgb8(),
                self.radius,
                self.radius,
            ))
        } else {
            DynamicImage::ImageLuma8(imageproc::filter::median_filter(
                &image.to_luma8(),
                self.radius,
                self.radius,
            ))
        };
        Ok(out)
    }
}

struct Grayscale;

impl ImageFilter for Grayscale {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        Ok(DynamicImage::ImageLuma8(image.to_luma8()))
    }
}

struct Sharpen {
    sigma: f32,
    amount: f32,
}

impl ImageFilter for Sharpen {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        ensure_non_empty(image)?;
        let gray = image.to_luma8();
        Ok(DynamicImage::ImageLuma8(
            imageproc::filter::sharpen_gaussian(&gray, self.sigma, self.amount),
        ))
    }
}

struct Contrast {
    amount: f32,
}

impl ImageFilter for Contrast {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        Ok(image.adjust_contrast(self.amount))
    }
}

/// `v' = clamp((v - 128 + shift) * gain + 128)` on luma.
struct Binarize {
    gain: f32,
    shift: i32,
}

impl ImageFilter for Binarize {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        let gray = image.to_luma8();
        let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let v = gray.get_pixel(x, y).0[0] as f32;
            let mapped = (v - 128.0 + self.shift as f32) * self.gain + 128.0;
            Luma([mapped.clamp(0.0, 255.0) as u8])
        });
        Ok(DynamicImage::ImageLuma8(out))
    }
}

struct GaussianBlur {
    sigma: f32,
}

impl ImageFilter for GaussianBlur {
    fn apply(&self, image: &DynamicImage) -> crate::error::Result<DynamicImage> {
        ensure_non_empty(image)?;
        let out = if image.color().has_color() {
            DynamicImage::ImageRgb8(imageproc::filter::gaussian_blur_f32(
                &image.to_rgb8(),
                self.sigma,
            ))
        } else {
            DynamicImage::ImageLuma8(imageproc::filter::gaussian_blur_f32(
                &image.to_luma8(),
                self.sigma,
            ))
        };
        Ok(out)
    }
}

/// Filter handed out by the cache; `fallback` is set when it is the identity
/// stand-in for a transform that failed to construct.
#[derive(Clone)]
pub struct CachedFilter {
    pub filter: Arc<dyn ImageFilter>,
    pub fallback: bool,
}

#[derive(Default)]
pub struct FilterCache {
    entries: HashMap<String, CachedFilter>,
}

impl FilterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the filter cached under `key`, building it with `factory` on a
    /// miss. A failing factory caches and returns the identity filter.
    pub fn get_or_create<F>(&mut self, key: &str, factory: F) -> CachedFilter
    where
        F: FnOnce() -> crate::error::Result<Arc<dyn ImageFilter>>,
    {
        if let Some(hit) = self.entries.get(key) {
            return hit.clone();
        }

        let entry = match factory() {
            Ok(filter) => CachedFilter {
                filter,
                fallback: false,
            },
            Err(e) => {
                warn!(filter = key, error = %e, "filter unavailable, using identity");
                CachedFilter {
                    filter: Arc::new(Identity),
                    fallback: true,
                }
            }
        };
        self.entries.insert(key.to_string(), entry.clone());
        entry
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared image-processing state. The cache is only touched under the lock;
/// the filters it returns are immutable and applied outside it.
#[derive(Default)]
pub struct ProcessingContext {
    cache: Mutex<FilterCache>,
}

impl ProcessingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self, spec: &FilterSpec) -> CachedFilter {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get_or_create(&spec.key(), || spec.build())
    }

    pub fn cached_filters(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_keys_are_distinct_per_parameter() {
        let a = FilterSpec::GaussianBlur { sigma: 10.0 }.key();
        let b = FilterSpec::GaussianBlur { sigma: 20.0 }.key();
        assert_ne!(a, b);
    }

    #[test]
    fn test_build_rejects_non_positive_sigma() {
        assert!(FilterSpec::GaussianBlur { sigma: 0.0 }.build().is_err());
        assert!(FilterSpec::Sharpen {
            sigma: -1.0,
            amount: 1.0
        }
        .build()
        .is_err());
        assert!(FilterSpec::Median { radius: 0 }.build().is_err());
    }

    #[test]
    fn test_cache_records_fallback_under_its_key() {
        let mut cache = FilterCache::new();
        let key = FilterSpec::GaussianBlur { sigma: 0.0 }.key();
        assert!(!cache.contains(&key));

        let first = cache.get_or_create(&key, || Err(SqueezeError::config("bad sigma")));
        assert!(first.fallback);
        assert!(cache.contains(&key));
        assert!(!cache.contains("median:1"));

        let second = cache.get_or_create(&key, || panic!("factory must not run on a hit"));
        assert!(second.fallback);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_binarize_pushes_values_to_extremes() {
        let gray = GrayImage::from_fn(3, 1, |x, _| Luma([[40u8, 128, 220][x as usize]]));
        let filter = FilterSpec::Binarize {
            gain: 8.0,
            shift: 0,
        }
        .build()
        .unwrap();
        let out = filter
            .apply(&DynamicImage::ImageLuma8(gray))
            .unwrap()
            .to_luma8();
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 128);
        assert_eq!(out.get_pixel(2, 0).0[0], 255);
    }
}
