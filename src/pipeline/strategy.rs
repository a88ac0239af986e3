// Page count -> size category -> processing strategy.

use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeCategory {
    /// < 20 pages
    Small,
    /// 20-49 pages
    Medium,
    /// 50-199 pages
    Large,
    /// >= 200 pages
    Massive,
}

impl SizeCategory {
    pub fn from_page_count(page_count: usize) -> Self {
        match page_count {
            0..=19 => SizeCategory::Small,
            20..=49 => SizeCategory::Medium,
            50..=199 => SizeCategory::Large,
            _ => SizeCategory::Massive,
        }
    }

    /// Maximum number of thumbnails to produce; `None` means every page.
    pub fn thumbnail_limit(self) -> Option<usize> {
        match self {
            SizeCategory::Small => None,
            SizeCategory::Medium => Some(50),
            SizeCategory::Large => Some(20),
            SizeCategory::Massive => Some(0),
        }
    }

    pub fn strategy(self) -> ProcessingStrategy {
        match self {
            SizeCategory::Small => ProcessingStrategy::InMemory,
            SizeCategory::Medium => ProcessingStrategy::Batched { batch_size: 20 },
            SizeCategory::Large => ProcessingStrategy::Batched { batch_size: 10 },
            SizeCategory::Massive => ProcessingStrategy::Streaming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStrategy {
    InMemory,
    Batched { batch_size: usize },
    Streaming,
}

/// Rough per-page cost of separation + encoding.
const SECONDS_PER_PAGE: f64 = 0.6;
/// Fixed cost per batch boundary (pressure check, possible pause).
const SECONDS_PER_BATCH: f64 = 0.25;

impl ProcessingStrategy {
    /// Pages held at once under this strategy.
    pub fn batch_size(self, page_count: usize) -> usize {
        match self {
            ProcessingStrategy::InMemory => page_count.max(1),
            ProcessingStrategy::Batched { batch_size } => batch_size,
            ProcessingStrategy::Streaming => 1,
        }
    }

    pub fn estimated_time(self, page_count: usize) -> Duration {
        let batches = page_count.div_ceil(self.batch_size(page_count));
        Duration::from_secs_f64(
            page_count as f64 * SECONDS_PER_PAGE + batches as f64 * SECONDS_PER_BATCH,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_count_maps_to_one_batch_size() {
        for n in 0..500 {
            let size = SizeCategory::from_page_count(n).strategy().batch_size(n);
            assert!(size >= 1);
        }
    }

    #[test]
    fn test_estimated_time_grows_with_pages() {
        let s = ProcessingStrategy::Batched { batch_size: 10 };
        assert!(s.estimated_time(60) > s.estimated_time(50));
    }
}
