// Memory-pressure signal polled by the scheduler between batches.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use tracing::debug;

/// Interval between polls while waiting for relief.
pub const RELIEF_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemoryPressureLevel {
    Normal = 0,
    Warning = 1,
    Critical = 2,
    Terminal = 3,
}

impl MemoryPressureLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MemoryPressureLevel::Normal,
            1 => MemoryPressureLevel::Warning,
            2 => MemoryPressureLevel::Critical,
            _ => MemoryPressureLevel::Terminal,
        }
    }
}

pub trait MemoryPressureMonitor: Send + Sync {
    fn current_level(&self) -> MemoryPressureLevel;

    fn can_start_intensive_operation(&self) -> bool {
        self.current_level() < MemoryPressureLevel::Critical
    }

    /// Poll until the level drops below `Warning` or `timeout` elapses.
    /// Returns whether relief was observed.
    fn wait_for_relief(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.current_level() < MemoryPressureLevel::Warning {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(?timeout, "no memory relief before timeout");
                return false;
            }
            std::thread::sleep(RELIEF_POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Level written by an external monitor and read by any number of
/// schedulers. Clones share the same level.
#[derive(Debug, Clone)]
pub struct SharedPressure {
    level: Arc<AtomicU8>,
}

impl SharedPressure {
    pub fn new(level: MemoryPressureLevel) -> Self {
        Self {
            level: Arc::new(AtomicU8::new(level as u8)),
        }
    }

    pub fn set(&self, level: MemoryPressureLevel) {
        self.level.store(level as u8, Ordering::Release);
    }
}

impl Default for SharedPressure {
    fn default() -> Self {
        Self::new(MemoryPressureLevel::Normal)
    }
}

impl MemoryPressureMonitor for SharedPressure {
    fn current_level(&self) -> MemoryPressureLevel {
        MemoryPressureLevel::from_u8(self.level.load(Ordering::Acquire))
    }
}

/// Derives the level from the share of available system memory.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeminfoMonitor;

impl MeminfoMonitor {
    /// Level for `available / total`.
    pub fn level_for_ratio(ratio: f64) -> MemoryPressureLevel {
        if ratio < 0.05 {
            MemoryPressureLevel::Terminal
        } else if ratio < 0.10 {
            MemoryPressureLevel::Critical
        } else if ratio < 0.20 {
            MemoryPressureLevel::Warning
        } else {
            MemoryPressureLevel::Normal
        }
    }
}

impl MemoryPressureMonitor for MeminfoMonitor {
    fn current_level(&self) -> MemoryPressureLevel {
        match available_memory_ratio() {
            Some(ratio) => Self::level_for_ratio(ratio),
            None => MemoryPressureLevel::Normal,
        }
    }
}

#[cfg(target_os = "linux")]
fn available_memory_ratio() -> Option<f64> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_ratio(&meminfo)
}

#[cfg(not(target_os = "linux"))]
fn available_memory_ratio() -> Option<f64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_ratio(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|line| line.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(available as f64 / total as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_meminfo_ratio() {
        let meminfo = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        let ratio = parse_meminfo_ratio(meminfo).unwrap();
        assert!((ratio - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(MeminfoMonitor::level_for_ratio(0.5), MemoryPressureLevel::Normal);
        assert_eq!(MeminfoMonitor::level_for_ratio(0.15), MemoryPressureLevel::Warning);
        assert_eq!(MeminfoMonitor::level_for_ratio(0.07), MemoryPressureLevel::Critical);
        assert_eq!(MeminfoMonitor::level_for_ratio(0.01), MemoryPressureLevel::Terminal);
    }
}
