use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::preset::Preset;
use crate::mrc::separator::SeparatorParams;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preset: Preset,
    /// 0 = rayon default, 1 = strictly sequential.
    pub parallel_workers: usize,
    /// Resolution assumed for standalone raster files.
    pub assumed_image_dpi: u32,
    pub max_input_bytes: Option<u64>,
    pub premium: bool,
    pub max_retries: u32,
    pub processing_timeout_secs: Option<u64>,
    pub memory: MemorySettings,
    pub separator: SeparatorParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub backpressure_pause_ms: u64,
    pub relief_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            preset: Preset::Smart,
            parallel_workers: 0,
            assumed_image_dpi: 300,
            max_input_bytes: None,
            premium: false,
            max_retries: 3,
            processing_timeout_secs: None,
            memory: MemorySettings::default(),
            separator: SeparatorParams::default(),
        }
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        MemorySettings {
            backpressure_pause_ms: 250,
            relief_timeout_secs: 30,
        }
    }
}

impl MemorySettings {
    pub fn backpressure_pause(&self) -> Duration {
        Duration::from_millis(self.backpressure_pause_ms)
    }

    pub fn relief_timeout(&self) -> Duration {
        Duration::from_secs(self.relief_timeout_secs)
    }
}

impl Settings {
    pub fn from_yaml(yaml: &str) -> crate::error::Result<Self> {
        serde_yml::from_str(yaml).map_err(|e| {
            crate::error::SqueezeError::config(format!("Failed to parse settings YAML: {e}"))
        })
    }

    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn processing_timeout(&self) -> Option<Duration> {
        self.processing_timeout_secs.map(Duration::from_secs)
    }
}
