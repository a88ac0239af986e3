use super::job::Job;
use super::preset::{CompressionConfig, Preset};
use super::settings::Settings;

#[derive(Debug, Clone)]
pub struct MergedConfig {
    pub preset: Preset,
    pub compression: CompressionConfig,
}

impl MergedConfig {
    /// ジョブのプリセット(未指定なら settings の既定値)の設定を起点に、
    /// ジョブ側で指定された項目を上書きする。
    pub fn new(settings: &Settings, job: &Job) -> Self {
        let preset = job.preset.unwrap_or(settings.preset);
        let mut compression = preset.config();
        if let Some(quality) = job.quality {
            compression.quality = quality;
        }
        if let Some(dpi) = job.dpi {
            compression.target_resolution_dpi = dpi;
        }
        if let Some(aggressive) = job.aggressive {
            compression.aggressive_mode = aggressive;
        }
        if let Some(layers) = job.layer_separation {
            compression.use_layer_separation = layers;
        }
        MergedConfig {
            preset,
            compression,
        }
    }
}
