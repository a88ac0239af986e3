use serde::Deserialize;

use super::preset::Preset;

#[derive(Debug, Clone, Deserialize)]
pub struct JobFile {
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub input: String,
    pub output: String,
    pub preset: Option<Preset>,
    #[serde(default, deserialize_with = "deserialize_quality")]
    pub quality: Option<f32>,
    pub dpi: Option<u32>,
    pub aggressive: Option<bool>,
    pub layer_separation: Option<bool>,
}

/// 小数 (`0.4`) とパーセント (`40`) のどちらも受け付ける。
/// 0-100 の範囲外はエラー。
pub fn parse_quality(value: f32) -> crate::error::Result<f32> {
    if !value.is_finite() || value < 0.0 {
        return Err(crate::error::SqueezeError::config(format!(
            "Invalid quality: {value}"
        )));
    }
    if value <= 1.0 {
        Ok(value)
    } else if value <= 100.0 {
        Ok(value / 100.0)
    } else {
        Err(crate::error::SqueezeError::config(format!(
            "Quality out of range (0-1 or 0-100): {value}"
        )))
    }
}

fn deserialize_quality<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<f32>::deserialize(deserializer)?;
    value
        .map(parse_quality)
        .transpose()
        .map_err(serde::de::Error::custom)
}
