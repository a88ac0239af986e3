pub mod job;
pub mod merged;
pub mod preset;
pub mod settings;

use settings::Settings;
use std::path::Path;

/// ジョブファイルと同じディレクトリの `settings.yaml` を読み込む。
/// 存在しない場合はデフォルト値を返す。
pub fn load_settings_for_job(job_file_path: &Path) -> crate::error::Result<Settings> {
    let dir = job_file_path
        .parent()
        .ok_or_else(|| crate::error::SqueezeError::config("Cannot determine job file directory"))?;

    let settings_path = dir.join("settings.yaml");

    if settings_path.exists() {
        Settings::from_file(&settings_path)
    } else {
        Ok(Settings::default())
    }
}
