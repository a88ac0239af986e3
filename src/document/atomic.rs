use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::SqueezeError;

/// 完成したバイト列を書き込む。出力先は完全な状態か存在しないかのどちらかになる。
pub trait AtomicWriter: Send + Sync {
    fn write_atomic(&self, bytes: &[u8], destination: &Path) -> crate::error::Result<()>;
}

/// 同じディレクトリの `.tmp` に書き込み、sync して長さを確認してから
/// 最後にrenameで出力先に移動する。失敗時は一時ファイルを削除する。
#[derive(Debug, Default, Clone, Copy)]
pub struct StagedFileWriter;

impl StagedFileWriter {
    fn staging_path(destination: &Path) -> PathBuf {
        let mut name = destination
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        destination.with_file_name(name)
    }

    fn stage(bytes: &[u8], staging: &Path) -> crate::error::Result<()> {
        let mut file = fs::File::create(staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;

        let written = fs::metadata(staging)?.len();
        if written != bytes.len() as u64 {
            return Err(SqueezeError::pdf_write(format!(
                "short write to {}: expected {} bytes, found {}",
                staging.display(),
                bytes.len(),
                written
            )));
        }
        Ok(())
    }
}

impl AtomicWriter for StagedFileWriter {
    fn write_atomic(&self, bytes: &[u8], destination: &Path) -> crate::error::Result<()> {
        let staging = Self::staging_path(destination);
        let result = Self::stage(bytes, &staging)
            .and_then(|()| fs::rename(&staging, destination).map_err(SqueezeError::from));
        if result.is_err() {
            let _ = fs::remove_file(&staging);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pdf");
        fs::write(&dest, b"old").unwrap();

        StagedFileWriter.write_atomic(b"new contents", &dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"new contents");
        assert!(!StagedFileWriter::staging_path(&dest).exists());
    }

    #[test]
    fn test_failed_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing").join("out.pdf");

        assert!(StagedFileWriter.write_atomic(b"x", &dest).is_err());
        assert!(!StagedFileWriter::staging_path(&dest).exists());
        assert!(!dest.exists());
    }
}
