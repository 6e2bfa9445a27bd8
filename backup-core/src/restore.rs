use crate::error::{BackupError, Result};
use std::path::{Path, PathBuf};

/// 恢复管理器
#[derive(Debug, Clone)]
pub struct RestoreManager {
    storage_dir: PathBuf,
}

impl RestoreManager {
    pub fn new(storage_dir: PathBuf) -> Self {
        Self { storage_dir }
    }

    /// 解析归档参数
    ///
    /// 裸文件名相对配置的归档存储目录解析，
    /// 绝对路径或带目录分隔符的路径按原样使用。
    pub fn resolve_archive_path(&self, archive: &str) -> PathBuf {
        let as_path = Path::new(archive);
        if as_path.is_absolute() || as_path.components().count() > 1 {
            return as_path.to_path_buf();
        }
        self.storage_dir.join(archive)
    }

    /// 从归档恢复到目标根目录
    ///
    /// 按 `<服务名>/<相对路径>` 布局解包，已存在的文件被无条件覆盖 ——
    /// 恢复是破坏性的后写覆盖操作，提醒操作员是调用方的责任。
    /// 任何解包错误（归档损坏、磁盘写满）都会中止整个恢复并作为
    /// 致命错误返回，不尝试部分恢复。
    pub async fn restore(&self, archive: &str, target_root: &Path) -> Result<()> {
        let archive_path = self.resolve_archive_path(archive);
        if !archive_path.exists() {
            return Err(BackupError::restore(format!(
                "归档不存在: {}",
                archive_path.display()
            )));
        }

        tracing::info!("开始从归档恢复: {}", archive_path.display());

        tokio::fs::create_dir_all(target_root).await?;

        let target_root = target_root.to_path_buf();
        let unpack_path = archive_path.clone();

        // 在后台线程中执行解压操作
        tokio::task::spawn_blocking(move || {
            use flate2::read::GzDecoder;
            use std::fs::File;
            use tar::Archive;

            let file = File::open(&unpack_path)?;
            let decoder = GzDecoder::new(file);
            let mut archive = Archive::new(decoder);

            // unpack 默认覆盖已存在的文件，并拒绝逃逸出目标目录的条目
            archive
                .unpack(&target_root)
                .map_err(|e| BackupError::restore(format!("解包归档失败: {e}")))?;

            Ok::<(), BackupError>(())
        })
        .await??;

        tracing::info!("✅ 恢复完成: {}", archive_path.display());
        Ok(())
    }
}
