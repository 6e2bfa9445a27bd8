use crate::constants::archive::{ARCHIVE_PREFIX, ARCHIVE_SUFFIX};
use crate::error::Result;
use std::path::{Path, PathBuf};

/// 归档列表中的一项
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// 判断文件名是否符合归档命名约定 `configs-*.tar.gz`
///
/// 写入中的 `.partial` 临时文件不会命中。
pub fn is_archive_name(file_name: &str) -> bool {
    file_name.starts_with(ARCHIVE_PREFIX) && file_name.ends_with(ARCHIVE_SUFFIX)
}

/// 列出归档目录中的所有归档，按文件名字典序（即创建时间序）排列
pub async fn list_archives(storage_dir: &Path) -> Result<Vec<ArchiveInfo>> {
    let mut archives = Vec::new();

    let mut entries = tokio::fs::read_dir(storage_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !is_archive_name(&file_name) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else {
            // 与并发删除者竞争，条目已消失
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        archives.push(ArchiveInfo {
            path: entry.path(),
            file_name,
            size_bytes: metadata.len(),
        });
    }

    // 文件名内嵌 UTC 时间戳，字典序等价于时间序
    archives.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(archives)
}

/// 清理旧归档，仅保留最近的 `retain` 个
///
/// 返回被删除的归档路径。现存数量不超过 `retain` 时不做任何删除，
/// 因此本操作是幂等的。单个文件删除失败（已被并发删除等）静默容忍。
pub async fn prune_archives(storage_dir: &Path, retain: usize) -> Result<Vec<PathBuf>> {
    let archives = list_archives(storage_dir).await?;
    if archives.len() <= retain {
        return Ok(Vec::new());
    }

    let cutoff = archives.len() - retain;
    let mut deleted = Vec::new();

    for old in &archives[..cutoff] {
        if let Err(e) = tokio::fs::remove_file(&old.path).await {
            tracing::debug!("删除旧归档失败 {}: {e}", old.path.display());
        }
        deleted.push(old.path.clone());
    }

    if !deleted.is_empty() {
        tracing::info!("🧹 已清理 {} 个旧归档", deleted.len());
    }

    Ok(deleted)
}
