use crate::archive::BackupStats;
use crate::error::Result;
use crate::matcher::ExcludeMatcher;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 扫描过程中产出的单个条目
///
/// 仅在一次扫描内短暂存在，不做持久化。
/// `relative_path` 是归档内名称 `<服务名>/<相对路径>`，统一使用正斜杠。
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub is_directory: bool,
}

/// 深度优先扫描单个服务目录
///
/// 命中排除规则的子目录在进入前即从遍历边界移除（硬剪枝，
/// 其下的文件不会被 stat）；排除是目录传递性的。
/// 对保留下来的文件：命中排除规则计入 `skipped_excluded`，
/// 超过大小上限计入 `skipped_by_size`。
/// 列目录与 stat 之间消失的文件静默跳过，不计数也不报错。
///
/// 回调返回 `Ok(false)` 时提前停止遍历（协作式取消检查点）。
/// 遍历顺序没有语义意义。
pub fn scan_service<F>(
    service_name: &str,
    service_root: &Path,
    matcher: &ExcludeMatcher,
    max_file_size: Option<u64>,
    stats: &mut BackupStats,
    mut on_entry: F,
) -> Result<()>
where
    F: FnMut(ScanEntry, &mut BackupStats) -> Result<bool>,
{
    let walker = WalkDir::new(service_root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if !entry.file_type().is_dir() {
                return true;
            }
            // 目录剪枝：命中规则的目录不进入
            match archive_name(service_name, service_root, entry.path()) {
                Some(rel) => !matcher.is_excluded(&rel),
                None => true,
            }
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // 与并发写入者竞争时条目可能已消失，静默跳过
                if err
                    .io_error()
                    .map(|e| e.kind() == ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    continue;
                }
                stats.skipped_io_error += 1;
                continue;
            }
        };

        let Some(rel) = archive_name(service_name, service_root, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            // 服务根目录自身不作为条目产出
            if entry.depth() == 0 {
                continue;
            }
            let keep = on_entry(
                ScanEntry {
                    relative_path: rel,
                    absolute_path: entry.path().to_path_buf(),
                    size_bytes: 0,
                    is_directory: true,
                },
                stats,
            )?;
            if !keep {
                return Ok(());
            }
            continue;
        }

        if !entry.file_type().is_file() {
            // 符号链接与特殊文件不进入归档
            continue;
        }

        if matcher.is_excluded(&rel) {
            stats.skipped_excluded += 1;
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                if err
                    .io_error()
                    .map(|e| e.kind() == ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    continue;
                }
                stats.skipped_io_error += 1;
                continue;
            }
        };

        if let Some(max) = max_file_size {
            if metadata.len() > max {
                stats.skipped_by_size += 1;
                continue;
            }
        }

        let keep = on_entry(
            ScanEntry {
                relative_path: rel,
                absolute_path: entry.path().to_path_buf(),
                size_bytes: metadata.len(),
                is_directory: false,
            },
            stats,
        )?;
        if !keep {
            return Ok(());
        }
    }

    Ok(())
}

/// 计算归档内名称 `<服务名>/<相对路径>`
///
/// 相对路径基于已知的服务根目录结构化计算，不做字符串截断。
fn archive_name(service_name: &str, root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_os_str().is_empty() {
        return Some(service_name.to_string());
    }
    // tar 归档内部统一使用 Unix 风格路径，跨平台兼容
    let rel = if cfg!(windows) {
        rel.display().to_string().replace('\\', "/")
    } else {
        rel.display().to_string()
    };
    Some(format!("{service_name}/{rel}"))
}
