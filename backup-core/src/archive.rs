use crate::checksum;
use crate::constants::archive::{
    ARCHIVE_PREFIX, ARCHIVE_SUFFIX, PARTIAL_SUFFIX, TIMESTAMP_FORMAT,
};
use crate::error::{BackupError, Result};
use crate::matcher::ExcludeMatcher;
use crate::scanner::{ScanEntry, scan_service};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 备份管理器
#[derive(Debug, Clone)]
pub struct BackupManager {
    config_root: PathBuf,
    storage_dir: PathBuf,
}

/// 备份选项
#[derive(Clone)]
pub struct BackupOptions {
    /// 要备份的服务目录名列表
    pub services: Vec<String>,
    /// 排除规则匹配器
    pub exclude: ExcludeMatcher,
    /// 单文件大小上限（字节），None 表示不限制
    pub max_file_size: Option<u64>,
    /// 压缩级别 (0-9)
    pub compression_level: u32,
    /// 进度汇报间隔（每 N 个归档文件汇报一次，0 表示关闭）
    pub progress_interval: u64,
    /// 进度回调，缺省时静默
    pub on_progress: Option<ProgressFn>,
    /// 中断时是否保留已写入的部分归档
    pub keep_partial: bool,
    /// 完成后是否计算归档的 SHA-256 校验和
    pub compute_checksum: bool,
    /// 协作式取消标志
    pub cancel: CancelFlag,
}

/// 进度回调，在两次文件写入之间被调用，收到当前统计快照
pub type ProgressFn = Arc<dyn Fn(&BackupStats) + Send + Sync>;

/// 协作式取消标志，在文件操作之间被检查
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 一次备份运行的统计，作为单一累加器贯穿扫描与写入，随结果返回
#[derive(Debug, Clone, Default)]
pub struct BackupStats {
    /// 已写入归档的文件数
    pub files_added: u64,
    /// 已写入归档的字节数（压缩前）
    pub bytes_added: u64,
    /// 因排除规则跳过的文件数
    pub skipped_excluded: u64,
    /// 因超过大小上限跳过的文件数
    pub skipped_by_size: u64,
    /// 因读取错误跳过的文件数
    pub skipped_io_error: u64,
    /// 成功扫描的服务数
    pub services_processed: u32,
    /// 缺失的服务数
    pub services_missing: u32,
}

/// 备份运行的结果分级
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// 所有服务均存在且至少写入了一个文件
    Success,
    /// 部分服务目录缺失，但归档已成功创建
    Partial { missing_services: Vec<String> },
    /// 运行被外部中断
    Interrupted { kept: bool },
}

impl BackupOutcome {
    /// 映射到进程退出码：0 成功，1 部分成功/警告
    pub fn exit_code(&self) -> i32 {
        match self {
            BackupOutcome::Success => 0,
            BackupOutcome::Partial { .. } => 1,
            BackupOutcome::Interrupted { .. } => 1,
        }
    }
}

/// 一个落盘的归档
#[derive(Debug, Clone)]
pub struct ArchiveRecord {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub size_bytes: u64,
    /// 跳过校验和计算时为 None，绝不伪造
    pub checksum: Option<String>,
}

/// 一次备份运行的完整报告
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub outcome: BackupOutcome,
    pub stats: BackupStats,
    /// 中断且未保留部分归档时为 None
    pub archive: Option<ArchiveRecord>,
}

impl BackupManager {
    /// 创建新的备份管理器
    ///
    /// 归档存储目录不可创建/写入视为配置错误，在任何归档工作开始前失败。
    pub fn new(config_root: PathBuf, storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir).map_err(|e| {
            BackupError::custom(format!(
                "无法创建归档存储目录 {}: {e}",
                storage_dir.display()
            ))
        })?;

        Ok(Self {
            config_root,
            storage_dir,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }

    /// 创建备份
    ///
    /// 按调用方给定的顺序依次处理各服务目录，将归档写入临时文件，
    /// 成功后原子重命名为 `configs-<UTC时间戳>.tar.gz`。
    /// 零内容结果是致命错误，归档文件不会落盘。
    pub async fn create_backup(&self, options: BackupOptions) -> Result<BackupReport> {
        let created_at = Utc::now();
        let file_name = format!(
            "{ARCHIVE_PREFIX}{}{ARCHIVE_SUFFIX}",
            created_at.format(TIMESTAMP_FORMAT)
        );
        let final_path = self.storage_dir.join(&file_name);
        let partial_path = self.storage_dir.join(format!("{file_name}{PARTIAL_SUFFIX}"));

        tracing::info!("开始创建备份: {}", final_path.display());

        let config_root = self.config_root.clone();
        let build_options = options.clone();
        let build_partial = partial_path.clone();
        let build_final = final_path.clone();

        // 在后台线程中执行归档写入，保持对中断信号的响应
        let (outcome, stats) = tokio::task::spawn_blocking(move || {
            build_archive(&config_root, &build_partial, &build_final, &build_options)
        })
        .await??;

        let archive_kept = !matches!(outcome, BackupOutcome::Interrupted { kept: false });
        let archive = if archive_kept {
            let size_bytes = tokio::fs::metadata(&final_path).await?.len();
            let checksum = if options.compute_checksum {
                Some(checksum::sha256_file(&final_path).await?)
            } else {
                None
            };
            Some(ArchiveRecord {
                path: final_path.clone(),
                created_at,
                size_bytes,
                checksum,
            })
        } else {
            None
        };

        match &outcome {
            BackupOutcome::Success => {
                tracing::info!("✅ 备份创建成功: {}", final_path.display());
            }
            BackupOutcome::Partial { missing_services } => {
                tracing::warn!(
                    "⚠️  备份已创建，但 {} 个服务目录缺失: {}",
                    missing_services.len(),
                    missing_services.join(", ")
                );
            }
            BackupOutcome::Interrupted { kept: true } => {
                tracing::warn!("⚠️  备份被中断，保留部分归档: {}", final_path.display());
            }
            BackupOutcome::Interrupted { kept: false } => {
                tracing::warn!("⚠️  备份被中断，已清理未完成的归档");
            }
        }

        Ok(BackupReport {
            outcome,
            stats,
            archive,
        })
    }
}

/// 执行实际的归档写入（阻塞）
///
/// 任何致命错误返回前都会删除临时文件，归档绝不以可读但
/// 不完整的状态留在最终名称上。
fn build_archive(
    config_root: &Path,
    partial_path: &Path,
    final_path: &Path,
    options: &BackupOptions,
) -> Result<(BackupOutcome, BackupStats)> {
    let result = build_archive_inner(config_root, partial_path, final_path, options);
    if result.is_err() {
        let _ = std::fs::remove_file(partial_path);
    }
    result
}

fn build_archive_inner(
    config_root: &Path,
    partial_path: &Path,
    final_path: &Path,
    options: &BackupOptions,
) -> Result<(BackupOutcome, BackupStats)> {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs::File;
    use tar::Builder;

    let file = File::create(partial_path).map_err(|e| {
        BackupError::backup(format!(
            "无法创建归档文件 {}: {e}",
            partial_path.display()
        ))
    })?;
    let encoder = GzEncoder::new(file, Compression::new(options.compression_level));
    let mut archive = Builder::new(encoder);

    let mut stats = BackupStats::default();
    let mut missing: Vec<String> = Vec::new();
    let mut interrupted = false;

    for service in &options.services {
        if options.cancel.is_cancelled() {
            interrupted = true;
            break;
        }

        let service_root = config_root.join(service);
        if !service_root.exists() {
            tracing::warn!("⚠️  服务目录不存在: {}", service_root.display());
            missing.push(service.clone());
            stats.services_missing += 1;
            continue;
        }

        scan_service(
            service,
            &service_root,
            &options.exclude,
            options.max_file_size,
            &mut stats,
            |entry, stats| {
                // 取消检查点：每个文件操作之间都可被中断
                if options.cancel.is_cancelled() {
                    interrupted = true;
                    return Ok(false);
                }

                let before = stats.files_added;
                append_entry(&mut archive, &entry, stats)?;

                if stats.files_added > before
                    && options.progress_interval > 0
                    && stats.files_added % options.progress_interval == 0
                {
                    if let Some(on_progress) = &options.on_progress {
                        on_progress(stats);
                    }
                }
                Ok(true)
            },
        )?;

        stats.services_processed += 1;

        if interrupted {
            break;
        }
    }

    if interrupted {
        if options.keep_partial {
            finish_archive(archive)?;
            std::fs::rename(partial_path, final_path)?;
            return Ok((BackupOutcome::Interrupted { kept: true }, stats));
        }
        drop(archive);
        let _ = std::fs::remove_file(partial_path);
        return Ok((BackupOutcome::Interrupted { kept: false }, stats));
    }

    if stats.files_added == 0 {
        drop(archive);
        let _ = std::fs::remove_file(partial_path);
        return Err(BackupError::backup(
            "没有任何文件被添加到备份（服务目录缺失或内容全部被排除）",
        ));
    }

    finish_archive(archive)?;
    std::fs::rename(partial_path, final_path)?;

    if missing.is_empty() {
        Ok((BackupOutcome::Success, stats))
    } else {
        Ok((
            BackupOutcome::Partial {
                missing_services: missing,
            },
            stats,
        ))
    }
}

/// 向归档追加单个条目
///
/// 打开源文件失败是可恢复的单文件错误：跳过并计数。
/// 写入归档流本身失败会破坏容器，作为致命错误向上传播。
fn append_entry<W: std::io::Write>(
    archive: &mut tar::Builder<W>,
    entry: &ScanEntry,
    stats: &mut BackupStats,
) -> Result<()> {
    use std::io::ErrorKind;

    if entry.is_directory {
        match archive.append_dir(&entry.relative_path, &entry.absolute_path) {
            Ok(()) => {}
            // 目录在扫描与写入之间消失，按竞态静默跳过
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(BackupError::backup(format!(
                    "写入归档失败 {}: {e}",
                    entry.relative_path
                )));
            }
        }
        return Ok(());
    }

    let mut file = match std::fs::File::open(&entry.absolute_path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            tracing::debug!("跳过不可读文件 {}: {e}", entry.absolute_path.display());
            stats.skipped_io_error += 1;
            return Ok(());
        }
    };

    archive
        .append_file(&entry.relative_path, &mut file)
        .map_err(|e| {
            BackupError::backup(format!("写入归档失败 {}: {e}", entry.relative_path))
        })?;

    stats.files_added += 1;
    stats.bytes_added += entry.size_bytes;
    Ok(())
}

/// 结束 tar 流并刷新 gzip 编码器
fn finish_archive<W: std::io::Write>(archive: tar::Builder<flate2::write::GzEncoder<W>>) -> Result<()> {
    let encoder = archive
        .into_inner()
        .map_err(|e| BackupError::backup(format!("完成归档失败: {e}")))?;
    encoder
        .finish()
        .map_err(|e| BackupError::backup(format!("完成归档失败: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;

    fn default_options(services: &[&str]) -> BackupOptions {
        BackupOptions {
            services: services.iter().map(|s| s.to_string()).collect(),
            exclude: ExcludeMatcher::new::<&str>(&[]).unwrap(),
            max_file_size: None,
            compression_level: 6,
            progress_interval: 0,
            on_progress: None,
            keep_partial: false,
            compute_checksum: true,
            cancel: CancelFlag::new(),
        }
    }

    fn archive_file_names(path: &Path) -> Vec<String> {
        let file = fs::File::open(path).unwrap();
        let decoder = flate2::read::GzDecoder::new(file);
        let mut archive = tar::Archive::new(decoder);
        let mut names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let entry = e.unwrap();
                let is_file = entry.header().entry_type().is_file();
                (entry.path().unwrap().display().to_string(), is_file)
            })
            .filter(|(_, is_file)| *is_file)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }

    fn storage_listing(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_backup_two_services_success() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        fs::write(config_root.join("prowlarr/config.xml"), b"<xml/>").unwrap();
        fs::create_dir_all(config_root.join("sonarr/nested")).unwrap();
        fs::write(config_root.join("sonarr/nested/sonarr.db"), b"db-data").unwrap();

        let storage = dir.path().join("backups");
        let manager = BackupManager::new(config_root, storage.clone()).unwrap();
        let report = manager
            .create_backup(default_options(&["prowlarr", "sonarr"]))
            .await
            .unwrap();

        assert_eq!(report.outcome, BackupOutcome::Success);
        assert_eq!(report.outcome.exit_code(), 0);
        assert_eq!(report.stats.files_added, 2);
        assert_eq!(report.stats.services_processed, 2);
        assert_eq!(report.stats.services_missing, 0);

        let record = report.archive.unwrap();
        assert!(record.path.exists());
        let checksum = record.checksum.unwrap();
        assert_eq!(checksum.len(), 64);

        assert_eq!(
            archive_file_names(&record.path),
            vec!["prowlarr/config.xml", "sonarr/nested/sonarr.db"]
        );

        // 临时文件已重命名，存储目录里只有最终归档
        let listing = storage_listing(&storage);
        assert_eq!(listing.len(), 1);
        assert!(listing[0].starts_with("configs-"));
        assert!(listing[0].ends_with(".tar.gz"));
    }

    #[tokio::test]
    async fn test_missing_service_is_partial_success() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        fs::write(config_root.join("prowlarr/config.xml"), b"<xml/>").unwrap();

        let manager =
            BackupManager::new(config_root, dir.path().join("backups")).unwrap();
        let report = manager
            .create_backup(default_options(&["prowlarr", "ghost"]))
            .await
            .unwrap();

        assert_eq!(
            report.outcome,
            BackupOutcome::Partial {
                missing_services: vec!["ghost".to_string()]
            }
        );
        assert_eq!(report.outcome.exit_code(), 1);
        assert_eq!(report.stats.services_missing, 1);

        let record = report.archive.unwrap();
        assert_eq!(archive_file_names(&record.path), vec!["prowlarr/config.xml"]);
    }

    #[tokio::test]
    async fn test_all_services_missing_is_fatal_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(&config_root).unwrap();
        let storage = dir.path().join("backups");

        let manager = BackupManager::new(config_root, storage.clone()).unwrap();
        let result = manager.create_backup(default_options(&["a", "b"])).await;

        assert!(result.is_err());
        assert!(storage_listing(&storage).is_empty());
    }

    #[tokio::test]
    async fn test_fully_excluded_content_is_fatal_and_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("jellyfin/cache")).unwrap();
        fs::write(config_root.join("jellyfin/cache/a.bin"), b"x").unwrap();
        let storage = dir.path().join("backups");

        let mut options = default_options(&["jellyfin"]);
        options.exclude = ExcludeMatcher::new(&["jellyfin/**"]).unwrap();

        let manager = BackupManager::new(config_root, storage.clone()).unwrap();
        let result = manager.create_backup(options).await;

        assert!(result.is_err());
        assert!(storage_listing(&storage).is_empty());
    }

    #[tokio::test]
    async fn test_exclusion_is_directory_transitive_in_archive() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("jellyfin/cache/images")).unwrap();
        fs::write(config_root.join("jellyfin/cache/images/p.png"), b"x").unwrap();
        fs::write(config_root.join("jellyfin/system.xml"), b"<xml/>").unwrap();

        let mut options = default_options(&["jellyfin"]);
        options.exclude = ExcludeMatcher::new(&["jellyfin/cache/**"]).unwrap();

        let manager =
            BackupManager::new(config_root, dir.path().join("backups")).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        let record = report.archive.unwrap();
        // p.png 本身不直接命中规则，但其所在目录被剪枝
        assert_eq!(archive_file_names(&record.path), vec!["jellyfin/system.xml"]);
    }

    #[tokio::test]
    async fn test_interruption_without_keep_partial_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        fs::write(config_root.join("prowlarr/config.xml"), b"<xml/>").unwrap();
        let storage = dir.path().join("backups");

        let options = default_options(&["prowlarr"]);
        options.cancel.cancel();

        let manager = BackupManager::new(config_root, storage.clone()).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        assert_eq!(report.outcome, BackupOutcome::Interrupted { kept: false });
        assert!(report.archive.is_none());
        assert!(storage_listing(&storage).is_empty());
    }

    #[tokio::test]
    async fn test_interruption_with_keep_partial_keeps_valid_archive() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        fs::write(config_root.join("prowlarr/config.xml"), b"<xml/>").unwrap();
        let storage = dir.path().join("backups");

        let mut options = default_options(&["prowlarr"]);
        options.keep_partial = true;
        options.cancel.cancel();

        let manager = BackupManager::new(config_root, storage.clone()).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        assert_eq!(report.outcome, BackupOutcome::Interrupted { kept: true });
        let record = report.archive.unwrap();
        assert!(record.path.exists());
        // 取消发生在任何写入之前，保留的是合法的空前缀归档
        assert!(archive_file_names(&record.path).is_empty());
    }

    #[tokio::test]
    async fn test_checksum_skip_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        fs::write(config_root.join("prowlarr/config.xml"), b"<xml/>").unwrap();

        let mut options = default_options(&["prowlarr"]);
        options.compute_checksum = false;

        let manager =
            BackupManager::new(config_root, dir.path().join("backups")).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        assert!(report.archive.unwrap().checksum.is_none());
    }

    #[tokio::test]
    async fn test_progress_callback_receives_running_totals() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("prowlarr")).unwrap();
        for i in 0..5 {
            fs::write(
                config_root.join(format!("prowlarr/f{i}.xml")),
                b"data",
            )
            .unwrap();
        }

        let snapshots: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen = snapshots.clone();

        let mut options = default_options(&["prowlarr"]);
        options.progress_interval = 2;
        options.on_progress = Some(Arc::new(move |stats: &BackupStats| {
            seen.lock().unwrap().push(stats.files_added);
        }));

        let manager =
            BackupManager::new(config_root, dir.path().join("backups")).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        assert_eq!(report.stats.files_added, 5);
        assert_eq!(*snapshots.lock().unwrap(), vec![2, 4]);
    }

    #[tokio::test]
    async fn test_size_threshold_filters_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let config_root = dir.path().join("config");
        fs::create_dir_all(config_root.join("qbittorrent")).unwrap();
        fs::write(config_root.join("qbittorrent/qBittorrent.conf"), b"conf").unwrap();
        fs::write(
            config_root.join("qbittorrent/huge.dat"),
            vec![0u8; 8 * 1024],
        )
        .unwrap();

        let mut options = default_options(&["qbittorrent"]);
        options.max_file_size = Some(1024);

        let manager =
            BackupManager::new(config_root, dir.path().join("backups")).unwrap();
        let report = manager.create_backup(options).await.unwrap();

        assert_eq!(report.stats.files_added, 1);
        assert_eq!(report.stats.skipped_by_size, 1);
        assert_eq!(
            archive_file_names(&report.archive.unwrap().path),
            vec!["qbittorrent/qBittorrent.conf"]
        );
    }
}
