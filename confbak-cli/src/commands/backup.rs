use crate::app::CliApp;
use crate::cli::BackupArgs;
use crate::utils::format_size;
use backup_core::{
    archive::{BackupOptions, BackupOutcome, BackupStats, CancelFlag, ProgressFn},
    error::{BackupError, Result},
    matcher::ExcludeMatcher,
    retention,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 创建配置备份
pub async fn run_backup(app: &CliApp, args: BackupArgs) -> Result<i32> {
    info!("💾 创建配置备份");
    info!("===============");

    // 1. 确定要备份的服务列表
    let services = if args.services.is_empty() {
        app.config.services.names.clone()
    } else {
        args.services.clone()
    };
    info!("   服务目录: {}", services.join(", "));
    info!("   配置根目录: {}", app.config.get_config_root().display());
    info!("   归档目录: {}", app.config.get_storage_dir().display());

    // 2. 组装排除规则：配置 + 命令行 + 规则文件 + 内置规则
    let mut patterns = app.config.backup.exclude_patterns.clone();
    patterns.extend(args.exclude.iter().cloned());
    let exclude_file = args.exclude_from.clone().or_else(|| app.config.get_exclude_file());
    let builtin = app.config.backup.builtin_excludes && !args.no_builtin_excludes;
    let exclude = ExcludeMatcher::from_sources(&patterns, exclude_file.as_deref(), builtin)?;
    info!("   排除规则: {} 条", exclude.pattern_count());

    let max_file_size = args
        .max_file_size_mb
        .map(|mb| mb * 1024 * 1024)
        .or_else(|| app.config.max_file_size_bytes());
    if let Some(mb) = args.max_file_size_mb.or(app.config.backup.max_file_size_mb) {
        info!("   单文件上限: {mb} MB");
    }

    // 3. Ctrl+C 触发协作式取消
    let cancel = CancelFlag::new();
    let signal_cancel = cancel.clone();
    let signal_watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️  收到中断信号，正在停止备份...");
            signal_cancel.cancel();
        }
    });

    // 4. 进度条，由引擎的进度回调驱动
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .map_err(|e| BackupError::custom(format!("进度条模板错误: {e}")))?,
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    let progress_bar = bar.clone();
    let on_progress: ProgressFn = Arc::new(move |stats: &BackupStats| {
        progress_bar.set_message(format!(
            "已归档 {} 个文件 ({})，跳过: 排除 {} / 超限 {}",
            stats.files_added,
            format_size(stats.bytes_added),
            stats.skipped_excluded,
            stats.skipped_by_size,
        ));
    });

    let progress_interval = args
        .progress_interval
        .unwrap_or(app.config.backup.progress_interval);

    let options = BackupOptions {
        services,
        exclude,
        max_file_size,
        compression_level: backup_core::constants::archive::DEFAULT_COMPRESSION_LEVEL,
        progress_interval,
        on_progress: Some(on_progress),
        keep_partial: args.keep_partial,
        compute_checksum: !args.no_checksum,
        cancel: cancel.clone(),
    };

    // 5. 创建备份
    let result = app.backup_manager.create_backup(options).await;
    signal_watcher.abort();
    bar.finish_and_clear();
    let report = result?;

    print_report(&report.outcome, &report.stats);

    if let Some(record) = &report.archive {
        info!("   归档文件: {}", record.path.display());
        info!("   文件大小: {}", format_size(record.size_bytes));
        match &record.checksum {
            Some(checksum) => info!("   SHA256: {checksum}"),
            None => info!("   SHA256: （已跳过）"),
        }
    }

    // 6. 清理旧归档（中断的运行不触发清理）
    let prunable = matches!(
        report.outcome,
        BackupOutcome::Success | BackupOutcome::Partial { .. }
    );
    if prunable && !args.no_prune {
        let retain = args.retain.unwrap_or(app.config.backup.retain);
        retention::prune_archives(&app.config.get_storage_dir(), retain).await?;
    }

    Ok(report.outcome.exit_code())
}

fn print_report(outcome: &BackupOutcome, stats: &BackupStats) {
    match outcome {
        BackupOutcome::Success => {
            info!("🎉 备份创建成功！");
        }
        BackupOutcome::Partial { missing_services } => {
            warn!("⚠️  备份已创建，但以下服务目录缺失（非致命）:");
            for service in missing_services {
                warn!("   - {service}");
            }
        }
        BackupOutcome::Interrupted { kept: true } => {
            warn!("⚠️  备份被中断，已保留部分归档");
        }
        BackupOutcome::Interrupted { kept: false } => {
            warn!("⚠️  备份被中断，未完成的归档已清理");
        }
    }

    info!("📊 备份统计:");
    info!("   新增文件: {}", stats.files_added);
    info!("   新增大小: {}", format_size(stats.bytes_added));
    info!("   跳过（排除规则）: {}", stats.skipped_excluded);
    info!("   跳过（超过大小上限）: {}", stats.skipped_by_size);
    if stats.skipped_io_error > 0 {
        warn!("   跳过（读取失败）: {}", stats.skipped_io_error);
    }
    info!(
        "   处理服务: {} 个，缺失: {} 个",
        stats.services_processed, stats.services_missing
    );
}
