use crate::app::CliApp;
use crate::utils::format_size;
use backup_core::{error::Result, retention};
use tracing::info;

/// 列出所有归档
pub async fn run_list(app: &CliApp) -> Result<i32> {
    let archives = retention::list_archives(&app.config.get_storage_dir()).await?;

    if archives.is_empty() {
        info!("📦 暂无归档");
        info!("💡 使用以下命令创建备份:");
        info!("   confbak backup");
        return Ok(0);
    }

    info!("📦 归档列表");
    info!("============");

    let mut total_size = 0u64;
    for archive in &archives {
        total_size += archive.size_bytes;
        info!(
            "{:<40} {:>12}",
            archive.file_name,
            format_size(archive.size_bytes)
        );
    }

    info!("{}", "-".repeat(54));
    info!(
        "共 {} 个归档，总大小 {}",
        archives.len(),
        format_size(total_size)
    );
    info!("💡 可用操作:");
    info!("   - 从归档恢复: confbak restore <归档文件名>");
    info!("   - 清理旧归档: confbak prune");

    Ok(0)
}
