use crate::app::CliApp;
use backup_core::{error::Result, retention};
use tracing::info;

/// 清理旧归档，仅保留最近的 N 个
pub async fn run_prune(app: &CliApp, retain: Option<usize>) -> Result<i32> {
    let retain = retain.unwrap_or(app.config.backup.retain);
    let deleted = retention::prune_archives(&app.config.get_storage_dir(), retain).await?;

    if deleted.is_empty() {
        info!("✅ 无需清理，归档数量未超过保留上限 ({retain})");
    } else {
        info!("🧹 已清理 {} 个旧归档:", deleted.len());
        for path in &deleted {
            info!("   - {}", path.display());
        }
    }

    Ok(0)
}
