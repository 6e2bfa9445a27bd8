use crate::app::CliApp;
use backup_core::error::Result;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

/// 从归档恢复
pub async fn run_restore(
    app: &CliApp,
    archive: &str,
    target: Option<PathBuf>,
    yes: bool,
) -> Result<i32> {
    let target = target.unwrap_or_else(|| app.config.get_config_root());

    if !yes {
        warn!(
            "⚠️  警告: 此操作将无条件覆盖 {} 下的现有文件!",
            target.display()
        );
        print!("请确认要从 {archive} 恢复 (y/N): ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim().to_lowercase() != "y" {
            warn!("操作已取消");
            return Ok(0);
        }
    }

    info!("开始恢复操作...");
    app.restore_manager.restore(archive, &target).await?;
    info!("✅ 恢复完成: {} (现有文件已被覆盖)", target.display());

    Ok(0)
}
