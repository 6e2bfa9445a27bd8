use backup_core::{
    archive::BackupManager, config::AppConfig, error::Result, restore::RestoreManager,
};
use std::path::Path;

use crate::cli::Commands;
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub backup_manager: BackupManager,
    pub restore_manager: RestoreManager,
}

impl CliApp {
    /// 使用智能配置查找初始化CLI应用
    ///
    /// 显式给出且存在的配置文件优先；否则按候选文件名查找，
    /// 都不存在时自动创建默认配置。
    pub async fn new_with_auto_config(config_path: &Path) -> Result<Self> {
        let config = if config_path.exists() {
            tracing::info!("找到配置文件: {}", config_path.display());
            AppConfig::load_from_file(config_path)?
        } else {
            AppConfig::find_and_load_config()?
        };

        // 配置错误在任何归档工作开始前失败
        config.validate()?;

        let backup_manager =
            BackupManager::new(config.get_config_root(), config.get_storage_dir())?;
        let restore_manager = RestoreManager::new(config.get_storage_dir());

        Ok(Self {
            config,
            backup_manager,
            restore_manager,
        })
    }

    /// 运行应用命令，返回进程退出码
    pub async fn run_command(&mut self, command: Commands) -> Result<i32> {
        match command {
            Commands::Backup(args) => commands::run_backup(self, args).await,
            Commands::List => commands::run_list(self).await,
            Commands::Restore {
                archive,
                target,
                yes,
            } => commands::run_restore(self, &archive, target, yes).await,
            Commands::Prune { retain } => commands::run_prune(self, retain).await,
        }
    }
}
