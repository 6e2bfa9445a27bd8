use crate::constants::{archive, config as config_file, services};
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub services: ServicesConfig,
    pub backup: BackupConfig,
}

/// 服务目录配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServicesConfig {
    pub names: Vec<String>,
}

/// 备份相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BackupConfig {
    pub config_root: String,
    pub storage_dir: String,
    pub retain: usize,
    pub max_file_size_mb: Option<u64>,
    pub progress_interval: u64,
    pub exclude_patterns: Vec<String>,
    pub exclude_file: Option<String>,
    pub builtin_excludes: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            services: ServicesConfig {
                names: services::DEFAULT_SERVICES
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            backup: BackupConfig {
                config_root: services::get_default_config_root()
                    .to_string_lossy()
                    .to_string(),
                storage_dir: archive::get_default_storage_dir()
                    .to_string_lossy()
                    .to_string(),
                retain: archive::DEFAULT_RETAIN,
                max_file_size_mb: None,
                progress_interval: archive::DEFAULT_PROGRESS_INTERVAL,
                exclude_patterns: Vec::new(),
                exclude_file: None,
                builtin_excludes: true,
            },
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> confbak.toml -> .confbak.toml
    pub fn find_and_load_config() -> Result<Self> {
        for candidate in config_file::CONFIG_FILE_CANDIDATES {
            if Path::new(candidate).exists() {
                tracing::info!("找到配置文件: {}", candidate);
                return Self::load_from_file(candidate);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!(
            "未找到配置文件，创建默认配置: {}",
            config_file::DEFAULT_CONFIG_FILE
        );
        let default_config = Self::default();
        default_config.save_to_file(config_file::DEFAULT_CONFIG_FILE)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml_with_comments();
        fs::write(&path, content)?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        let services = format!(
            "[{}]",
            self.services
                .names
                .iter()
                .map(|name| format!("\"{name}\""))
                .collect::<Vec<_>>()
                .join(", ")
        );

        TEMPLATE
            .replace("{services}", &services)
            .replace("{config_root}", &self.backup.config_root)
            .replace("{storage_dir}", &self.backup.storage_dir)
            .replace("{retain}", &self.backup.retain.to_string())
            .replace(
                "{progress_interval}",
                &self.backup.progress_interval.to_string(),
            )
            .replace(
                "{builtin_excludes}",
                &self.backup.builtin_excludes.to_string(),
            )
    }

    /// 校验配置中的基本约束
    pub fn validate(&self) -> Result<()> {
        if self.services.names.is_empty() {
            return Err(BackupError::custom("配置中没有任何服务目录"));
        }
        if let Some(file) = &self.backup.exclude_file {
            if !Path::new(file).exists() {
                return Err(BackupError::custom(format!(
                    "排除规则文件不存在: {file}"
                )));
            }
        }
        Ok(())
    }

    /// 获取服务配置根目录
    pub fn get_config_root(&self) -> PathBuf {
        PathBuf::from(&self.backup.config_root)
    }

    /// 获取归档存储目录
    pub fn get_storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.backup.storage_dir)
    }

    /// 获取排除规则文件路径
    pub fn get_exclude_file(&self) -> Option<PathBuf> {
        self.backup.exclude_file.as_ref().map(PathBuf::from)
    }

    /// 单文件大小上限换算为字节
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        self.backup.max_file_size_mb.map(|mb| mb * 1024 * 1024)
    }
}
