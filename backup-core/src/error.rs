use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("配置文件未找到")]
    ConfigNotFound,

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("路径错误: {0}")]
    StripPrefix(#[from] std::path::StripPrefixError),

    #[error("排除规则错误: {0}")]
    Pattern(#[from] globset::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("恢复操作失败: {0}")]
    Restore(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

impl BackupError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn restore(msg: impl Into<String>) -> Self {
        Self::Restore(msg.into())
    }
}
