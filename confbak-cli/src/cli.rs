use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Confbak - 服务配置目录备份与恢复工具
#[derive(Parser)]
#[command(name = "confbak")]
#[command(version)]
#[command(about = "备份、清理与恢复服务配置目录的 tar.gz 归档")]
pub struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 创建配置备份
    Backup(BackupArgs),
    /// 列出所有归档
    List,
    /// 从归档恢复（会无条件覆盖现有文件！）
    Restore {
        /// 归档文件名（相对归档存储目录）或完整路径
        archive: String,
        /// 恢复目标目录（默认为配置根目录）
        #[arg(long)]
        target: Option<PathBuf>,
        /// 跳过确认提示
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// 清理旧归档，仅保留最近的 N 个
    Prune {
        /// 保留数量（覆盖配置文件中的 retain）
        #[arg(long)]
        retain: Option<usize>,
    },
}

/// 备份命令参数
#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    /// 只备份指定的服务（默认备份配置中的全部服务）
    #[arg(long, num_args = 1.., value_name = "SERVICE")]
    pub services: Vec<String>,

    /// 附加排除规则（glob，匹配 "<服务名>/<相对路径>"，可多次指定）
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// 从文件读取排除规则（每行一条，# 开头为注释）
    #[arg(long, value_name = "FILE")]
    pub exclude_from: Option<PathBuf>,

    /// 禁用内置排除规则
    #[arg(long)]
    pub no_builtin_excludes: bool,

    /// 单文件大小上限（MB），超过则跳过
    #[arg(long, value_name = "MB")]
    pub max_file_size_mb: Option<u64>,

    /// 跳过归档校验和计算
    #[arg(long)]
    pub no_checksum: bool,

    /// 被中断时保留已写入的部分归档
    #[arg(long)]
    pub keep_partial: bool,

    /// 进度汇报间隔（每 N 个归档文件），0 表示关闭
    #[arg(long, value_name = "N")]
    pub progress_interval: Option<u64>,

    /// 保留的归档数量（覆盖配置文件中的 retain）
    #[arg(long)]
    pub retain: Option<usize>,

    /// 备份完成后不清理旧归档
    #[arg(long)]
    pub no_prune: bool,
}
