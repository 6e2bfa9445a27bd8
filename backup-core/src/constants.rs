/// 备份归档相关常量
pub mod archive {
    use std::path::{Path, PathBuf};

    /// 归档文件名前缀
    pub const ARCHIVE_PREFIX: &str = "configs-";

    /// 归档文件扩展名
    pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

    /// 写入中的临时归档扩展名，完成后原子重命名去掉该后缀
    pub const PARTIAL_SUFFIX: &str = ".partial";

    /// 归档文件名中的 UTC 时间戳格式（字典序即时间序）
    pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

    /// 默认保留的归档数量
    pub const DEFAULT_RETAIN: usize = 7;

    /// 默认 gzip 压缩级别 (0-9)
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

    /// 默认进度汇报间隔（每 N 个文件汇报一次，0 表示关闭）
    pub const DEFAULT_PROGRESS_INTERVAL: u64 = 200;

    /// 归档存储目录名
    pub const BACKUP_DIR_NAME: &str = "backups";

    /// 获取默认归档存储目录（跨平台）
    pub fn get_default_storage_dir() -> PathBuf {
        Path::new(".").join(BACKUP_DIR_NAME)
    }
}

/// 服务目录相关常量
pub mod services {
    use std::path::{Path, PathBuf};

    /// 默认备份的服务目录列表
    pub const DEFAULT_SERVICES: &[&str] = &[
        "prowlarr",
        "sonarr",
        "radarr",
        "bazarr",
        "jellyfin",
        "swag",
        "qbittorrent",
        "lazylibrarian",
        "nextcloud",
    ];

    /// 服务配置根目录名
    pub const CONFIG_DIR_NAME: &str = "config";

    /// 获取默认服务配置根目录（跨平台）
    pub fn get_default_config_root() -> PathBuf {
        Path::new(".").join(CONFIG_DIR_NAME)
    }
}

/// 内置排除规则
pub mod excludes {
    /// 已知的重量级缓存/日志路径，默认不进入归档。
    /// 规则匹配 `<服务名>/<相对路径>` 形式的归档内路径。
    pub const BUILTIN_PATTERNS: &[&str] = &[
        "*/cache/**",
        "*/Cache/**",
        "*/logs/**",
        "*/Logs/**",
        "*/MediaCover/**",
        "jellyfin/transcodes/**",
        "jellyfin/metadata/library/**",
        "qbittorrent/BT_backup/**",
        "nextcloud/appdata_*/preview/**",
    ];
}

/// 校验和相关常量
pub mod checksum {
    /// 流式哈希读取缓冲区大小（字节）
    pub const HASH_BUFFER_SIZE: usize = 8192;
}

/// 配置文件相关常量
pub mod config {
    /// 按优先级查找的配置文件名
    pub const CONFIG_FILE_CANDIDATES: &[&str] = &["config.toml", "confbak.toml", ".confbak.toml"];

    /// 自动创建的默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
}
