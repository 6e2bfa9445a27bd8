use crate::constants::excludes::BUILTIN_PATTERNS;
use crate::error::{BackupError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// 排除规则匹配器
///
/// 持有一组构造时固定的 glob 规则，判断某个归档内相对路径是否应被排除。
/// 路径统一使用正斜杠分隔符，匹配区分大小写。
///
/// 对每个候选路径会做两次独立匹配：原始路径，以及末尾追加 `/` 的路径。
/// 这样 `dir/**` 或 `dir/` 形式的规则也能命中目录节点本身，
/// 使扫描器可以在进入子树之前剪枝。
#[derive(Debug, Clone)]
pub struct ExcludeMatcher {
    set: GlobSet,
    pattern_count: usize,
}

impl ExcludeMatcher {
    /// 从规则列表构建匹配器
    ///
    /// 规则非法时返回配置错误，调用方应在任何归档工作开始前失败。
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut pattern_count = 0;

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = GlobBuilder::new(pattern)
                // `*` 和 `?` 不跨越路径分隔符，`**` 才匹配多级目录
                .literal_separator(true)
                .build()
                .map_err(|e| {
                    BackupError::custom(format!("无效的排除规则 '{pattern}': {e}"))
                })?;
            builder.add(glob);
            pattern_count += 1;
        }

        let set = builder.build()?;
        Ok(Self { set, pattern_count })
    }

    /// 组合配置规则、规则文件与内置规则构建匹配器
    pub fn from_sources<S: AsRef<str>>(
        patterns: &[S],
        pattern_file: Option<&Path>,
        builtin: bool,
    ) -> Result<Self> {
        let mut all: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();

        if let Some(path) = pattern_file {
            all.extend(load_pattern_file(path)?);
        }

        if builtin {
            all.extend(BUILTIN_PATTERNS.iter().map(|p| p.to_string()));
        }

        Self::new(&all)
    }

    /// 判断归档内相对路径是否被排除
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.pattern_count == 0 {
            return false;
        }
        self.set.is_match(relative_path) || self.set.is_match(format!("{relative_path}/"))
    }

    /// 当前加载的规则数量
    pub fn pattern_count(&self) -> usize {
        self.pattern_count
    }
}

/// 读取排除规则文件
///
/// 每行一条规则，`#` 开头的行为注释，空行忽略。
/// 文件不可读视为配置错误。
pub fn load_pattern_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BackupError::custom(format!("无法读取排除规则文件 {}: {e}", path.display()))
    })?;

    let patterns = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    Ok(patterns)
}
