use crate::constants::checksum::HASH_BUFFER_SIZE;
use crate::error::{BackupError, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// 计算文件的 SHA-256 哈希值
///
/// 按固定大小的块流式读取，整个文件不会一次性载入内存。
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .map_err(|e| BackupError::custom(format!("无法打开文件 {}: {e}", path.display())))?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .await
            .map_err(|e| BackupError::custom(format!("读取文件失败 {}: {e}", path.display())))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    let hash = hasher.finalize();
    Ok(format!("{hash:x}"))
}
