use super::{DirEntryInfo, FileId, FileMeta, Result, Storage, StorageError};
use async_trait::async_trait;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// 本地文件系统存储
pub struct LocalStorage {
    name: String,
}

impl LocalStorage {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn file_id(metadata: &std::fs::Metadata, _path: &Path) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId::new(metadata.dev(), metadata.ino())
}

// 非 Unix 平台没有稳定可用的 inode，退化为路径 + 创建时间指纹，重命名会被视为删除 + 新建
#[cfg(not(unix))]
fn file_id(metadata: &std::fs::Metadata, path: &Path) -> FileId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(path.to_string_lossy().as_bytes());
    if let Ok(created) = metadata.created() {
        if let Ok(since) = created.duration_since(std::time::UNIX_EPOCH) {
            hasher.update(&since.as_nanos().to_le_bytes());
        }
    }
    let hash = hasher.finalize();
    let bytes = hash.as_bytes();
    let mut inode = [0u8; 8];
    inode.copy_from_slice(&bytes[..8]);
    FileId::new(0, u64::from_le_bytes(inode))
}

#[async_trait]
impl Storage for LocalStorage {
    async fn stat(&self, path: &Path) -> Result<FileMeta> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        Ok(FileMeta {
            id: file_id(&metadata, path),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        })
    }

    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let mut dir = fs::read_dir(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(path, e))?
        {
            let child = entry.path();
            // 子项在列出后被删除时按文件处理，由后续读取跳过
            let Ok(file_type) = entry.file_type().await else {
                entries.push(DirEntryInfo { path: child, is_dir: false });
                continue;
            };
            if file_type.is_symlink() {
                // 不跟随指向目录的链接，避免链接成环时无限展开
                match fs::metadata(&child).await {
                    Ok(target) if !target.is_dir() => {}
                    _ => {
                        debug!("跳过符号链接: {}", child.display());
                        continue;
                    }
                }
            }
            entries.push(DirEntryInfo {
                path: child,
                is_dir: file_type.is_dir(),
            });
        }

        Ok(entries)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| StorageError::from_io(&parent, e))?;

        // 在同目录独占创建随机命名的临时文件，写完后原子重命名
        let target = path.to_path_buf();
        let data = data.to_vec();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut temp = tempfile::Builder::new()
                .prefix(".replisync-")
                .tempfile_in(&parent)
                .map_err(|e| StorageError::from_io(&parent, e))?;
            temp.write_all(&data)
                .map_err(|e| StorageError::from_io(temp.path(), e))?;
            temp.persist(&target)
                .map_err(|e| StorageError::from_io(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::from_io(path, io::Error::new(io::ErrorKind::Other, e)))?
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn delete_dir_all(&self, path: &Path) -> Result<()> {
        fs::remove_dir_all(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
