pub mod local;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use local::LocalStorage;
#[cfg(test)]
pub use memory::MemoryStorage;

/// 存储层错误
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("路径不存在: {0}")]
    NotFound(PathBuf),

    #[error("IO 错误 ({path}): {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// 将 io::Error 映射为存储错误，NotFound 单独区分
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound(path.to_path_buf())
        } else {
            StorageError::Io {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// 文件系统对象的稳定标识（设备号 + inode）
///
/// 在对象被删除之前，重命名和移动都不会改变它；删除后操作系统可能把同一个
/// 标识分配给新的对象。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId {
    pub device: u64,
    pub inode: u64,
}

impl FileId {
    pub fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// 文件元数据
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub id: FileId,
    pub is_dir: bool,
    pub size: u64,
}

/// 目录项（list_dir 返回）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub path: PathBuf,
    pub is_dir: bool,
}

/// 文件系统抽象接口
///
/// 所有路径均为绝对路径。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 检查路径是否存在
    async fn exists(&self, path: &Path) -> Result<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 获取元数据（包含标识）
    async fn stat(&self, path: &Path) -> Result<FileMeta>;

    /// 列出目录的直接子项
    async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;

    /// 读取整个文件
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// 写入整个文件，父目录不存在时自动创建
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// 删除单个文件
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// 递归删除目录
    async fn delete_dir_all(&self, path: &Path) -> Result<()>;

    /// 创建目录（含父目录），已存在时直接返回
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
