use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// 同步引擎错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 启动时源目录不存在（致命）
    #[error("源目录不存在: {0}")]
    SourceMissing(PathBuf),

    #[error("路径 {path} 不在根目录 {root} 之下")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
